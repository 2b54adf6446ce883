use async_trait::async_trait;

/// Decides whether an ownerless delete (no secret supplied) may proceed.
///
/// Saltbox ships no policy: without a checker, ownerless deletes are refused.
#[async_trait]
pub trait AuthorizationChecker: Send + Sync {
    async fn is_authorized(&self, owner: &str, key: &str) -> bool;
}

#[async_trait]
impl<F> AuthorizationChecker for F
where
    F: Fn(&str, &str) -> bool + Send + Sync,
{
    async fn is_authorized(&self, owner: &str, key: &str) -> bool {
        self(owner, key)
    }
}
