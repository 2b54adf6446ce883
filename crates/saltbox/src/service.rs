use std::sync::Arc;

use saltbox_core::Secret;
use saltbox_protocol::Operation;
use saltbox_storage::StorageEngine;
use tracing::debug;

use crate::error::{CompositionError, ServiceError};
use crate::logic::{CredentialLogic, UpdateOutcome};

/// A checked pairing of credential logic and a storage engine.
///
/// Holds no per-call state; clones share the same logic and engine.
#[derive(Debug, Clone)]
pub struct CredentialService {
    logic: Arc<dyn CredentialLogic>,
    engine: Arc<dyn StorageEngine>,
}

/// Pairs `logic` with `engine`, refusing combinations that cannot work.
///
/// Every problem is collected before failing, so one error lists them all.
pub fn build_service(
    logic: Arc<dyn CredentialLogic>,
    engine: Arc<dyn StorageEngine>,
) -> Result<CredentialService, CompositionError> {
    let mut violations = Vec::new();

    let provided = logic.operations();
    let missing: Vec<&str> = Operation::ALL
        .iter()
        .filter(|op| !provided.contains(op))
        .map(|op| op.as_str())
        .collect();
    if !missing.is_empty() {
        violations.push(format!("logic must implement {}", missing.join("/")));
    }
    violations.extend(logic.validate());

    if !engine.capabilities().any() {
        violations.push(
            "engine must implement send_request/handle_response or handle_request/send_response"
                .to_string(),
        );
    }

    if !violations.is_empty() {
        return Err(CompositionError { violations });
    }
    debug!(logic = ?logic, engine = ?engine, "built credential service");
    Ok(CredentialService { logic, engine })
}

impl CredentialService {
    pub fn engine(&self) -> &Arc<dyn StorageEngine> {
        &self.engine
    }

    /// Registers `secret` under `(owner, key)` and returns its digest.
    pub async fn create(
        &self,
        owner: &str,
        key: &str,
        secret: impl Into<Secret>,
    ) -> Result<String, ServiceError> {
        self.logic
            .create(self.engine.as_ref(), owner, key, secret.into())
            .await
    }

    /// `false` when the secret does not match or there is no record.
    ///
    /// A match against a digest under an outdated scheme also rewrites the
    /// stored digest under the preferred one.
    pub async fn verify(
        &self,
        owner: &str,
        key: &str,
        secret: impl Into<Secret>,
    ) -> Result<bool, ServiceError> {
        self.logic
            .verify(self.engine.as_ref(), owner, key, secret.into())
            .await
    }

    pub async fn update(
        &self,
        owner: &str,
        key: &str,
        secret: impl Into<Secret>,
        new_secret: impl Into<Secret>,
    ) -> Result<UpdateOutcome, ServiceError> {
        self.logic
            .update(
                self.engine.as_ref(),
                owner,
                key,
                secret.into(),
                new_secret.into(),
            )
            .await
    }

    /// Deletes after verifying `secret`, or, without one, after the configured
    /// authorization check approves.
    pub async fn delete(
        &self,
        owner: &str,
        key: &str,
        secret: Option<Secret>,
    ) -> Result<bool, ServiceError> {
        self.logic
            .delete(self.engine.as_ref(), owner, key, secret)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::StandardLogic;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use saltbox_core::HashScheme;
    use saltbox_storage::{Capabilities, MemoryEngine};

    #[derive(Debug)]
    struct Inert;

    #[async_trait]
    impl StorageEngine for Inert {
        fn capabilities(&self) -> Capabilities {
            Capabilities::default()
        }
    }

    #[derive(Debug)]
    struct CreateOnly;

    #[async_trait]
    impl CredentialLogic for CreateOnly {
        fn operations(&self) -> &[Operation] {
            &[Operation::Create]
        }
    }

    #[test]
    fn reports_every_violation_at_once() {
        let err = build_service(Arc::new(CreateOnly), Arc::new(Inert)).unwrap_err();
        assert_eq!(err.violations.len(), 2);
        assert_eq!(
            err.to_string(),
            "logic must implement verify/update/delete and engine must implement \
             send_request/handle_response or handle_request/send_response"
        );
    }

    #[test]
    fn reports_engine_alone() {
        let logic = StandardLogic::new(HashScheme::argon2id(8, 1, 1));
        let err = build_service(Arc::new(logic), Arc::new(Inert)).unwrap_err();
        assert_eq!(err.violations.len(), 1);
        assert!(err.to_string().starts_with("engine must implement"));
    }

    #[test]
    fn reports_unusable_scheme() {
        let logic = StandardLogic::new(HashScheme::argon2id(0, 0, 0));
        let err = build_service(Arc::new(logic), Arc::new(MemoryEngine::default())).unwrap_err();
        assert_eq!(err.violations.len(), 1);
    }

    #[tokio::test]
    async fn unimplemented_operation_is_unsupported() {
        // Bypasses composition to reach the default body.
        let service = CredentialService {
            logic: Arc::new(CreateOnly),
            engine: Arc::new(MemoryEngine::default()),
        };
        let err = service.verify("svc1", "alice", "p@ss").await.unwrap_err();
        assert!(matches!(err, ServiceError::Unsupported("verify")));
    }
}
