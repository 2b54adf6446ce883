use std::collections::HashMap;
use std::collections::hash_map::Entry;

use async_trait::async_trait;
use saltbox_protocol::{Request, Response};
use tokio::sync::Mutex;
use tracing::trace;

use crate::ops::{self, StoreOp};
use crate::types::{Capabilities, StorageEngine, StorageError};

/// Direct engine keeping digests in process memory.
///
/// Every request runs under one lock, which makes each operation atomic per
/// `(owner, key)` (and, more strongly, across keys).
#[derive(Debug, Default)]
pub struct MemoryEngine {
    records: Mutex<HashMap<(String, String), String>>,
}

impl MemoryEngine {
    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }
}

#[async_trait]
impl StorageEngine for MemoryEngine {
    fn capabilities(&self) -> Capabilities {
        Capabilities::SERVER
    }

    async fn handle_request(&self, request: Request) -> Response {
        let op = match ops::parse_request(&request) {
            Ok(op) => op,
            Err(resp) => return resp,
        };
        let id = (request.owner().to_string(), request.key().to_string());
        let mut records = self.records.lock().await;

        match op {
            StoreOp::Create { digest } => match records.entry(id) {
                Entry::Occupied(_) => ops::duplicate(&request),
                Entry::Vacant(slot) => {
                    slot.insert(digest.to_string());
                    Response::success(&request, Some(digest.to_string()))
                }
            },
            StoreOp::Verify => match records.get(&id) {
                Some(stored) => Response::success(&request, Some(stored.clone())),
                None => ops::not_found(&request),
            },
            StoreOp::Update {
                expected,
                replacement,
            } => match records.get_mut(&id) {
                None => ops::not_found(&request),
                Some(stored) if !ops::digests_match(stored, expected) => ops::conflict(&request),
                Some(stored) => {
                    *stored = replacement.to_string();
                    Response::success(&request, Some(replacement.to_string()))
                }
            },
            StoreOp::Delete { expected } => {
                let Some(stored) = records.get(&id) else {
                    return ops::not_found(&request);
                };
                if expected.is_some_and(|e| !ops::digests_match(stored, e)) {
                    return ops::conflict(&request);
                }
                records.remove(&id);
                Response::success(&request, None)
            }
        }
    }

    async fn send_response(&self, response: &Response) -> Result<(), StorageError> {
        // In-process: the response is handed back by return value.
        trace!(nonce = %response.nonce(), operation = %response.operation(), "response delivered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use saltbox_protocol::{ErrorTag, Outcome};

    #[tokio::test]
    async fn create_verify_update_delete() {
        let engine = MemoryEngine::default();

        let resp = engine
            .exchange(Request::create("svc1", "alice", "$d1".to_string()))
            .await
            .unwrap();
        assert_eq!(resp.digest(), Some("$d1"));

        let resp = engine.exchange(Request::verify("svc1", "alice")).await.unwrap();
        assert_eq!(resp.digest(), Some("$d1"));

        let resp = engine
            .exchange(Request::update(
                "svc1",
                "alice",
                "$d1".to_string(),
                "$d2".to_string(),
            ))
            .await
            .unwrap();
        assert_eq!(resp.digest(), Some("$d2"));

        engine
            .exchange(Request::delete("svc1", "alice", Some("$d2".to_string())))
            .await
            .unwrap();
        assert!(engine.is_empty().await);
    }

    #[tokio::test]
    async fn duplicate_create_is_refused() {
        let engine = MemoryEngine::default();
        engine
            .exchange(Request::create("svc1", "alice", "$d1".to_string()))
            .await
            .unwrap();
        let err = engine
            .exchange(Request::create("svc1", "alice", "$other".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Duplicate { .. }));

        // Same key under another owner is a separate record.
        engine
            .exchange(Request::create("svc2", "alice", "$d1".to_string()))
            .await
            .unwrap();
        assert_eq!(engine.len().await, 2);
    }

    #[tokio::test]
    async fn stale_compare_and_swap_conflicts() {
        let engine = MemoryEngine::default();
        engine
            .exchange(Request::create("svc1", "alice", "$d1".to_string()))
            .await
            .unwrap();

        let resp = engine
            .handle_request(Request::update(
                "svc1",
                "alice",
                "$stale".to_string(),
                "$d2".to_string(),
            ))
            .await;
        assert_eq!(resp.outcome(), Outcome::Failure(ErrorTag::Conflict));

        let resp = engine
            .handle_request(Request::delete("svc1", "alice", Some("$stale".to_string())))
            .await;
        assert_eq!(resp.outcome(), Outcome::Failure(ErrorTag::Conflict));

        let resp = engine.handle_request(Request::verify("svc1", "alice")).await;
        assert_eq!(resp.digest(), Some("$d1"));
    }

    #[tokio::test]
    async fn missing_records() {
        let engine = MemoryEngine::default();
        for req in [
            Request::verify("svc1", "nobody"),
            Request::update("svc1", "nobody", "$a".to_string(), "$b".to_string()),
            Request::delete("svc1", "nobody", None),
        ] {
            let err = engine.exchange(req).await.unwrap_err();
            assert!(matches!(err, StorageError::NotFound { .. }));
        }
    }

    #[tokio::test]
    async fn forced_delete_ignores_digest() {
        let engine = MemoryEngine::default();
        engine
            .exchange(Request::create("svc1", "alice", "$d1".to_string()))
            .await
            .unwrap();
        engine
            .exchange(Request::delete("svc1", "alice", None))
            .await
            .unwrap();
        assert!(engine.is_empty().await);
    }
}
