use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use saltbox_protocol::{Nonce, Request, Response};
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::types::{Capabilities, StorageEngine, StorageError, unpack_response};

/// Requesting side of a message channel.
#[derive(Debug)]
pub struct ClientEnd {
    requests: mpsc::Sender<Request>,
    responses: mpsc::Receiver<Response>,
}

impl ClientEnd {
    /// Wraps channels a transport pumps to and from the wire.
    pub fn new(requests: mpsc::Sender<Request>, responses: mpsc::Receiver<Response>) -> Self {
        Self {
            requests,
            responses,
        }
    }
}

/// Authority side of a message channel.
#[derive(Debug)]
pub struct ServerEnd {
    pub(crate) requests: mpsc::Receiver<Request>,
    pub(crate) responses: mpsc::Sender<Response>,
}

impl ServerEnd {
    pub fn new(requests: mpsc::Receiver<Request>, responses: mpsc::Sender<Response>) -> Self {
        Self {
            requests,
            responses,
        }
    }
}

/// In-process channel pair with room for `capacity` queued messages each way.
pub fn channel(capacity: usize) -> (ClientEnd, ServerEnd) {
    let (req_tx, req_rx) = mpsc::channel(capacity);
    let (resp_tx, resp_rx) = mpsc::channel(capacity);
    (ClientEnd::new(req_tx, resp_rx), ServerEnd::new(req_rx, resp_tx))
}

#[derive(Debug, Clone)]
pub struct RemoteEngineOptions {
    /// Upper bound on one round trip, queueing included.
    pub timeout: Duration,
}

impl Default for RemoteEngineOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
        }
    }
}

type Pending = Arc<Mutex<HashMap<Nonce, oneshot::Sender<Response>>>>;

/// Client engine forwarding every operation to a remote authority.
///
/// Round trips may overlap; responses are matched to requests by nonce. A
/// round trip that outlives the timeout fails with
/// [`StorageError::Unavailable`] and is not retried.
#[derive(Debug)]
pub struct RemoteEngine {
    requests: mpsc::Sender<Request>,
    pending: Pending,
    timeout: Duration,
    dispatcher: JoinHandle<()>,
}

impl RemoteEngine {
    /// Must be called from within a tokio runtime: the response dispatcher
    /// runs as a spawned task.
    pub fn new(end: ClientEnd, opts: RemoteEngineOptions) -> Self {
        let pending = Pending::default();
        let dispatcher = tokio::spawn(dispatch(end.responses, pending.clone()));
        Self {
            requests: end.requests,
            pending,
            timeout: opts.timeout,
            dispatcher,
        }
    }

    pub async fn in_flight(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Claims `nonce` for one round trip. A nonce already in flight belongs to
    /// its first request and is left untouched.
    async fn register(&self, nonce: &Nonce) -> Result<oneshot::Receiver<Response>, StorageError> {
        let (tx, rx) = oneshot::channel();
        let mut pending = self.pending.lock().await;
        if pending.contains_key(nonce) {
            return Err(StorageError::Malformed(format!(
                "nonce {nonce} already in flight"
            )));
        }
        pending.insert(nonce.clone(), tx);
        Ok(rx)
    }

    async fn round_trip(
        &self,
        request: &Request,
        rx: oneshot::Receiver<Response>,
    ) -> Result<Response, StorageError> {
        self.requests
            .send(request.clone())
            .await
            .map_err(|_| StorageError::Unavailable("remote channel closed".to_string()))?;

        rx.await.map_err(|_| {
            StorageError::Unavailable("remote closed before responding".to_string())
        })
    }
}

impl Drop for RemoteEngine {
    fn drop(&mut self) {
        self.dispatcher.abort();
    }
}

async fn dispatch(mut responses: mpsc::Receiver<Response>, pending: Pending) {
    while let Some(response) = responses.recv().await {
        let waiter = pending.lock().await.remove(response.nonce());
        match waiter {
            Some(tx) => {
                // The waiter may have timed out in the meantime.
                let _ = tx.send(response);
            }
            None => warn!(
                nonce = %response.nonce(),
                operation = %response.operation(),
                "dropping response with no pending request"
            ),
        }
    }
    debug!("remote response stream closed");
    // Dropping the senders wakes every waiter with an error.
    pending.lock().await.clear();
}

#[async_trait]
impl StorageEngine for RemoteEngine {
    fn capabilities(&self) -> Capabilities {
        Capabilities::CLIENT
    }

    async fn send_request(&self, request: &Request) -> Result<Response, StorageError> {
        let rx = self.register(request.nonce()).await?;
        match tokio::time::timeout(self.timeout, self.round_trip(request, rx)).await {
            Ok(result) => {
                if result.is_err() {
                    self.pending.lock().await.remove(request.nonce());
                }
                result
            }
            Err(_) => {
                self.pending.lock().await.remove(request.nonce());
                warn!(
                    nonce = %request.nonce(),
                    operation = %request.operation(),
                    timeout_ms = self.timeout.as_millis() as u64,
                    "remote round trip timed out"
                );
                Err(StorageError::Unavailable(format!(
                    "no response within {}ms",
                    self.timeout.as_millis()
                )))
            }
        }
    }

    async fn handle_response(
        &self,
        request: &Request,
        response: Response,
    ) -> Result<Response, StorageError> {
        unpack_response(request, response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use saltbox_protocol::{ErrorTag, Nonce, Operation};

    fn fast() -> RemoteEngineOptions {
        RemoteEngineOptions {
            timeout: Duration::from_millis(200),
        }
    }

    #[tokio::test]
    async fn silent_authority_times_out_as_unavailable() {
        let (client, _server) = channel(4);
        let engine = RemoteEngine::new(client, fast());

        let err = engine
            .exchange(Request::verify("svc1", "alice"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Unavailable(_)));
        assert_eq!(engine.in_flight().await, 0);
    }

    #[tokio::test]
    async fn closed_authority_is_unavailable() {
        let (client, server) = channel(4);
        drop(server);
        let engine = RemoteEngine::new(client, fast());

        let err = engine
            .exchange(Request::verify("svc1", "alice"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Unavailable(_)));
    }

    #[tokio::test]
    async fn responses_are_routed_by_nonce() {
        let (client, mut server) = channel(4);
        let engine = Arc::new(RemoteEngine::new(client, fast()));

        let a = Request::new("svc1", Nonce::new("a"), Operation::Verify, "alice", None, None);
        let b = Request::new("svc1", Nonce::new("b"), Operation::Verify, "bob", None, None);

        let ea = engine.clone();
        let ra = a.clone();
        let first = tokio::spawn(async move { ea.exchange(ra).await });
        let eb = engine.clone();
        let rb = b.clone();
        let second = tokio::spawn(async move { eb.exchange(rb).await });

        let mut seen = Vec::new();
        for _ in 0..2 {
            seen.push(server.requests.recv().await.unwrap());
        }
        // Answer in reverse arrival order, plus one stray response.
        server
            .responses
            .send(Response::success(
                &Request::new("svc1", Nonce::new("stray"), Operation::Verify, "x", None, None),
                None,
            ))
            .await
            .unwrap();
        for req in seen.iter().rev() {
            let digest = format!("${}", req.key());
            server
                .responses
                .send(Response::success(req, Some(digest)))
                .await
                .unwrap();
        }

        let first = first.await.unwrap().unwrap();
        let second = second.await.unwrap().unwrap();
        assert_eq!(first.digest(), Some("$alice"));
        assert_eq!(second.digest(), Some("$bob"));
    }

    #[tokio::test]
    async fn reused_nonce_leaves_first_request_intact() {
        let (client, mut server) = channel(4);
        let engine = Arc::new(RemoteEngine::new(client, fast()));
        let req = Request::new("svc1", Nonce::new("same"), Operation::Verify, "alice", None, None);

        let first = {
            let engine = engine.clone();
            let req = req.clone();
            tokio::spawn(async move { engine.exchange(req).await })
        };
        let delivered = server.requests.recv().await.unwrap();

        let err = engine.exchange(req.clone()).await.unwrap_err();
        assert!(matches!(err, StorageError::Malformed(_)));
        assert_eq!(engine.in_flight().await, 1);

        server
            .responses
            .send(Response::success(&delivered, Some("$d1".to_string())))
            .await
            .unwrap();
        let resp = first.await.unwrap().unwrap();
        assert_eq!(resp.digest(), Some("$d1"));
        assert_eq!(engine.in_flight().await, 0);
    }

    #[tokio::test]
    async fn failure_outcome_becomes_error() {
        let (client, mut server) = channel(4);
        let engine = RemoteEngine::new(client, fast());

        let answer = tokio::spawn(async move {
            let req = server.requests.recv().await.unwrap();
            server
                .responses
                .send(Response::failure(&req, ErrorTag::Duplicate, "exists"))
                .await
                .unwrap();
        });

        let err = engine
            .exchange(Request::create("svc1", "alice", "$d".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Duplicate { .. }));
        answer.await.unwrap();
    }
}
