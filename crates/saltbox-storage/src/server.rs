use std::sync::Arc;

use async_trait::async_trait;
use saltbox_core::util::digest_fingerprint;
use saltbox_protocol::{Request, Response};
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, warn};

use crate::remote_engine::ServerEnd;
use crate::types::{Capabilities, StorageEngine, StorageError};

/// The authority's entry point: answers requests arriving on a [`ServerEnd`]
/// using a backing engine.
///
/// Each request is handled on its own task; ordering between keys is not
/// preserved, and per-key atomicity comes from the backing engine.
#[derive(Debug)]
pub struct StorageServer {
    engine: Arc<dyn StorageEngine>,
    requests: Mutex<Option<mpsc::Receiver<Request>>>,
    responses: mpsc::Sender<Response>,
}

impl StorageServer {
    pub fn new(engine: Arc<dyn StorageEngine>, end: ServerEnd) -> Arc<Self> {
        Arc::new(Self {
            engine,
            requests: Mutex::new(Some(end.requests)),
            responses: end.responses,
        })
    }

    /// Serves until the client end closes.
    pub async fn serve(self: Arc<Self>) -> Result<(), StorageError> {
        let mut requests = self
            .requests
            .lock()
            .await
            .take()
            .ok_or_else(|| StorageError::Unavailable("server is already serving".to_string()))?;

        info!("storage server started");
        while let Some(request) = requests.recv().await {
            let server = self.clone();
            tokio::spawn(async move {
                let response = server.handle_request(request).await;
                if let Err(e) = server.send_response(&response).await {
                    warn!(nonce = %response.nonce(), error = %e, "failed to send response");
                }
            });
        }
        info!("storage server stopped: client end closed");
        Ok(())
    }

    pub fn spawn(
        engine: Arc<dyn StorageEngine>,
        end: ServerEnd,
    ) -> tokio::task::JoinHandle<Result<(), StorageError>> {
        tokio::spawn(Self::new(engine, end).serve())
    }
}

#[async_trait]
impl StorageEngine for StorageServer {
    fn capabilities(&self) -> Capabilities {
        Capabilities::SERVER
    }

    async fn handle_request(&self, request: Request) -> Response {
        debug!(
            owner = %request.owner(),
            key = %request.key(),
            nonce = %request.nonce(),
            operation = %request.operation(),
            digest = ?request.digest().map(digest_fingerprint),
            "handling request"
        );
        match self.engine.exchange(request.clone()).await {
            Ok(response) => response,
            Err(e) => Response::failure(&request, e.tag(), e.to_string()),
        }
    }

    async fn send_response(&self, response: &Response) -> Result<(), StorageError> {
        self.responses
            .send(response.clone())
            .await
            .map_err(|_| StorageError::Unavailable("client end closed".to_string()))
    }
}
