use std::fmt::Debug;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use saltbox_protocol::{ErrorTag, Nonce, Outcome, Request, Response};
use thiserror::Error;

use crate::memory_engine::MemoryEngine;
use crate::sqlite_engine::{SqliteEngine, SqliteEngineOptions};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("no record for {owner}/{key}")]
    NotFound { owner: String, key: String },
    #[error("record {owner}/{key} already exists")]
    Duplicate { owner: String, key: String },
    #[error("record {owner}/{key} changed since it was read")]
    Conflict { owner: String, key: String },
    #[error("engine does not support {0}")]
    Unsupported(String),
    #[error("malformed request: {0}")]
    Malformed(String),
    #[error("response {got} does not answer request {expected}")]
    Uncorrelated { expected: Nonce, got: Nonce },
}

impl StorageError {
    pub fn tag(&self) -> ErrorTag {
        match self {
            StorageError::Unavailable(_) | StorageError::Uncorrelated { .. } => {
                ErrorTag::Unavailable
            }
            StorageError::NotFound { .. } => ErrorTag::NotFound,
            StorageError::Duplicate { .. } => ErrorTag::Duplicate,
            StorageError::Conflict { .. } => ErrorTag::Conflict,
            StorageError::Unsupported(_) => ErrorTag::Unsupported,
            StorageError::Malformed(_) => ErrorTag::Malformed,
        }
    }

    fn from_failure(request: &Request, tag: ErrorTag, detail: Option<&str>) -> Self {
        let owner = request.owner().to_string();
        let key = request.key().to_string();
        let detail = detail.unwrap_or(tag.as_str()).to_string();
        match tag {
            ErrorTag::NotFound => StorageError::NotFound { owner, key },
            ErrorTag::Duplicate => StorageError::Duplicate { owner, key },
            ErrorTag::Conflict => StorageError::Conflict { owner, key },
            ErrorTag::Unavailable => StorageError::Unavailable(detail),
            ErrorTag::Unsupported => StorageError::Unsupported(detail),
            ErrorTag::Malformed => StorageError::Malformed(detail),
        }
    }
}

/// Which complete method pairs an engine implements.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// `send_request` + `handle_response`: forwards to a remote authority.
    pub client: bool,
    /// `handle_request` + `send_response`: answers requests itself.
    pub server: bool,
}

impl Capabilities {
    pub const CLIENT: Self = Self {
        client: true,
        server: false,
    };
    pub const SERVER: Self = Self {
        client: false,
        server: true,
    };

    pub fn any(&self) -> bool {
        self.client || self.server
    }
}

/// Where digests live.
///
/// An engine implements at least one complete pair and reports which through
/// [`capabilities`](StorageEngine::capabilities). Methods outside the
/// implemented pairs keep their default bodies, which refuse the call.
///
/// A `false` verification is never produced here: engines only report stored
/// digests and failures. [`StorageError`] always means "could not check".
#[async_trait]
pub trait StorageEngine: Debug + Send + Sync {
    /// Must name exactly the pairs this engine overrides; composition trusts it.
    fn capabilities(&self) -> Capabilities;

    /// Delivers `request` to the remote authority and waits for the response.
    ///
    /// Returns once the matching response arrives or the round trip fails.
    /// Never retried here: replaying a write could apply it twice.
    async fn send_request(&self, request: &Request) -> Result<Response, StorageError> {
        let _ = request;
        Err(StorageError::Unsupported("send_request".to_string()))
    }

    /// Unpacks the authority's response to `request`.
    async fn handle_response(
        &self,
        request: &Request,
        response: Response,
    ) -> Result<Response, StorageError> {
        let _ = (request, response);
        Err(StorageError::Unsupported("handle_response".to_string()))
    }

    /// Performs `request` against this engine's records.
    ///
    /// Failures are reported in the response outcome, not as errors.
    async fn handle_request(&self, request: Request) -> Response {
        Response::failure(&request, ErrorTag::Unsupported, "handle_request")
    }

    /// Returns `response` to whoever sent the request.
    async fn send_response(&self, response: &Response) -> Result<(), StorageError> {
        let _ = response;
        Err(StorageError::Unsupported("send_response".to_string()))
    }

    /// One blocking round trip through whichever pair this engine implements.
    ///
    /// Failure outcomes come back as the matching [`StorageError`].
    async fn exchange(&self, request: Request) -> Result<Response, StorageError> {
        let caps = self.capabilities();
        if caps.server {
            let response = self.handle_request(request.clone()).await;
            self.send_response(&response).await?;
            return unpack_response(&request, response);
        }
        if caps.client {
            let response = self.send_request(&request).await?;
            return self.handle_response(&request, response).await;
        }
        Err(StorageError::Unsupported(
            "send_request/handle_response or handle_request/send_response".to_string(),
        ))
    }
}

/// Checks that `response` answers `request` and turns a failure outcome into
/// the matching error.
pub fn unpack_response(request: &Request, response: Response) -> Result<Response, StorageError> {
    if !response.answers(request) {
        return Err(StorageError::Uncorrelated {
            expected: request.nonce().clone(),
            got: response.nonce().clone(),
        });
    }
    match response.outcome() {
        Outcome::Success => Ok(response),
        Outcome::Failure(tag) => Err(StorageError::from_failure(
            request,
            tag,
            response.detail(),
        )),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineKind {
    Memory,
    Sqlite,
}

#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub kind: EngineKind,
    /// Used by the `Sqlite` engine.
    pub data_dir: PathBuf,
}

pub async fn open_engine(opts: EngineOptions) -> Result<Arc<dyn StorageEngine>, StorageError> {
    match opts.kind {
        EngineKind::Memory => Ok(Arc::new(MemoryEngine::default())),
        EngineKind::Sqlite => Ok(Arc::new(
            SqliteEngine::open(SqliteEngineOptions {
                path: opts.data_dir.join("saltbox.sqlite"),
            })
            .await?,
        )),
    }
}
