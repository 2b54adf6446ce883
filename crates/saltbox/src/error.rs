use saltbox_core::HashError;
use saltbox_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Hash(#[from] HashError),
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),
    #[error("no record for {owner}/{key}")]
    RecordNotFound { owner: String, key: String },
    #[error("record {owner}/{key} already exists")]
    DuplicateRecord { owner: String, key: String },
    #[error("not authorized to delete {owner}/{key}")]
    Unauthorized { owner: String, key: String },
    #[error("logic does not implement {0}")]
    Unsupported(&'static str),
    #[error("storage protocol error: {0}")]
    Protocol(String),
}

impl From<StorageError> for ServiceError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::Unavailable(msg) => ServiceError::StorageUnavailable(msg),
            StorageError::NotFound { owner, key } => ServiceError::RecordNotFound { owner, key },
            StorageError::Duplicate { owner, key } => ServiceError::DuplicateRecord { owner, key },
            other @ (StorageError::Conflict { .. }
            | StorageError::Unsupported(_)
            | StorageError::Malformed(_)
            | StorageError::Uncorrelated { .. }) => ServiceError::Protocol(other.to_string()),
        }
    }
}

/// A logic/engine pairing that cannot work, with every problem found.
#[derive(Debug, Error)]
#[error("{}", .violations.join(" and "))]
pub struct CompositionError {
    pub violations: Vec<String>,
}
