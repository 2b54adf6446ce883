//! Saltbox: a credential-integrity store.
//!
//! Callers register a secret under `(owner, key)`, later prove knowledge of it,
//! and update or remove the record once proof is given. Only salted,
//! scheme-tagged digests are ever stored.
//!
//! A [`CredentialService`] pairs a [`CredentialLogic`] (what create, verify,
//! update and delete mean) with a [`StorageEngine`] (where digests live), checked
//! once by [`build_service`]:
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use saltbox::{HashScheme, MemoryEngine, StandardLogic, build_service};
//!
//! let service = build_service(
//!     Arc::new(StandardLogic::new(HashScheme::default())),
//!     Arc::new(MemoryEngine::default()),
//! )?;
//!
//! let digest = service.create("svc1", "alice", "p@ss").await?;
//! assert!(service.verify("svc1", "alice", "p@ss").await?);
//! ```

mod authz;
mod error;
mod logic;
mod service;

pub use authz::AuthorizationChecker;
pub use error::{CompositionError, ServiceError};
pub use logic::{CredentialLogic, StandardLogic, UpdateOutcome};
pub use service::{CredentialService, build_service};

pub use saltbox_core::{HashError, HashRecord, HashScheme, SchemeAlgorithm, Secret, Sensitive};
pub use saltbox_protocol::{ErrorTag, Nonce, Operation, Outcome, Request, Response};
pub use saltbox_storage::{
    Capabilities, ClientEnd, EngineKind, EngineOptions, MemoryEngine, RemoteEngine,
    RemoteEngineOptions, ServerEnd, SqliteEngine, SqliteEngineOptions, StorageEngine,
    StorageError, StorageServer, channel, open_engine,
};
