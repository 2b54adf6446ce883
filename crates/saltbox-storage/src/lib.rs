//! Storage engines for saltbox digests.
//!
//! Engines only ever see digests; hashing and verification happen in the service
//! layer. Every engine speaks the same [`Request`]/[`Response`] contract whether
//! it stores records in-process or forwards them to a remote authority:
//!
//! - [`MemoryEngine`] and [`SqliteEngine`] answer requests directly
//! - [`RemoteEngine`] sends requests across a [`channel`] to a [`StorageServer`]
//!
//! Engines give per-`(owner, key)` atomicity: `update` and `delete` are
//! compare-and-swap against the digest the caller last saw.
//!
//! [`Request`]: saltbox_protocol::Request
//! [`Response`]: saltbox_protocol::Response

mod memory_engine;
mod ops;
mod remote_engine;
mod server;
mod sqlite_engine;
mod types;

pub use memory_engine::MemoryEngine;
pub use remote_engine::{ClientEnd, RemoteEngine, RemoteEngineOptions, ServerEnd, channel};
pub use server::StorageServer;
pub use sqlite_engine::{SqliteEngine, SqliteEngineOptions};
pub use types::{
    Capabilities, EngineKind, EngineOptions, StorageEngine, StorageError, open_engine,
    unpack_response,
};
