//! Core hashing types for the saltbox credential store.
//!
//! A [`HashRecord`] pairs an `(owner, key)` with a secret and/or its digest.
//! Digests are PHC strings that embed the [`HashScheme`] they were produced
//! under, so a stored digest stays verifiable after the preferred scheme moves on.

pub mod error;
pub mod record;
pub mod scheme;
pub mod sensitive;
pub mod util;

pub use error::HashError;
pub use record::{HashRecord, Verification};
pub use scheme::{HashScheme, SchemeAlgorithm};
pub use sensitive::{Secret, Sensitive};
