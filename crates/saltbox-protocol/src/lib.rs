//! Request/response contract between the saltbox service and storage engines.
//!
//! This crate exists so the service, direct engines, and remote transports share
//! one definition of a message. It defines field names and meaning only; wire
//! framing belongs to whatever transport carries the messages.

mod message;

pub use message::{ErrorTag, Nonce, Operation, Outcome, Request, Response};
