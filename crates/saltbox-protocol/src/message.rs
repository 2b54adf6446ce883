use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque token pairing a [`Request`] with its [`Response`].
///
/// Uniqueness is the caller's or transport's concern; [`Nonce::generate`] hands
/// out random UUIDs for callers that have no scheme of their own.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Nonce(String);

impl Nonce {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Create,
    Verify,
    Update,
    Delete,
}

impl Operation {
    pub const ALL: [Operation; 4] = [
        Operation::Create,
        Operation::Verify,
        Operation::Update,
        Operation::Delete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Verify => "verify",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a storage operation did not succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorTag {
    /// No record for `(owner, key)`.
    NotFound,
    /// `create` on an existing `(owner, key)`.
    Duplicate,
    /// The stored digest no longer matches the one the caller expected.
    Conflict,
    /// The backend could not be reached or failed.
    Unavailable,
    /// The engine does not perform this operation.
    Unsupported,
    /// The request is missing an operand its operation needs.
    Malformed,
}

impl ErrorTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorTag::NotFound => "not_found",
            ErrorTag::Duplicate => "duplicate",
            ErrorTag::Conflict => "conflict",
            ErrorTag::Unavailable => "unavailable",
            ErrorTag::Unsupported => "unsupported",
            ErrorTag::Malformed => "malformed",
        }
    }
}

impl fmt::Display for ErrorTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failure(ErrorTag),
}

/// One storage operation and its operands.
///
/// Fields are fixed at construction. Each operation's constructor takes
/// exactly the operands it needs:
///
/// | operation | `digest`                        | `newDigest` |
/// |-----------|---------------------------------|-------------|
/// | create    | digest to store                 | -           |
/// | verify    | -                               | -           |
/// | update    | digest expected to be stored    | replacement |
/// | delete    | expected digest, or none to force | -         |
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    owner: String,
    nonce: Nonce,
    operation: Operation,
    key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    digest: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    new_digest: Option<String>,
}

impl Request {
    /// Builds a request with every field given explicitly, for callers and
    /// transports that assign their own nonces.
    pub fn new(
        owner: impl Into<String>,
        nonce: Nonce,
        operation: Operation,
        key: impl Into<String>,
        digest: Option<String>,
        new_digest: Option<String>,
    ) -> Self {
        Self {
            owner: owner.into(),
            nonce,
            operation,
            key: key.into(),
            digest,
            new_digest,
        }
    }

    pub fn create(owner: impl Into<String>, key: impl Into<String>, digest: String) -> Self {
        Self::new(
            owner,
            Nonce::generate(),
            Operation::Create,
            key,
            Some(digest),
            None,
        )
    }

    pub fn verify(owner: impl Into<String>, key: impl Into<String>) -> Self {
        Self::new(owner, Nonce::generate(), Operation::Verify, key, None, None)
    }

    pub fn update(
        owner: impl Into<String>,
        key: impl Into<String>,
        expected: String,
        replacement: String,
    ) -> Self {
        Self::new(
            owner,
            Nonce::generate(),
            Operation::Update,
            key,
            Some(expected),
            Some(replacement),
        )
    }

    pub fn delete(owner: impl Into<String>, key: impl Into<String>, expected: Option<String>) -> Self {
        Self::new(owner, Nonce::generate(), Operation::Delete, key, expected, None)
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn nonce(&self) -> &Nonce {
        &self.nonce
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn digest(&self) -> Option<&str> {
        self.digest.as_deref()
    }

    pub fn new_digest(&self) -> Option<&str> {
        self.new_digest.as_deref()
    }
}

/// The outcome of exactly one [`Request`], correlated by nonce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    owner: String,
    nonce: Nonce,
    operation: Operation,
    key: String,
    /// The stored digest after the operation, when there is one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    digest: Option<String>,
    outcome: Outcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

impl Response {
    pub fn success(request: &Request, digest: Option<String>) -> Self {
        Self {
            owner: request.owner.clone(),
            nonce: request.nonce.clone(),
            operation: request.operation,
            key: request.key.clone(),
            digest,
            outcome: Outcome::Success,
            detail: None,
        }
    }

    pub fn failure(request: &Request, tag: ErrorTag, detail: impl Into<String>) -> Self {
        Self {
            owner: request.owner.clone(),
            nonce: request.nonce.clone(),
            operation: request.operation,
            key: request.key.clone(),
            digest: None,
            outcome: Outcome::Failure(tag),
            detail: Some(detail.into()),
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn nonce(&self) -> &Nonce {
        &self.nonce
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn digest(&self) -> Option<&str> {
        self.digest.as_deref()
    }

    pub fn into_digest(self) -> Option<String> {
        self.digest
    }

    pub fn outcome(&self) -> Outcome {
        self.outcome
    }

    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }

    pub fn is_success(&self) -> bool {
        self.outcome == Outcome::Success
    }

    /// Whether this response answers `request`.
    pub fn answers(&self, request: &Request) -> bool {
        self.nonce == request.nonce
    }
}
