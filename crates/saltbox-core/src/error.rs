use thiserror::Error;

#[derive(Debug, Error)]
pub enum HashError {
    #[error("cannot compute a digest without a secret")]
    NoSecret,
    #[error("cannot verify against an empty digest")]
    NoDigest,
    #[error("secret does not verify against the supplied digest")]
    Mismatch,
    #[error("invalid hash scheme: {0}")]
    InvalidScheme(String),
    #[error("unsupported hash scheme: {0}")]
    UnsupportedScheme(String),
    #[error("malformed digest: {0}")]
    MalformedDigest(String),
    #[error("hashing failed: {0}")]
    Hashing(String),
}
