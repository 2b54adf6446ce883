use argon2::password_hash::{
    Error as PhcError, PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::RngCore as _;
use serde::{Deserialize, Serialize};

use crate::error::HashError;

const SALT_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemeAlgorithm {
    Argon2id,
    Argon2i,
    Argon2d,
}

impl SchemeAlgorithm {
    /// PHC identifier, e.g. `argon2id`.
    pub fn ident(self) -> &'static str {
        match self {
            SchemeAlgorithm::Argon2id => "argon2id",
            SchemeAlgorithm::Argon2i => "argon2i",
            SchemeAlgorithm::Argon2d => "argon2d",
        }
    }

    fn from_ident(ident: &str) -> Option<Self> {
        match ident {
            "argon2id" => Some(SchemeAlgorithm::Argon2id),
            "argon2i" => Some(SchemeAlgorithm::Argon2i),
            "argon2d" => Some(SchemeAlgorithm::Argon2d),
            _ => None,
        }
    }

    fn to_argon2(self) -> Algorithm {
        match self {
            SchemeAlgorithm::Argon2id => Algorithm::Argon2id,
            SchemeAlgorithm::Argon2i => Algorithm::Argon2i,
            SchemeAlgorithm::Argon2d => Algorithm::Argon2d,
        }
    }
}

/// An identified hash algorithm plus its cost parameters.
///
/// Immutable and passed explicitly wherever digests are computed. Two schemes
/// are the same scheme only if every field matches; raising a cost factor makes
/// every digest produced under the old value stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HashScheme {
    pub algorithm: SchemeAlgorithm,
    /// Memory cost in KiB.
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for HashScheme {
    fn default() -> Self {
        Self {
            algorithm: SchemeAlgorithm::Argon2id,
            memory_kib: Params::DEFAULT_M_COST,
            iterations: Params::DEFAULT_T_COST,
            parallelism: Params::DEFAULT_P_COST,
        }
    }
}

impl HashScheme {
    pub const fn new(
        algorithm: SchemeAlgorithm,
        memory_kib: u32,
        iterations: u32,
        parallelism: u32,
    ) -> Self {
        Self {
            algorithm,
            memory_kib,
            iterations,
            parallelism,
        }
    }

    pub const fn argon2id(memory_kib: u32, iterations: u32, parallelism: u32) -> Self {
        Self::new(SchemeAlgorithm::Argon2id, memory_kib, iterations, parallelism)
    }

    pub fn validate(&self) -> Result<(), HashError> {
        self.params().map(|_| ())
    }

    /// Recovers the scheme a digest was produced under.
    pub fn from_digest(digest: &str) -> Result<Self, HashError> {
        let parsed = parse_digest(digest)?;
        scheme_of(&parsed)
    }

    /// Whether `digest` was produced under exactly this scheme.
    pub fn is_current(&self, digest: &str) -> Result<bool, HashError> {
        let parsed = parse_digest(digest)?;
        let current_version = parsed
            .version
            .is_none_or(|v| v == Version::V0x13 as u32);
        Ok(current_version && scheme_of(&parsed)? == *self)
    }

    /// Digests `secret` under this scheme with a fresh random salt.
    pub fn digest(&self, secret: &[u8]) -> Result<String, HashError> {
        let mut salt_bytes = [0u8; SALT_LEN];
        rand::rng().fill_bytes(&mut salt_bytes);
        let salt = SaltString::encode_b64(&salt_bytes)
            .map_err(|e| HashError::Hashing(format!("salt encode error: {e}")))?;

        let hash = self
            .hasher()?
            .hash_password(secret, &salt)
            .map_err(|e| HashError::Hashing(e.to_string()))?;
        Ok(hash.to_string())
    }

    /// Checks `secret` against `digest` using the scheme encoded in the digest.
    ///
    /// Output comparison is constant-time in the argon2 crate.
    pub fn matches(digest: &str, secret: &[u8]) -> Result<bool, HashError> {
        let parsed = parse_digest(digest)?;
        // Reject digests we could never have produced before spending any work.
        scheme_of(&parsed)?;
        match Argon2::default().verify_password(secret, &parsed) {
            Ok(()) => Ok(true),
            Err(PhcError::Password) => Ok(false),
            Err(e) => Err(HashError::Hashing(e.to_string())),
        }
    }

    fn params(&self) -> Result<Params, HashError> {
        Params::new(self.memory_kib, self.iterations, self.parallelism, None)
            .map_err(|e| HashError::InvalidScheme(e.to_string()))
    }

    fn hasher(&self) -> Result<Argon2<'static>, HashError> {
        Ok(Argon2::new(
            self.algorithm.to_argon2(),
            Version::V0x13,
            self.params()?,
        ))
    }
}

fn parse_digest(digest: &str) -> Result<PasswordHash<'_>, HashError> {
    PasswordHash::new(digest).map_err(|e| HashError::MalformedDigest(e.to_string()))
}

fn scheme_of(parsed: &PasswordHash<'_>) -> Result<HashScheme, HashError> {
    let algorithm = SchemeAlgorithm::from_ident(parsed.algorithm.as_str())
        .ok_or_else(|| HashError::UnsupportedScheme(parsed.algorithm.to_string()))?;
    let params =
        Params::try_from(parsed).map_err(|e| HashError::MalformedDigest(e.to_string()))?;
    Ok(HashScheme {
        algorithm,
        memory_kib: params.m_cost(),
        iterations: params.t_cost(),
        parallelism: params.p_cost(),
    })
}
