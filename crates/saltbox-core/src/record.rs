use std::fmt;

use crate::error::HashError;
use crate::scheme::HashScheme;
use crate::sensitive::Secret;
use crate::util::digest_fingerprint;

/// Result of [`HashRecord::verify_and_upgrade`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verification {
    pub verified: bool,
    /// New digest under the preferred scheme, present only when the secret
    /// verified against a digest produced under a different scheme.
    pub upgraded: Option<String>,
}

/// An `(owner, key)` with a transient secret and/or its digest.
///
/// Records live for a single service call. The secret is never persisted; only
/// the digest leaves the record. Construction guarantees at least one of the
/// two is present.
pub struct HashRecord {
    owner: String,
    key: String,
    secret: Option<Secret>,
    digest: Option<String>,
    scheme: HashScheme,
}

impl HashRecord {
    /// Digests `secret` under `scheme`.
    pub fn from_secret(
        owner: impl Into<String>,
        key: impl Into<String>,
        secret: Secret,
        scheme: HashScheme,
    ) -> Result<Self, HashError> {
        let mut record = Self {
            owner: owner.into(),
            key: key.into(),
            secret: None,
            digest: None,
            scheme,
        };
        record.digest(Some(secret))?;
        Ok(record)
    }

    /// Wraps a stored digest. The digest may use a scheme other than `scheme`.
    pub fn from_digest(
        owner: impl Into<String>,
        key: impl Into<String>,
        digest: impl Into<String>,
        scheme: HashScheme,
    ) -> Self {
        Self {
            owner: owner.into(),
            key: key.into(),
            secret: None,
            digest: Some(digest.into()),
            scheme,
        }
    }

    /// Pairs a stored digest with a caller-supplied secret.
    ///
    /// Fails with [`HashError::Mismatch`] unless the secret verifies. A digest
    /// produced under a stale scheme is replaced by one under `scheme`.
    pub fn from_parts(
        owner: impl Into<String>,
        key: impl Into<String>,
        secret: Secret,
        digest: impl Into<String>,
        scheme: HashScheme,
    ) -> Result<Self, HashError> {
        let mut record = Self::from_digest(owner, key, digest, scheme);
        let check = record.verify_and_upgrade(Some(&secret))?;
        if !check.verified {
            return Err(HashError::Mismatch);
        }
        record.secret = Some(secret);
        Ok(record)
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn scheme(&self) -> &HashScheme {
        &self.scheme
    }

    pub fn digest_value(&self) -> Option<&str> {
        self.digest.as_deref()
    }

    pub fn has_secret(&self) -> bool {
        self.secret.is_some()
    }

    pub fn into_digest(self) -> Option<String> {
        self.digest
    }

    /// Computes and stores the digest of `secret`, or of the stored secret when
    /// `secret` is `None`.
    pub fn digest(&mut self, secret: Option<Secret>) -> Result<&str, HashError> {
        if let Some(secret) = secret {
            self.secret = Some(secret);
        }
        let secret = self.secret.as_ref().ok_or(HashError::NoSecret)?;
        let digest = self.scheme.digest(secret.as_bytes())?;
        Ok(self.digest.insert(digest).as_str())
    }

    /// Checks `secret` (or the stored secret) against the stored digest, using
    /// the scheme the digest was produced under.
    pub fn verify(&self, secret: Option<&Secret>) -> Result<bool, HashError> {
        let secret = secret.or(self.secret.as_ref()).ok_or(HashError::NoSecret)?;
        let digest = self.digest.as_deref().ok_or(HashError::NoDigest)?;
        HashScheme::matches(digest, secret.as_bytes())
    }

    /// Re-checks the stored secret against the stored digest.
    pub fn is_verified(&self) -> Result<bool, HashError> {
        self.verify(None)
    }

    /// Like [`verify`](Self::verify), but moves a stale digest onto the
    /// preferred scheme when the secret matches.
    ///
    /// For a stale digest the replacement is computed before the outcome is
    /// known and dropped on mismatch, so the hashing work done is the same for
    /// a wrong secret and a right one.
    pub fn verify_and_upgrade(
        &mut self,
        secret: Option<&Secret>,
    ) -> Result<Verification, HashError> {
        let secret = secret.or(self.secret.as_ref()).ok_or(HashError::NoSecret)?;
        let digest = self.digest.as_deref().ok_or(HashError::NoDigest)?;

        let candidate = if self.scheme.is_current(digest)? {
            None
        } else {
            Some(self.scheme.digest(secret.as_bytes())?)
        };

        let verified = HashScheme::matches(digest, secret.as_bytes())?;
        let upgraded = match candidate {
            Some(next) if verified => {
                self.digest = Some(next.clone());
                Some(next)
            }
            _ => None,
        };
        Ok(Verification { verified, upgraded })
    }

    /// Drops the secret (zeroing its buffer) and the digest. The scheme is kept.
    pub fn clear(&mut self) {
        self.secret = None;
        self.digest = None;
    }
}

impl fmt::Debug for HashRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HashRecord")
            .field("owner", &self.owner)
            .field("key", &self.key)
            .field("secret", &self.secret)
            .field("digest", &self.digest.as_deref().map(digest_fingerprint))
            .field("scheme", &self.scheme)
            .finish()
    }
}

impl fmt::Display for HashRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secret_len = self.secret.as_ref().map_or(0, Secret::len);
        let digest = self
            .digest
            .as_deref()
            .map(digest_fingerprint)
            .unwrap_or_default();
        write!(
            f,
            "HashRecord {}/{}: secret length {secret_len}, digest '{digest}'",
            self.owner, self.key
        )
    }
}
