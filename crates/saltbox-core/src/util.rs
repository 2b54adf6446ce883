use sha2::{Digest, Sha256};

const FINGERPRINT_LEN: usize = 12;

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Short, log-safe identifier for a stored digest.
///
/// Digests are not secrets, but they are offline-attackable, so logs carry this
/// instead of the PHC string itself.
pub fn digest_fingerprint(digest: &str) -> String {
    let mut hex = sha256_hex(digest.as_bytes());
    hex.truncate(FINGERPRINT_LEN);
    hex
}
