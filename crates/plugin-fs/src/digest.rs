//! SHA-256 digests used to derive stable file and directory names

use sha2::{Digest, Sha256};

/// Full lowercase hex SHA-256 of `content`.
pub fn sha256_hex(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// First 16 hex characters of the SHA-256 of `content`.
pub fn short_digest(content: &str) -> String {
    let mut hex = sha256_hex(content);
    hex.truncate(16);
    hex
}
