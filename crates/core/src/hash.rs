//! Content hashing used to decide whether a task actually changed a file.

use sha2::{Digest, Sha256};

/// Number of hex characters kept from the SHA-256 digest.
pub const CONTENT_HASH_LEN: usize = 16;

/// Hash file content, returning the first [`CONTENT_HASH_LEN`] lowercase
/// hex characters of its SHA-256 digest.
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let mut digest = hex::encode(hasher.finalize());
    digest.truncate(CONTENT_HASH_LEN);
    digest
}
