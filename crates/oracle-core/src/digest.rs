//! Content digests used for change detection.

use sha2::{Digest, Sha256};

/// SHA-256 of `bytes`, lowercase hex.
///
/// ```rust
/// use oracle_core::digest::content_digest;
///
/// assert_eq!(content_digest(b"hello"), content_digest(b"hello"));
/// assert_ne!(content_digest(b"hello"), content_digest(b"hello world"));
/// ```
pub fn content_digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}
