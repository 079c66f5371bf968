//! Chunk identity.

use sha2::{Digest, Sha256};
use std::ops::Range;

/// Hex characters kept from the id digest.
const ID_LEN: usize = 32;

/// Calculate SHA-256 hash of text.
pub fn calculate_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Stable chunk id from the owning path, byte range and text.
pub fn chunk_id(path: &str, bytes: &Range<usize>, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(path.as_bytes());
    hasher.update([0u8]);
    hasher.update(bytes.start.to_string().as_bytes());
    hasher.update([0u8]);
    hasher.update(bytes.end.to_string().as_bytes());
    hasher.update([0u8]);
    hasher.update(text.as_bytes());
    let mut id = format!("{:x}", hasher.finalize());
    id.truncate(ID_LEN);
    id
}
