//! Hashing helpers for generated names.

use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 of `data`, truncated to `len` characters.
pub fn short_hash(data: &[u8], len: usize) -> String {
  let mut hasher = Sha256::new();
  hasher.update(data);
  let full = hex::encode(hasher.finalize());
  full[..len.min(full.len())].to_string()
}
