//! Stable service identity

use sha2::{Digest, Sha256};

/// Derive the unique id of a service.
///
/// Lowercase hex SHA-256 of `"{username}{aid}{iid}{type}"`. The same tuple
/// yields the same id across passes and restarts, which is what lets a
/// persisted index be merged with a fresh discovery pass.
pub fn unique_id(username: &str, aid: i64, iid: i64, type_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(username.as_bytes());
    hasher.update(aid.to_string().as_bytes());
    hasher.update(iid.to_string().as_bytes());
    hasher.update(type_id.as_bytes());
    hex::encode(hasher.finalize())
}
