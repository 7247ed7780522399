//! Content hashing for node identity.

use serde::Serialize;
use sha2::{Digest, Sha256};

use super::NodeId;

/// Compute the SHA-256 digest of a serializable value.
///
/// The value is serialized to JSON before hashing. Children of an operation
/// serialize as their ids, so hashing is linear in the size of the node
/// itself rather than the whole graph below it.
///
/// # Errors
/// Returns an error if the value cannot be serialized to JSON.
pub fn content_id<T: Serialize>(value: &T) -> Result<NodeId, serde_json::Error> {
    let json = serde_json::to_vec(value)?;
    let mut hasher = Sha256::new();
    hasher.update(&json);
    Ok(NodeId(hasher.finalize().into()))
}
