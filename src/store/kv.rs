use async_trait::async_trait;

use crate::error::Result;

/// Key of the pointer naming the active master key version.
pub const KEY_METADATA_CURRENT: &str = "key_metadata:current";

/// Store key for a session record.
pub fn session_key(session_id: &str) -> String {
    format!("session:{}", session_id)
}

/// Store key for a master key metadata record.
pub fn key_metadata_key(version: u32) -> String {
    format!("key_metadata:{}", version)
}

/// The external key-value store holding sessions and key metadata.
///
/// Operations are atomic per key only. Callers make no cross-key
/// transactional assumptions.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Reads a value. Absent and expired keys both yield `None`.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Writes a value. A `ttl_seconds` of 0 stores it without expiry.
    async fn put(&self, key: &str, value: Vec<u8>, ttl_seconds: u64) -> Result<()>;

    /// Deletes a value. Deleting an absent key succeeds.
    async fn delete(&self, key: &str) -> Result<()>;
}
