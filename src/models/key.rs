use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::payload::base64_bytes;

/// Lifecycle state of a master key version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyStatus {
    /// Used for encryption and decryption. Exactly one version is active.
    Active,
    /// Decrypt only, until `expires_at`.
    Deprecated,
    /// Never used again.
    Revoked,
}

/// Persisted metadata for one master key version, stored at `key_metadata:{version}`.
///
/// The key material travels with the record, sealed under the registry's
/// wrapping key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MasterKeyRecord {
    /// The version of the key.
    pub version: u32,
    /// When this version was created.
    pub created_at: DateTime<Utc>,
    /// Lifecycle state.
    pub status: KeyStatus,
    /// End of usability, if bounded.
    pub expires_at: Option<DateTime<Utc>>,
    /// Key material encrypted under the wrapping key.
    #[serde(with = "base64_bytes")]
    pub wrapped_key: Vec<u8>,
    /// Nonce used to wrap the key material.
    #[serde(with = "base64_bytes")]
    pub wrap_nonce: Vec<u8>,
}

impl MasterKeyRecord {
    /// Whether the key may still be used to decrypt at `now`.
    pub fn is_usable_at(&self, now: DateTime<Utc>) -> bool {
        self.status != KeyStatus::Revoked && !self.is_expired_at(now)
    }

    /// Whether `expires_at` has passed.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }

    /// Metadata view without key material.
    pub fn info(&self) -> MasterKeyInfo {
        MasterKeyInfo {
            version: self.version,
            created_at: self.created_at,
            status: self.status,
            expires_at: self.expires_at,
        }
    }
}

/// Key metadata safe to log or display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MasterKeyInfo {
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub status: KeyStatus,
    pub expires_at: Option<DateTime<Utc>>,
}
