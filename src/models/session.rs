use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::credentials::Credentials;
use crate::models::payload::EncryptedPayload;

/// A persisted session, stored at `session:{session_id}`.
///
/// ⚠️ IMPORTANT: `encrypted_credentials` is bound to the session id it was
/// encrypted under. It cannot be moved to another session record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    /// The ID of the user this session belongs to.
    pub user_id: Uuid,
    /// The credentials, encrypted under a session subkey.
    pub encrypted_credentials: EncryptedPayload,
    /// The timestamp when the session was created.
    pub created_at: DateTime<Utc>,
    /// The timestamp when the session expires.
    pub expires_at: DateTime<Utc>,
}

impl SessionRecord {
    /// Whether the session has passed its expiry at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }

    /// Store TTL in seconds, never below one.
    pub fn ttl_seconds(&self) -> u64 {
        (self.expires_at - self.created_at).num_seconds().max(1) as u64
    }
}

/// A validated session, as handed to the storage layer above.
#[derive(Debug, Clone)]
pub struct SessionData {
    /// The ID of the user this session belongs to.
    pub user_id: Uuid,
    /// The decrypted upstream credentials.
    pub credentials: Credentials,
    /// The timestamp when the session was created.
    pub created_at: DateTime<Utc>,
    /// The timestamp when the session expires.
    pub expires_at: DateTime<Utc>,
}

/// A freshly issued bearer token.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedToken {
    /// The signed bearer token.
    pub token: String,
    /// When the token and its session expire.
    pub expires_at: DateTime<Utc>,
}
