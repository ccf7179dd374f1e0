use chrono::Utc;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::config::Config;
use crate::crypto::engine::CredentialEncryptionEngine;
use crate::crypto::token::{TokenClaims, TokenIssuer};
use crate::error::{AppError, Result};
use crate::models::credentials::Credentials;
use crate::models::session::{IssuedToken, SessionData, SessionRecord};
use crate::store::kv::{SessionStore, session_key};
use crate::validation::session::validate_credentials;

fn creation_failed(e: AppError) -> AppError {
    match e {
        AppError::SessionCreationFailed(_) | AppError::Validation(_) => e,
        other => AppError::SessionCreationFailed(other.to_string()),
    }
}

/// Issues, validates, revokes and refreshes session tokens.
///
/// Holds only handles: all session state lives in the store, and every call
/// reads it afresh.
pub struct SessionTokenService {
    store: Arc<dyn SessionStore>,
    engine: Arc<CredentialEncryptionEngine>,
    tokens: TokenIssuer,
    session_ttl: chrono::Duration,
}

impl SessionTokenService {
    /// Creates a new `SessionTokenService`.
    ///
    /// # Arguments
    ///
    /// * `store` - The key-value store holding session records.
    /// * `engine` - The credential encryption engine.
    /// * `config` - The application's configuration.
    pub fn new(
        store: Arc<dyn SessionStore>,
        engine: Arc<CredentialEncryptionEngine>,
        config: &Config,
    ) -> Result<Self> {
        Ok(Self {
            store,
            engine,
            tokens: TokenIssuer::new(config),
            session_ttl: config.session_ttl()?,
        })
    }

    /// Creates a session for the given credentials and issues its token.
    ///
    /// # Arguments
    ///
    /// * `credentials` - The upstream credentials, presented once.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `IssuedToken`. `Validation` for blank
    /// fields, `SessionCreationFailed` for everything else.
    pub async fn login(&self, credentials: &Credentials) -> Result<IssuedToken> {
        validate_credentials(credentials)?;

        let session_id = Uuid::new_v4().to_string();
        let user_id = Uuid::new_v4();
        let created_at = Utc::now();
        let expires_at = created_at
            .checked_add_signed(self.session_ttl)
            .ok_or_else(|| AppError::SessionCreationFailed("session expiry out of range".to_string()))?;

        let encrypted_credentials = self
            .engine
            .encrypt(credentials, &session_id)
            .await
            .map_err(creation_failed)?;

        let record = SessionRecord {
            user_id,
            encrypted_credentials,
            created_at,
            expires_at,
        };

        let token = self
            .tokens
            .issue(user_id, &session_id, created_at, expires_at)
            .map_err(creation_failed)?;

        let raw = sonic_rs::to_vec(&record).map_err(|e| creation_failed(e.into()))?;
        self.store
            .put(&session_key(&session_id), raw, record.ttl_seconds())
            .await
            .map_err(|e| {
                tracing::error!("❌ Session {} not persisted: {}", session_id, e);
                creation_failed(e)
            })?;

        tracing::info!("✅ Session created for user {} (expires {})", user_id, expires_at);
        Ok(IssuedToken { token, expires_at })
    }

    /// Resolves a token to its session, with typed failures.
    ///
    /// Expired and undecryptable sessions are deleted before the error is
    /// returned.
    pub async fn authenticate(&self, token: &str) -> Result<SessionData> {
        let claims = self.tokens.verify(token)?;
        let key = session_key(&claims.sid);

        let raw = self
            .store
            .get(&key)
            .await
            .inspect_err(|e| tracing::error!("❌ Store error reading session {}: {}", claims.sid, e))?
            .ok_or_else(|| {
                tracing::debug!("Session {} not found", claims.sid);
                AppError::SessionNotFound
            })?;

        let record: SessionRecord = match sonic_rs::from_slice(&raw) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!("❌ Invalid session JSON for {}: {}", claims.sid, e);
                self.purge(&key).await;
                return Err(AppError::SessionNotFound);
            }
        };

        if record.is_expired_at(Utc::now()) {
            tracing::warn!("❌ Session expired for user: {}", record.user_id);
            self.purge(&key).await;
            return Err(AppError::SessionNotFound);
        }

        if !bool::from(record.user_id.as_bytes().ct_eq(claims.sub.as_bytes())) {
            tracing::warn!("🚨 Token subject does not own session {}", claims.sid);
            return Err(AppError::InvalidToken);
        }

        let credentials = match self.engine.decrypt(&record.encrypted_credentials, &claims.sid).await {
            Ok(credentials) => credentials,
            Err(AppError::DecryptionFailed) => {
                tracing::warn!("🚨 Purging undecryptable session {}", claims.sid);
                self.purge(&key).await;
                return Err(AppError::DecryptionFailed);
            }
            Err(e) => return Err(e),
        };

        tracing::debug!("✅ User authenticated: {}", record.user_id);
        Ok(SessionData {
            user_id: record.user_id,
            credentials,
            created_at: record.created_at,
            expires_at: record.expires_at,
        })
    }

    /// Resolves a token to its session, or `None` on any failure.
    ///
    /// Invalid tokens never reach the store. Store outages deny.
    pub async fn validate(&self, token: &str) -> Option<SessionData> {
        self.authenticate(token).await.ok()
    }

    /// Deletes the session behind a token.
    ///
    /// # Returns
    ///
    /// `Ok(false)` for an invalid token, `Ok(true)` once the record is gone
    /// (including when it was already absent).
    pub async fn revoke(&self, token: &str) -> Result<bool> {
        let Ok(claims) = self.tokens.verify(token) else {
            return Ok(false);
        };

        self.store.delete(&session_key(&claims.sid)).await?;
        tracing::info!("🚪 Session {} revoked", claims.sid);
        Ok(true)
    }

    /// Replaces a session with a brand new one carrying the same credentials.
    ///
    /// # Returns
    ///
    /// `Ok(None)` when the token does not resolve to a live session.
    pub async fn refresh(&self, token: &str) -> Result<Option<IssuedToken>> {
        let Some(session) = self.validate(token).await else {
            return Ok(None);
        };

        if !self.revoke(token).await? {
            return Ok(None);
        }

        let issued = self.login(&session.credentials).await?;
        tracing::info!("🔄 Session refreshed for user {}", session.user_id);
        Ok(Some(issued))
    }

    /// Verifies a token and returns its claims without touching the store.
    pub fn inspect_token(&self, token: &str) -> Result<TokenClaims> {
        self.tokens.verify(token)
    }

    async fn purge(&self, key: &str) {
        if let Err(e) = self.store.delete(key).await {
            tracing::error!("❌ Could not delete {}: {}", key, e);
        }
    }
}
