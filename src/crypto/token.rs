//! Signed bearer tokens.
//!
//! Tokens are HS256 JWTs carrying [`TokenClaims`]. They reference a session
//! record by id but carry no credential material, and their expiry is
//! checked independently of the session record's own expiry.

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::Config;
use crate::crypto::kdf;
use crate::error::{AppError, Result};
use crate::validation::session::validate_session_id;

/// Claims embedded in every token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject -- the session's user id.
    pub sub: Uuid,
    /// The session record this token refers to.
    pub sid: String,
    /// Issued-at time (UTC Unix timestamp).
    pub iat: i64,
    /// Expiration time (UTC Unix timestamp).
    pub exp: i64,
}

/// Issues and verifies session tokens.
#[derive(Clone)]
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl TokenIssuer {
    /// Creates a `TokenIssuer` from a raw signing secret.
    pub fn from_secret(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub", "iat"]);

        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
        }
    }

    /// Creates a `TokenIssuer` from configuration.
    ///
    /// Uses `token_signing_secret` when set, otherwise a secret derived from
    /// the primary master key.
    pub fn new(config: &Config) -> Self {
        match &config.token_signing_secret {
            Some(secret) => Self::from_secret(secret.as_bytes()),
            None => Self::from_secret(&kdf::token_signing_secret(config.primary_master_key.as_bytes())),
        }
    }

    /// Signs a token for a session.
    ///
    /// # Arguments
    ///
    /// * `user_id` - The session's user id.
    /// * `session_id` - The session record id.
    /// * `issued_at` - Issue time.
    /// * `expires_at` - Expiry time, normally equal to the session record's.
    ///
    /// # Returns
    ///
    /// A `Result` containing the encoded token.
    pub fn issue(
        &self,
        user_id: Uuid,
        session_id: &str,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<String> {
        let claims = TokenClaims {
            sub: user_id,
            sid: session_id.to_string(),
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AppError::Serialization(format!("token signing: {}", e)))
    }

    /// Verifies signature and expiry and decodes the claims.
    ///
    /// Every failure is `InvalidToken`; the reason is only logged.
    pub fn verify(&self, token: &str) -> Result<TokenClaims> {
        let claims = decode::<TokenClaims>(token, &self.decoding, &self.validation)
            .map_err(|e| {
                tracing::debug!("❌ Token rejected: {}", e);
                AppError::InvalidToken
            })?
            .claims;

        validate_session_id(&claims.sid).map_err(|_| AppError::InvalidToken)?;
        Ok(claims)
    }
}
