use std::sync::Arc;
use zeroize::Zeroizing;

use crate::config::Config;
use crate::crypto::aes;
use crate::crypto::kdf::{MasterKey, derive_session_key};
use crate::crypto::registry::MasterKeyRegistry;
use crate::error::{AppError, Result};
use crate::models::credentials::Credentials;
use crate::models::payload::EncryptedPayload;
use crate::validation::session::validate_session_id;

fn encryption_failed(e: AppError) -> AppError {
    match e {
        AppError::EncryptionFailed(_) => e,
        other => AppError::EncryptionFailed(other.to_string()),
    }
}

/// Seals credentials under per-session subkeys derived from the registry's keys.
pub struct CredentialEncryptionEngine {
    registry: Arc<MasterKeyRegistry>,
    kdf_iterations: u32,
    fallback_key_limit: usize,
}

impl CredentialEncryptionEngine {
    /// Creates a new `CredentialEncryptionEngine`.
    ///
    /// # Arguments
    ///
    /// * `registry` - The master key registry.
    /// * `config` - The application's configuration.
    pub fn new(registry: Arc<MasterKeyRegistry>, config: &Config) -> Self {
        Self {
            registry,
            kdf_iterations: config.kdf_iterations,
            fallback_key_limit: config.fallback_key_limit,
        }
    }

    /// Encrypts credentials for one session under the current master key.
    ///
    /// # Arguments
    ///
    /// * `credentials` - The credentials to seal.
    /// * `session_id` - The session the payload is bound to.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `EncryptedPayload`.
    pub async fn encrypt(&self, credentials: &Credentials, session_id: &str) -> Result<EncryptedPayload> {
        validate_session_id(session_id)?;

        let (master, key_version) = self.registry.current_key().await.map_err(encryption_failed)?;
        let subkey = derive_session_key(&master, session_id, self.kdf_iterations)
            .map_err(encryption_failed)?;

        let plaintext = Zeroizing::new(
            sonic_rs::to_vec(credentials)
                .map_err(|e| AppError::EncryptionFailed(format!("serialize credentials: {}", e)))?,
        );

        let (ciphertext, nonce) = aes::encrypt(&subkey, &plaintext).map_err(encryption_failed)?;

        tracing::debug!("🔒 Credentials sealed for session {} with key v{}", session_id, key_version);
        Ok(EncryptedPayload {
            ciphertext,
            nonce: nonce.to_vec(),
            key_version,
        })
    }

    /// Decrypts a session's credentials, falling back across every usable key.
    ///
    /// The indicated key version is tried first. If it is unavailable or
    /// fails, the remaining validation keys are tried in order, up to the
    /// configured limit.
    ///
    /// # Arguments
    ///
    /// * `payload` - The sealed credentials.
    /// * `session_id` - The session the payload should be bound to.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `Credentials`. `DecryptionFailed` once all
    /// candidates are exhausted; `RegistryUnavailable` if the candidate list
    /// could not be read, or was a degraded one that did not open the payload.
    pub async fn decrypt(&self, payload: &EncryptedPayload, session_id: &str) -> Result<Credentials> {
        validate_session_id(session_id)?;

        let mut tried = None;
        match self.registry.key_by_version(payload.key_version).await {
            Some(master) => {
                tried = Some(payload.key_version);
                match self.open(&master, payload, session_id) {
                    Ok(credentials) => return Ok(credentials),
                    Err(_) => tracing::debug!(
                        "Key v{} did not open payload for session {}, trying fallback",
                        payload.key_version,
                        session_id
                    ),
                }
            }
            None => tracing::debug!(
                "Key v{} unavailable for session {}, trying fallback",
                payload.key_version,
                session_id
            ),
        }

        let candidates = self.registry.validation_set().await?;
        let mut attempts = 0;

        for (master, version) in candidates
            .keys
            .iter()
            .filter(|(_, version)| Some(*version) != tried)
            .take(self.fallback_key_limit)
        {
            attempts += 1;
            if let Ok(credentials) = self.open(master, payload, session_id) {
                tracing::info!(
                    "🔓 Session {} recovered with fallback key v{} (payload claimed v{})",
                    session_id,
                    version,
                    payload.key_version
                );
                return Ok(credentials);
            }
        }

        if candidates.degraded {
            tracing::warn!(
                "⚠️  Session {} not opened with degraded keys (payload v{})",
                session_id,
                payload.key_version
            );
            return Err(AppError::RegistryUnavailable(
                "key metadata unavailable, only degraded keys were tried".to_string(),
            ));
        }

        tracing::warn!(
            "🚨 Decryption failed for session {}: payload v{}, {} fallback keys exhausted",
            session_id,
            payload.key_version,
            attempts
        );
        Err(AppError::DecryptionFailed)
    }

    /// Opens a payload with one candidate key and checks the credential shape.
    fn open(&self, master: &MasterKey, payload: &EncryptedPayload, session_id: &str) -> Result<Credentials> {
        let subkey = derive_session_key(master, session_id, self.kdf_iterations)?;
        let plaintext = Zeroizing::new(aes::decrypt(&subkey, &payload.ciphertext, &payload.nonce)?);
        sonic_rs::from_slice::<Credentials>(&plaintext).map_err(|_| AppError::DecryptionFailed)
    }

    /// Key rotation lives in `MasterKeyRegistry::rotate_key`. Always fails.
    pub fn rotate_encryption_key(&self) -> Result<()> {
        Err(AppError::UnsupportedOperation(
            "rotate keys through MasterKeyRegistry::rotate_key".to_string(),
        ))
    }
}
