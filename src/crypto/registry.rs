use chrono::Utc;
use std::sync::Arc;
use zeroize::Zeroizing;

use crate::config::Config;
use crate::crypto::aes::{self, SecureKey};
use crate::crypto::kdf::{self, MasterKey};
use crate::error::{AppError, Result};
use crate::models::key::{KeyStatus, MasterKeyInfo, MasterKeyRecord};
use crate::store::kv::{KEY_METADATA_CURRENT, SessionStore, key_metadata_key};
use crate::validation::keys::validate_master_key;

/// Collapses any failure into `RegistryUnavailable`, keeping existing ones as-is.
fn unavailable(e: AppError) -> AppError {
    match e {
        AppError::RegistryUnavailable(_) => e,
        other => AppError::RegistryUnavailable(other.to_string()),
    }
}

/// Fallback candidates, and whether they were assembled during a store failure.
pub(crate) struct ValidationKeys {
    pub(crate) keys: Vec<(MasterKey, u32)>,
    pub(crate) degraded: bool,
}

/// The versioned master key registry.
///
/// Holds no key state of its own between calls: every operation re-reads
/// the store, so concurrent and stateless invocations see the same lifecycle.
pub struct MasterKeyRegistry {
    store: Arc<dyn SessionStore>,
    primary: Zeroizing<Vec<u8>>,
    backup: Option<Zeroizing<Vec<u8>>>,
    wrapping_key: SecureKey,
    grace_period: chrono::Duration,
}

impl MasterKeyRegistry {
    /// Creates a new `MasterKeyRegistry`.
    ///
    /// # Arguments
    ///
    /// * `store` - The key-value store holding key metadata.
    /// * `config` - The application's configuration.
    ///
    /// # Returns
    ///
    /// A `Result` containing the registry, or `InvalidKey` if a configured key is too weak.
    pub fn new(store: Arc<dyn SessionStore>, config: &Config) -> Result<Self> {
        validate_master_key(&config.primary_master_key)?;
        if let Some(backup) = &config.backup_master_key {
            validate_master_key(backup)?;
        }

        let primary = Zeroizing::new(config.primary_master_key.as_bytes().to_vec());
        let wrapping_key = kdf::wrapping_key(&primary);

        Ok(Self {
            store,
            backup: config
                .backup_master_key
                .as_ref()
                .map(|key| Zeroizing::new(key.as_bytes().to_vec())),
            primary,
            wrapping_key,
            grace_period: config.key_grace_period()?,
        })
    }

    async fn current_version(&self) -> Result<Option<u32>> {
        let Some(raw) = self.store.get(KEY_METADATA_CURRENT).await? else {
            return Ok(None);
        };

        let text = String::from_utf8(raw)
            .map_err(|_| AppError::RegistryUnavailable("current key pointer is not UTF-8".to_string()))?;
        let version = text
            .trim()
            .parse::<u32>()
            .map_err(|_| AppError::RegistryUnavailable(format!("invalid current key pointer: {:?}", text)))?;

        Ok(Some(version))
    }

    async fn set_current_version(&self, version: u32) -> Result<()> {
        self.store
            .put(KEY_METADATA_CURRENT, version.to_string().into_bytes(), 0)
            .await
    }

    async fn load_record(&self, version: u32) -> Result<Option<MasterKeyRecord>> {
        match self.store.get(&key_metadata_key(version)).await? {
            Some(raw) => Ok(Some(sonic_rs::from_slice(&raw)?)),
            None => Ok(None),
        }
    }

    async fn save_record(&self, record: &MasterKeyRecord) -> Result<()> {
        let raw = sonic_rs::to_vec(record)?;
        self.store.put(&key_metadata_key(record.version), raw, 0).await
    }

    fn seal_record(&self, version: u32, material: &[u8]) -> Result<MasterKeyRecord> {
        let (wrapped_key, nonce) = aes::encrypt(&self.wrapping_key, material)?;
        Ok(MasterKeyRecord {
            version,
            created_at: Utc::now(),
            status: KeyStatus::Active,
            expires_at: None,
            wrapped_key,
            wrap_nonce: nonce.to_vec(),
        })
    }

    fn unwrap_record(&self, record: &MasterKeyRecord) -> Result<MasterKey> {
        let material = aes::decrypt(&self.wrapping_key, &record.wrapped_key, &record.wrap_nonce)
            .inspect_err(|_| {
                tracing::error!(
                    "❌ Key v{} cannot be unwrapped - was PRIMARY_MASTER_KEY changed?",
                    record.version
                );
            })?;
        Ok(MasterKey::from_bytes(material))
    }

    /// Writes version 1 from the primary key and points `current` at it.
    async fn bootstrap(&self) -> Result<(MasterKey, u32)> {
        tracing::warn!("⚠️  No current master key found, bootstrapping version 1...");

        let record = match self.load_record(1).await? {
            // A previous bootstrap wrote the record but not the pointer.
            Some(existing) if existing.status == KeyStatus::Active => existing,
            Some(_) => {
                return Err(AppError::RegistryUnavailable(
                    "key v1 exists but is not active and no current pointer is set".to_string(),
                ));
            }
            None => {
                let record = self.seal_record(1, &self.primary)?;
                self.save_record(&record).await?;
                record
            }
        };

        // Another instance may have bootstrapped and rotated meanwhile.
        if let Some(version) = self.current_version().await? {
            tracing::info!("Master key pointer appeared during bootstrap (v{})", version);
            return self.active_key_at(version).await;
        }

        self.set_current_version(1).await?;
        let key = self.unwrap_record(&record)?;

        tracing::info!("✅ Master key v1 bootstrapped ({})", key.fingerprint());
        Ok((key, 1))
    }

    /// Returns the active master key and its version.
    ///
    /// Bootstraps version 1 from the primary key on first run.
    ///
    /// # Returns
    ///
    /// A `Result` containing `(key, version)`, or `RegistryUnavailable`.
    pub async fn current_key(&self) -> Result<(MasterKey, u32)> {
        match self.current_version().await.map_err(unavailable)? {
            Some(version) => self.active_key_at(version).await,
            None => self.bootstrap().await.map_err(unavailable),
        }
    }

    /// Loads the version the pointer names, which must still be active.
    async fn active_key_at(&self, version: u32) -> Result<(MasterKey, u32)> {
        let record = self
            .load_record(version)
            .await
            .map_err(unavailable)?
            .ok_or_else(|| {
                AppError::RegistryUnavailable(format!("current key v{} has no metadata", version))
            })?;

        if record.status != KeyStatus::Active || !record.is_usable_at(Utc::now()) {
            return Err(AppError::RegistryUnavailable(format!(
                "current key v{} is {:?}",
                version, record.status
            )));
        }

        let key = self.unwrap_record(&record).map_err(unavailable)?;
        tracing::debug!("🔑 Current master key is v{}", version);
        Ok((key, version))
    }

    /// Returns the key material for a version, if it may still decrypt.
    ///
    /// Unknown, revoked and grace-expired versions are all `None`.
    ///
    /// # Arguments
    ///
    /// * `version` - The key version.
    pub async fn key_by_version(&self, version: u32) -> Option<MasterKey> {
        let record = match self.load_record(version).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                tracing::debug!("Key v{} has no metadata", version);
                return None;
            }
            Err(e) => {
                tracing::warn!("⚠️  Could not read key v{}: {}", version, e);
                return None;
            }
        };

        if !record.is_usable_at(Utc::now()) {
            tracing::debug!("Key v{} is {:?} and no longer usable", version, record.status);
            return None;
        }

        self.unwrap_record(&record).ok()
    }

    /// Returns every key that may still decrypt, current first, then newest to oldest.
    ///
    /// Failures reading older versions are skipped. If the current key cannot
    /// be read, the list degrades to whatever versions are still readable plus
    /// the primary key, rather than locking everyone out. Only a registry that
    /// was never bootstrapped, and cannot be, returns an error.
    pub async fn validation_keys(&self) -> Result<Vec<(MasterKey, u32)>> {
        Ok(self.validation_set().await?.keys)
    }

    pub(crate) async fn validation_set(&self) -> Result<ValidationKeys> {
        let pointer = match self.current_version().await {
            Ok(Some(version)) => Some(version),
            Ok(None) => {
                let (key, version) = self.bootstrap().await.map_err(unavailable)?;
                return Ok(ValidationKeys {
                    keys: vec![(key, version)],
                    degraded: false,
                });
            }
            Err(e) => {
                tracing::warn!("⚠️  Current key pointer unreadable: {}", e);
                None
            }
        };

        if let Some(current_version) = pointer {
            match self.active_key_at(current_version).await {
                Ok((current, _)) => {
                    let mut keys = vec![(current, current_version)];
                    for version in (1..current_version).rev() {
                        if let Some(key) = self.key_by_version(version).await {
                            keys.push((key, version));
                        }
                    }
                    return Ok(ValidationKeys {
                        keys,
                        degraded: false,
                    });
                }
                Err(e) => tracing::warn!("⚠️  Current key v{} unavailable: {}", current_version, e),
            }
        }

        let keys = self.degraded_keys(pointer).await;
        if keys.is_empty() {
            return Err(AppError::RegistryUnavailable(
                "no usable master key could be read".to_string(),
            ));
        }

        tracing::warn!(
            "⚠️  Serving {} degraded validation key(s): {:?}",
            keys.len(),
            keys.iter().map(|(_, v)| *v).collect::<Vec<_>>()
        );
        Ok(ValidationKeys {
            keys,
            degraded: true,
        })
    }

    /// Readable usable versions, newest first. The primary key stands in for
    /// v1 only when v1's metadata cannot be read at all.
    async fn degraded_keys(&self, pointer: Option<u32>) -> Vec<(MasterKey, u32)> {
        let mut keys = Vec::new();
        for version in (1..=pointer.unwrap_or(1)).rev() {
            if let Some(key) = self.key_by_version(version).await {
                keys.push((key, version));
            }
        }

        if !keys.iter().any(|(_, version)| *version == 1) && self.load_record(1).await.is_err() {
            keys.push((MasterKey::from_bytes(self.primary.to_vec()), 1));
        }

        keys
    }

    /// Rotates to new key material.
    ///
    /// The new record and the pointer are written before the old record is
    /// deprecated. A crash in between leaves the old key usable.
    ///
    /// # Arguments
    ///
    /// * `new_key` - The new key material.
    ///
    /// # Returns
    ///
    /// A `Result` containing the new version.
    pub async fn rotate_key(&self, new_key: &str) -> Result<u32> {
        validate_master_key(new_key)?;
        let candidate = MasterKey::from_bytes(new_key.as_bytes().to_vec());

        let current_version = match self.current_version().await.map_err(unavailable)? {
            Some(version) => version,
            None => self.bootstrap().await.map_err(unavailable)?.1,
        };

        // Material from any known version, revoked ones included, must not come back.
        for version in 1..=current_version {
            if let Ok(Some(record)) = self.load_record(version).await {
                if let Ok(existing) = self.unwrap_record(&record) {
                    if existing == candidate {
                        return Err(AppError::InvalidKey(format!(
                            "Key material is already registered as v{}",
                            version
                        )));
                    }
                }
            }
        }

        let new_version = current_version
            .checked_add(1)
            .ok_or_else(|| AppError::RegistryUnavailable("key version overflow".to_string()))?;

        let record = self.seal_record(new_version, candidate.as_bytes())?;
        self.save_record(&record).await.map_err(unavailable)?;
        self.set_current_version(new_version).await.map_err(unavailable)?;

        match self.load_record(current_version).await {
            Ok(Some(mut previous)) if previous.status == KeyStatus::Active => {
                previous.status = KeyStatus::Deprecated;
                previous.expires_at = Some(Utc::now() + self.grace_period);
                if let Err(e) = self.save_record(&previous).await {
                    tracing::warn!("⚠️  Key v{} not marked deprecated: {}", current_version, e);
                }
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!("⚠️  Could not read key v{} after rotation: {}", current_version, e);
            }
        }

        tracing::info!(
            "🔄 Master key rotated: v{} -> v{} ({})",
            current_version,
            new_version,
            candidate.fingerprint()
        );
        Ok(new_version)
    }

    /// Rotates to the pre-provisioned backup key.
    pub async fn rotate_to_backup(&self) -> Result<u32> {
        let backup = self
            .backup
            .as_ref()
            .ok_or_else(|| AppError::InvalidKey("No backup master key configured".to_string()))?;
        let backup = std::str::from_utf8(backup)
            .map_err(|_| AppError::InvalidKey("Backup master key is not UTF-8".to_string()))?;
        self.rotate_key(backup).await
    }

    /// Marks a version revoked. Its material is never used again.
    ///
    /// # Arguments
    ///
    /// * `version` - The key version.
    pub async fn revoke_key(&self, version: u32) -> Result<()> {
        let mut record = self
            .load_record(version)
            .await
            .map_err(unavailable)?
            .ok_or(AppError::KeyVersionNotFound(version))?;

        record.status = KeyStatus::Revoked;
        record.expires_at = Some(Utc::now());
        self.save_record(&record).await.map_err(unavailable)?;

        tracing::warn!("🚫 Master key v{} revoked", version);
        Ok(())
    }

    /// Deletes metadata whose expiry has passed. Never touches the current version.
    ///
    /// Best-effort: storage errors are logged and skipped.
    ///
    /// # Returns
    ///
    /// The number of records actually removed.
    pub async fn cleanup_expired_keys(&self) -> usize {
        let current_version = match self.current_version().await {
            Ok(Some(version)) => version,
            Ok(None) => return 0,
            Err(e) => {
                tracing::warn!("⚠️  Key cleanup skipped: {}", e);
                return 0;
            }
        };

        let now = Utc::now();
        let mut removed = 0;

        for version in 1..current_version {
            match self.load_record(version).await {
                Ok(Some(record)) if record.is_expired_at(now) => {
                    match self.store.delete(&key_metadata_key(version)).await {
                        Ok(()) => {
                            tracing::info!("🧹 Removed expired key metadata v{}", version);
                            removed += 1;
                        }
                        Err(e) => tracing::warn!("⚠️  Could not remove key v{}: {}", version, e),
                    }
                }
                Ok(_) => {}
                Err(e) => tracing::warn!("⚠️  Could not read key v{}: {}", version, e),
            }
        }

        removed
    }

    /// Lists key metadata, oldest first, without key material.
    pub async fn list_keys(&self) -> Result<Vec<MasterKeyInfo>> {
        let Some(current_version) = self.current_version().await.map_err(unavailable)? else {
            return Ok(Vec::new());
        };

        let mut keys = Vec::new();
        for version in 1..=current_version {
            if let Some(record) = self.load_record(version).await.map_err(unavailable)? {
                keys.push(record.info());
            }
        }
        Ok(keys)
    }
}
