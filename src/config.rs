use std::env;
use std::str::FromStr;
use anyhow::{Context, Result};
use zeroize::Zeroizing;

use crate::error::AppError;
use crate::validation::keys::validate_master_key;

/// Default session and token lifetime in hours.
pub const DEFAULT_SESSION_TTL_HOURS: i64 = 24;
/// Default window during which a deprecated key may still decrypt.
pub const DEFAULT_KEY_GRACE_PERIOD_HOURS: i64 = 24;
/// Upper bound for hour-based durations (one year).
pub const MAX_DURATION_HOURS: i64 = 24 * 366;
/// Default PBKDF2 round count for session subkeys.
pub const DEFAULT_KDF_ITERATIONS: u32 = 100_000;
/// Lowest PBKDF2 round count accepted from configuration.
pub const MIN_KDF_ITERATIONS: u32 = 10_000;
/// Default cap on fallback keys tried per decryption.
pub const DEFAULT_FALLBACK_KEY_LIMIT: usize = 8;
/// Default interval of the key metadata cleanup job.
pub const DEFAULT_KEY_CLEANUP_INTERVAL_SECS: u64 = 3600;

/// The application's configuration.
#[derive(Clone)]
pub struct Config {
    /// Bootstrap master key material (version 1).
    pub primary_master_key: Zeroizing<String>,
    /// Pre-provisioned key for the next rotation.
    pub backup_master_key: Option<Zeroizing<String>>,
    /// Session and token lifetime in hours.
    pub session_ttl_hours: i64,
    /// The URL of the Redis server.
    pub redis_url: String,
    /// Explicit token signing secret. Derived from the primary key when absent.
    pub token_signing_secret: Option<Zeroizing<String>>,
    /// Grace period granted to a key when it is deprecated by rotation.
    pub key_grace_period_hours: i64,
    /// PBKDF2 round count for session subkeys.
    pub kdf_iterations: u32,
    /// Maximum number of fallback keys tried per decryption.
    pub fallback_key_limit: usize,
    /// Interval of the key metadata cleanup job.
    pub key_cleanup_interval_secs: u64,
    /// Rotate to the backup key at startup.
    pub rotate_to_backup: bool,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("primary_master_key", &"[REDACTED]")
            .field("backup_master_key", &self.backup_master_key.as_ref().map(|_| "[REDACTED]"))
            .field("session_ttl_hours", &self.session_ttl_hours)
            .field("redis_url", &self.redis_url)
            .field("token_signing_secret", &self.token_signing_secret.as_ref().map(|_| "[REDACTED]"))
            .field("key_grace_period_hours", &self.key_grace_period_hours)
            .field("kdf_iterations", &self.kdf_iterations)
            .field("fallback_key_limit", &self.fallback_key_limit)
            .field("key_cleanup_interval_secs", &self.key_cleanup_interval_secs)
            .field("rotate_to_backup", &self.rotate_to_backup)
            .finish()
    }
}

/// Reads an optional environment variable and parses it, falling back to `default`.
fn env_or<T: FromStr>(name: &str, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid {}", name)),
        Err(_) => Ok(default),
    }
}

/// Fields are public, so durations are re-checked when they are consumed.
fn bounded_hours(name: &str, hours: i64, min: i64) -> crate::error::Result<chrono::Duration> {
    if !(min..=MAX_DURATION_HOURS).contains(&hours) {
        return Err(AppError::Config(format!(
            "{} of {} hours is out of range",
            name, hours
        )));
    }
    chrono::TimeDelta::try_hours(hours)
        .ok_or_else(|| AppError::Config(format!("{} of {} hours is out of range", name, hours)))
}

impl Config {
    /// Creates a `Config` with default settings around a primary master key.
    ///
    /// # Arguments
    ///
    /// * `primary_master_key` - The bootstrap key material.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `Config`, or `InvalidKey` if the key is too weak.
    pub fn new(primary_master_key: impl Into<String>) -> crate::error::Result<Self> {
        let primary_master_key = Zeroizing::new(primary_master_key.into());
        validate_master_key(&primary_master_key)?;

        Ok(Self {
            primary_master_key,
            backup_master_key: None,
            session_ttl_hours: DEFAULT_SESSION_TTL_HOURS,
            redis_url: "redis://127.0.0.1:6379".to_string(),
            token_signing_secret: None,
            key_grace_period_hours: DEFAULT_KEY_GRACE_PERIOD_HOURS,
            kdf_iterations: DEFAULT_KDF_ITERATIONS,
            fallback_key_limit: DEFAULT_FALLBACK_KEY_LIMIT,
            key_cleanup_interval_secs: DEFAULT_KEY_CLEANUP_INTERVAL_SECS,
            rotate_to_backup: false,
        })
    }

    /// Sets the backup master key.
    pub fn with_backup_master_key(mut self, key: impl Into<String>) -> crate::error::Result<Self> {
        let key = Zeroizing::new(key.into());
        validate_master_key(&key)?;
        self.backup_master_key = Some(key);
        Ok(self)
    }

    /// Sets the session lifetime in hours.
    pub fn with_session_ttl_hours(mut self, hours: i64) -> crate::error::Result<Self> {
        if hours <= 0 || hours > MAX_DURATION_HOURS {
            return Err(AppError::Config(format!(
                "session TTL must be between 1 and {} hours",
                MAX_DURATION_HOURS
            )));
        }
        self.session_ttl_hours = hours;
        Ok(self)
    }

    /// Sets the PBKDF2 round count.
    pub fn with_kdf_iterations(mut self, iterations: u32) -> crate::error::Result<Self> {
        if iterations < MIN_KDF_ITERATIONS {
            return Err(AppError::Config(format!(
                "KDF iterations must be at least {}",
                MIN_KDF_ITERATIONS
            )));
        }
        self.kdf_iterations = iterations;
        Ok(self)
    }

    /// Sets the maximum number of fallback keys tried per decryption.
    pub fn with_fallback_key_limit(mut self, limit: usize) -> crate::error::Result<Self> {
        if limit == 0 {
            return Err(AppError::Config("fallback key limit must be at least 1".to_string()));
        }
        self.fallback_key_limit = limit;
        Ok(self)
    }

    /// Sets the deprecation grace period in hours. Zero deprecates immediately.
    pub fn with_key_grace_period_hours(mut self, hours: i64) -> crate::error::Result<Self> {
        if !(0..=MAX_DURATION_HOURS).contains(&hours) {
            return Err(AppError::Config(format!(
                "key grace period must be between 0 and {} hours",
                MAX_DURATION_HOURS
            )));
        }
        self.key_grace_period_hours = hours;
        Ok(self)
    }

    /// Sets an explicit token signing secret.
    pub fn with_token_signing_secret(mut self, secret: impl Into<String>) -> Self {
        self.token_signing_secret = Some(Zeroizing::new(secret.into()));
        self
    }

    /// Session lifetime as a `chrono::Duration`.
    pub fn session_ttl(&self) -> crate::error::Result<chrono::Duration> {
        bounded_hours("session TTL", self.session_ttl_hours, 1)
    }

    /// Deprecation grace period as a `chrono::Duration`.
    pub fn key_grace_period(&self) -> crate::error::Result<chrono::Duration> {
        bounded_hours("key grace period", self.key_grace_period_hours, 0)
    }

    /// Creates a new `Config` from environment variables.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `Config`.
    pub fn from_env() -> Result<Self> {
        let primary = env::var("PRIMARY_MASTER_KEY")
            .context("PRIMARY_MASTER_KEY must be set (generate with: openssl rand -hex 32)")?;

        let mut config = Config::new(primary).context("PRIMARY_MASTER_KEY is not acceptable")?;

        if let Ok(backup) = env::var("BACKUP_MASTER_KEY") {
            if !backup.trim().is_empty() {
                config = config
                    .with_backup_master_key(backup)
                    .context("BACKUP_MASTER_KEY is not acceptable")?;
            }
        }

        if let Ok(secret) = env::var("TOKEN_SIGNING_SECRET") {
            if secret.len() < 32 {
                anyhow::bail!("TOKEN_SIGNING_SECRET must be at least 32 bytes");
            }
            config = config.with_token_signing_secret(secret);
        }

        config.redis_url = env::var("REDIS_URL")
            .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());

        config = config
            .with_session_ttl_hours(env_or("SESSION_TTL_HOURS", DEFAULT_SESSION_TTL_HOURS)?)
            .context("Invalid SESSION_TTL_HOURS")?
            .with_kdf_iterations(env_or("KDF_ITERATIONS", DEFAULT_KDF_ITERATIONS)?)
            .context("Invalid KDF_ITERATIONS")?
            .with_fallback_key_limit(env_or("FALLBACK_KEY_LIMIT", DEFAULT_FALLBACK_KEY_LIMIT)?)
            .context("Invalid FALLBACK_KEY_LIMIT")?
            .with_key_grace_period_hours(env_or(
                "KEY_GRACE_PERIOD_HOURS",
                DEFAULT_KEY_GRACE_PERIOD_HOURS,
            )?)
            .context("Invalid KEY_GRACE_PERIOD_HOURS")?;

        config.key_cleanup_interval_secs =
            env_or("KEY_CLEANUP_INTERVAL_SECS", DEFAULT_KEY_CLEANUP_INTERVAL_SECS)?;
        config.rotate_to_backup = env_or("ROTATE_TO_BACKUP", false)?;

        Ok(config)
    }
}
