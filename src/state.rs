use std::sync::Arc;
use crate::config::Config;
use crate::crypto::engine::CredentialEncryptionEngine;
use crate::crypto::registry::MasterKeyRegistry;
use crate::error::Result;
use crate::services::session::SessionTokenService;
use crate::store::kv::SessionStore;
use crate::store::redis_store::RedisStore;

/// The application's state.
#[derive(Clone)]
pub struct AppState {
    /// The application's configuration.
    pub config: Config,
    /// The key-value store.
    pub store: Arc<dyn SessionStore>,
    /// The master key registry.
    pub registry: Arc<MasterKeyRegistry>,
    /// The credential encryption engine.
    pub engine: Arc<CredentialEncryptionEngine>,
    /// The session token service.
    pub sessions: Arc<SessionTokenService>,
}

impl AppState {
    /// Creates a new `AppState` backed by Redis.
    ///
    /// # Arguments
    ///
    /// * `config` - The application's configuration.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `AppState`.
    pub async fn new(config: &Config) -> Result<Self> {
        let store = RedisStore::connect(&config.redis_url).await?;
        Self::with_store(config, Arc::new(store))
    }

    /// Creates a new `AppState` on top of any store.
    pub fn with_store(config: &Config, store: Arc<dyn SessionStore>) -> Result<Self> {
        let registry = Arc::new(MasterKeyRegistry::new(store.clone(), config)?);
        tracing::info!("✅ Master key registry initialized");

        let engine = Arc::new(CredentialEncryptionEngine::new(registry.clone(), config));
        tracing::info!(
            "✅ Credential engine initialized ({} KDF rounds, {} fallback keys max)",
            config.kdf_iterations,
            config.fallback_key_limit
        );

        let sessions = Arc::new(SessionTokenService::new(store.clone(), engine.clone(), config)?);
        tracing::info!("✅ Session token service initialized (TTL {}h)", config.session_ttl_hours);

        Ok(AppState {
            config: config.clone(),
            store,
            registry,
            engine,
            sessions,
        })
    }
}
