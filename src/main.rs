use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use r2_session_vault::{AppState, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    tracing::info!("✅ Configuration loaded successfully");

    let state = AppState::new(&config).await?;
    tracing::info!("✅ AppState initialized");

    // Garantir que a chave mestra atual existe na startup
    match state.registry.current_key().await {
        Ok((key, version)) => {
            tracing::info!("✅ Master key validation completed - version: {} ({})", version, key.fingerprint());
        }
        Err(e) => {
            tracing::error!("❌ Failed to ensure master key exists: {}", e);
            return Err(e.into());
        }
    }

    if config.rotate_to_backup {
        let version = state.registry.rotate_to_backup().await?;
        tracing::info!("✅ Rotated to backup master key - version: {}", version);
    }

    for key in state.registry.list_keys().await? {
        tracing::info!(
            "🔑 Key v{}: {:?} (created {}, expires {:?})",
            key.version,
            key.status,
            key.created_at,
            key.expires_at
        );
    }

    let cleanup_state = state.clone();
    let interval_secs = config.key_cleanup_interval_secs.max(1);
    let cleanup = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
        loop {
            interval.tick().await;
            tracing::info!("🧹 Running scheduled cleanup of expired key metadata...");
            let removed = cleanup_state.registry.cleanup_expired_keys().await;
            tracing::info!("✅ Cleanup job completed - {} records removed", removed);
        }
    });

    tracing::info!("✅ Background cleanup job started (every {}s)", interval_secs);
    tracing::info!("✅ All systems operational");

    tokio::signal::ctrl_c().await?;
    tracing::info!("👋 Shutting down");
    cleanup.abort();

    Ok(())
}
