use std::sync::Arc;

use muse_core::Config;
use muse_db::{RemoteDbPool, TagLifecycle};
use muse_server::{AppState, server};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;

    // Initialize tracing
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.log_level().into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Configuration loaded (bind: {})", config.bind_addr());

    // Initialize database
    let db = match &config.settings.storage.remote_db_path {
        Some(path) => RemoteDbPool::open(path).await?,
        None => RemoteDbPool::new().await?,
    };

    match TagLifecycle::new(db.pool()).recount().await {
        Ok(0) => {}
        Ok(count) => info!("Repaired {} tag counts at startup", count),
        Err(e) => warn!("Tag recount failed: {}", e),
    }

    if config.api_key().is_none() {
        warn!("MUSE_API_KEY is not set; the note endpoint accepts every request");
    }

    let state = Arc::new(AppState::new(
        db,
        config.api_key().map(str::to_string),
    ));

    server::run(state, &config.bind_addr()).await
}
