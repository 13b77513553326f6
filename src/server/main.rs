#![cfg(feature = "server")]

use scavenger_hunt::config::ServerConfig;
use scavenger_hunt::server::telemetry::{init_telemetry, shutdown_telemetry};
use scavenger_hunt::server::{create_router, AppState, HuntService, MemoryStorage, Notifier};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

#[tokio::main]
pub async fn main() {
    let config = ServerConfig::from_env();
    if let Err(e) = init_telemetry(&config) {
        eprintln!("Failed to initialize telemetry: {}", e);
    }

    if let Err(e) = run(config).await {
        error!("Server stopped: {}", e);
    }
    shutdown_telemetry();
}

async fn run(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    if config.organizer_token.is_none() {
        warn!("HUNT_ORGANIZER_TOKEN is not set, organizer routes are open");
    }

    // Live connections always stay in memory.
    let connections = MemoryStorage::new();
    let notifier = Notifier::new(Arc::new(connections));
    let service = open_storage(&config, notifier)?;

    let listener = TcpListener::bind(config.bind).await?;
    info!("Listening on http://{}", listener.local_addr()?);
    let app = create_router(AppState::new(service, config));
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

#[cfg(feature = "sqlite")]
fn open_storage(
    config: &ServerConfig,
    notifier: Notifier,
) -> Result<HuntService, Box<dyn std::error::Error>> {
    use scavenger_hunt::server::SqliteStorage;

    if config.uses_memory_storage() {
        info!("Using in-memory storage");
        return Ok(HuntService::new(
            MemoryStorage::new(),
            notifier,
            config.upload_dir.clone(),
        ));
    }
    info!(database = %config.database, "Using SQLite storage");
    let storage = SqliteStorage::open(&config.database)?;
    Ok(HuntService::new(storage, notifier, config.upload_dir.clone()))
}

#[cfg(not(feature = "sqlite"))]
fn open_storage(
    config: &ServerConfig,
    notifier: Notifier,
) -> Result<HuntService, Box<dyn std::error::Error>> {
    if !config.uses_memory_storage() {
        warn!(database = %config.database, "Built without `sqlite`, falling back to memory");
    }
    Ok(HuntService::new(
        MemoryStorage::new(),
        notifier,
        config.upload_dir.clone(),
    ))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutting down");
}
