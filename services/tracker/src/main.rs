//! rackwatch tracker
//!
//! Runs a tracker against in-memory directories and an in-memory status bus,
//! persisting statuses to SQLite. Useful for exercising the tracker locally;
//! production deployments embed the library with real collaborators.

use std::sync::Arc;

use anyhow::{Context, Result};
use rackwatch_status::{Device, Rack, Task};
use rackwatch_tracker::memory::{MemoryBus, MemoryDirectory};
use rackwatch_tracker::store::{KeyValueStore, SqliteStore};
use rackwatch_tracker::{Config, Tracker, TrackerSettings};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    let log_level = std::env::var("RACKWATCH_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::registry()
        .with(EnvFilter::try_new(&log_level).unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting rackwatch tracker");

    let settings = TrackerSettings::from_env().context("loading settings")?;

    let store: Arc<dyn KeyValueStore> = match std::env::var("RACKWATCH_DB_PATH") {
        Ok(path) => {
            info!(path = %path, "Using SQLite status store");
            Arc::new(SqliteStore::open(&path).context("opening status store")?)
        }
        Err(_) => {
            info!("Using in-memory SQLite status store");
            Arc::new(SqliteStore::open_in_memory().context("opening status store")?)
        }
    };

    let racks = Arc::new(MemoryDirectory::with_records([Rack {
        key: rackwatch_id::RackKey::new(settings.host, 1),
        name: format!("node {} rack", settings.host),
    }]));
    let bus = Arc::new(MemoryBus::new());

    let tracker = Tracker::open(Config {
        settings,
        racks,
        tasks: Arc::new(MemoryDirectory::<Task>::new()),
        devices: Arc::new(MemoryDirectory::<Device>::new()),
        store,
        channels: bus.clone(),
        bus,
    })
    .await
    .context("opening tracker")?;

    info!(channels = ?tracker.channels(), "Tracker running");

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    info!("Received shutdown signal");

    if let Err(e) = tracker.close().await {
        error!(error = %e, "Tracker shutdown failed");
        return Err(e.into());
    }

    info!("Tracker shutdown complete");
    Ok(())
}
