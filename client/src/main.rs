//! Ferry Sync - headless queue drainer.
//!
//! Loads the persisted queue, pushes it to the API and keeps syncing until
//! interrupted. Useful for kiosks and for draining a queue file by hand.

use ferry_client::{telemetry, Config, FileStorage, HttpApi, NetworkMonitor, SyncEngine};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    telemetry::init_tracing();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    tracing::info!(
        api_url = %config.api_url,
        queue_path = %config.queue_path.display(),
        "Starting Ferry Sync"
    );

    let api = HttpApi::from_config(&config)?;
    let network = NetworkMonitor::new_shared(true);
    let engine = SyncEngine::builder(Arc::new(api), network)
        .storage(Arc::new(FileStorage::new(&config.queue_path)))
        .settings(config.sync)
        .default_max_retries(config.max_retries)
        .build()?;

    let mut status = engine.subscribe();
    let handle = engine.start();

    loop {
        tokio::select! {
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = status.borrow_and_update().clone();
                tracing::info!(
                    pending = current.pending_count,
                    failed = current.failed_count,
                    conflicts = current.conflict_count,
                    syncing = current.is_syncing,
                    online = current.is_online,
                    last_error = current.last_sync_error.as_deref().unwrap_or("-"),
                    "Sync status"
                );
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down");
                break;
            }
        }
    }

    handle.stop();

    let remaining = engine.status();
    if !remaining.is_idle() {
        tracing::warn!(
            pending = remaining.pending_count,
            failed = remaining.failed_count,
            conflicts = remaining.conflict_count,
            "Operations left in queue"
        );
    }

    Ok(())
}
