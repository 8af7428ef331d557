//! Periodic eviction of finished generation records.
//!
//! Terminal records older than the retention period are dropped from the
//! in-memory store so a long-running server does not grow without bound.
//! Queued and generating records are never evicted.

use std::sync::Arc;
use std::time::Duration;

use keyforge_core::store::GenerationStore;
use tokio_util::sync::CancellationToken;

/// Run the retention loop until `cancel` is triggered.
pub async fn run(
    store: Arc<GenerationStore>,
    retention: Duration,
    sweep_interval: Duration,
    cancel: CancellationToken,
) {
    tracing::info!(
        retention_secs = retention.as_secs(),
        interval_secs = sweep_interval.as_secs(),
        "Record retention job started"
    );

    let mut interval = tokio::time::interval(sweep_interval);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Record retention job stopping");
                break;
            }
            _ = interval.tick() => {
                let evicted = store.evict_expired(retention).await;
                if evicted > 0 {
                    let remaining = store.len().await;
                    tracing::info!(evicted, remaining, "Record retention: evicted finished generations");
                } else {
                    tracing::debug!("Record retention: nothing to evict");
                }
            }
        }
    }
}
