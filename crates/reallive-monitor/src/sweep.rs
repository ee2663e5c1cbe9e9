//! Periodic eviction of stale telemetry.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::cache::TelemetryCache;

/// Call [`TelemetryCache::sweep_stale`] every `interval` until shutdown.
pub async fn run(cache: Arc<TelemetryCache>, interval: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // First tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let evicted = cache.sweep_stale();
                if !evicted.is_empty() {
                    tracing::debug!(count = evicted.len(), "stale sweep evicted entries");
                }
            }
            _ = shutdown.changed() => break,
        }
    }
}
