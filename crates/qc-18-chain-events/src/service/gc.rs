//! Eviction of filters nobody polls any more.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::Timestamp;
use crate::filter::{FilterRegistry, FilterUninstaller};
use crate::metrics::EventMetrics;
use crate::ports::TimeSource;

/// Uninstall every filter not taken from since `now - ttl`. Returns the
/// number evicted.
pub(crate) fn sweep(
    registry: &FilterRegistry,
    now: Timestamp,
    ttl: Duration,
    metrics: &EventMetrics,
) -> usize {
    let cutoff = now.saturating_sub(ttl.as_millis() as Timestamp);
    let mut evicted = 0;

    for filter in registry.store().not_taken_since(cutoff) {
        match registry.uninstall(&filter) {
            Ok(()) => evicted += 1,
            Err(e) => {
                warn!(filter_id = %filter.id(), error = %e, "Failed to evict stale filter");
            }
        }
    }

    if evicted > 0 {
        EventMetrics::add(&metrics.gc_evictions, evicted as u64);
        debug!(evicted, "Evicted stale filters");
    }
    evicted
}

/// Sweep on a fixed interval until cancelled.
pub(crate) async fn run(
    registry: Arc<FilterRegistry>,
    clock: Arc<dyn TimeSource>,
    ttl: Duration,
    interval: Duration,
    metrics: Arc<EventMetrics>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                sweep(&registry, clock.now(), ttl, &metrics);
            }
        }
    }
    info!("Filter GC stopped");
}
