//! Counters for filter and subscription activity
//!
//! ```ignore
//! let metrics = service.metrics().snapshot();
//! info!(filters = metrics.filters_installed - metrics.filters_removed, "live filters");
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters shared by the managers, pipelines and GC
#[derive(Debug, Default)]
pub struct EventMetrics {
    pub filters_installed: AtomicU64,
    pub filters_removed: AtomicU64,
    /// Events appended to at least one filter
    pub events_collected: AtomicU64,
    /// Events dropped from results because they could not be decoded
    pub events_malformed: AtomicU64,
    /// Items a full filter buffer or ingest channel refused
    pub items_dropped: AtomicU64,
    pub payloads_enqueued: AtomicU64,
    pub payloads_delivered: AtomicU64,
    pub subscriptions_started: AtomicU64,
    pub subscriptions_stopped: AtomicU64,
    /// Subscriptions torn down for overflow or delivery failure
    pub subscriptions_killed: AtomicU64,
    pub gc_evictions: AtomicU64,
}

/// Point-in-time copy of [`EventMetrics`]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub filters_installed: u64,
    pub filters_removed: u64,
    pub events_collected: u64,
    pub events_malformed: u64,
    pub items_dropped: u64,
    pub payloads_enqueued: u64,
    pub payloads_delivered: u64,
    pub subscriptions_started: u64,
    pub subscriptions_stopped: u64,
    pub subscriptions_killed: u64,
    pub gc_evictions: u64,
}

impl EventMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            filters_installed: self.filters_installed.load(Ordering::Relaxed),
            filters_removed: self.filters_removed.load(Ordering::Relaxed),
            events_collected: self.events_collected.load(Ordering::Relaxed),
            events_malformed: self.events_malformed.load(Ordering::Relaxed),
            items_dropped: self.items_dropped.load(Ordering::Relaxed),
            payloads_enqueued: self.payloads_enqueued.load(Ordering::Relaxed),
            payloads_delivered: self.payloads_delivered.load(Ordering::Relaxed),
            subscriptions_started: self.subscriptions_started.load(Ordering::Relaxed),
            subscriptions_stopped: self.subscriptions_stopped.load(Ordering::Relaxed),
            subscriptions_killed: self.subscriptions_killed.load(Ordering::Relaxed),
            gc_evictions: self.gc_evictions.load(Ordering::Relaxed),
        }
    }
}

impl MetricsSnapshot {
    /// Filters currently registered, as far as the counters know
    pub fn live_filters(&self) -> u64 {
        self.filters_installed.saturating_sub(self.filters_removed)
    }
}
