//! Registry of live subscriptions.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::pipeline::{IngestContext, Subscription};
use crate::domain::SubscriptionId;
use crate::error::{EventError, EventResult};
use crate::filter::FilterUninstaller;
use crate::metrics::EventMetrics;
use crate::ports::SubscriptionSink;

/// Starts, tracks and stops subscriptions.
pub struct SubscriptionManager {
    subs: Mutex<HashMap<SubscriptionId, Arc<Subscription>>>,
    ctx: IngestContext,
    ingest_capacity: usize,
    max_send_queue: usize,
    root: CancellationToken,
    metrics: Arc<EventMetrics>,
}

impl SubscriptionManager {
    #[must_use]
    pub fn new(
        ctx: IngestContext,
        ingest_capacity: usize,
        max_send_queue: usize,
        root: CancellationToken,
        metrics: Arc<EventMetrics>,
    ) -> Self {
        Self {
            subs: Mutex::new(HashMap::new()),
            ctx,
            ingest_capacity,
            max_send_queue,
            root,
            metrics,
        }
    }

    /// Create a subscription delivering to `sink` and spawn its two stages.
    pub fn start_subscription(
        &self,
        sink: Arc<dyn SubscriptionSink>,
        uninstaller: Arc<dyn FilterUninstaller>,
    ) -> Arc<Subscription> {
        let (sub, rx) = Subscription::new(
            self.ingest_capacity,
            self.max_send_queue,
            self.root.child_token(),
            uninstaller,
            self.metrics.clone(),
        );

        sub.start_ingest(rx, self.ctx.clone());
        sub.start_drain(sink);

        let mut subs = self.subs.lock();
        prune(&mut subs);
        subs.insert(sub.id(), sub.clone());

        EventMetrics::incr(&self.metrics.subscriptions_started);
        debug!(subscription_id = %sub.id(), live = subs.len(), "Subscription started");
        sub
    }

    /// A live subscription. Ones that stopped themselves are not returned.
    pub fn get(&self, id: SubscriptionId) -> Option<Arc<Subscription>> {
        let mut subs = self.subs.lock();
        prune(&mut subs);
        subs.get(&id).cloned()
    }

    /// Stop and forget a subscription.
    pub fn stop_subscription(&self, id: SubscriptionId) -> EventResult<()> {
        let sub = self
            .subs
            .lock()
            .remove(&id)
            .ok_or(EventError::SubscriptionNotFound(id))?;
        sub.stop();
        Ok(())
    }

    /// Live subscriptions, not counting ones already stopped.
    pub fn len(&self) -> usize {
        let mut subs = self.subs.lock();
        prune(&mut subs);
        subs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stop_all(&self) {
        let subs: Vec<_> = self.subs.lock().drain().map(|(_, s)| s).collect();
        if !subs.is_empty() {
            info!(count = subs.len(), "Stopping all subscriptions");
        }
        for sub in subs {
            sub.stop();
        }
    }
}

/// Drop subscriptions that killed themselves.
fn prune(subs: &mut HashMap<SubscriptionId, Arc<Subscription>>) {
    subs.retain(|_, s| !s.is_stopped());
}
