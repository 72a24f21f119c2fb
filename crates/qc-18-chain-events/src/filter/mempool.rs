//! Pending-transaction filters.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use super::{Collector, Filter, FilterStore, SubItem};
use crate::domain::{FilterId, MpoolUpdate, MpoolUpdateKind, SignedMessage};
use crate::error::{EventError, EventResult};
use crate::metrics::EventMetrics;
use crate::ports::TimeSource;

/// Collects every message added to the mempool.
pub struct MemPoolFilter {
    pub(crate) collector: Collector<SignedMessage>,
}

impl MemPoolFilter {
    pub fn id(&self) -> FilterId {
        self.collector.id()
    }

    pub fn take_collected_messages(&self) -> Vec<SignedMessage> {
        self.collector.take()
    }

    fn collect_message(&self, message: &SignedMessage) {
        self.collector
            .post(message.clone(), || SubItem::Message(message.clone()));
    }
}

pub struct MemPoolFilterManager {
    store: Arc<FilterStore>,
    max_results: usize,
    clock: Arc<dyn TimeSource>,
    metrics: Arc<EventMetrics>,
    filters: Mutex<HashMap<FilterId, Arc<MemPoolFilter>>>,
}

impl MemPoolFilterManager {
    pub fn new(
        store: Arc<FilterStore>,
        max_results: usize,
        clock: Arc<dyn TimeSource>,
        metrics: Arc<EventMetrics>,
    ) -> Self {
        Self {
            store,
            max_results,
            clock,
            metrics,
            filters: Mutex::new(HashMap::new()),
        }
    }

    pub fn install(&self) -> EventResult<Arc<MemPoolFilter>> {
        let filter = Arc::new(MemPoolFilter {
            collector: Collector::new(self.max_results, self.clock.clone(), self.metrics.clone()),
        });

        self.store.add(Filter::MemPool(filter.clone()))?;
        self.filters.lock().insert(filter.id(), filter.clone());

        EventMetrics::incr(&self.metrics.filters_installed);
        debug!(filter_id = %filter.id(), "Installed mempool filter");
        Ok(filter)
    }

    pub fn remove(&self, id: FilterId) -> EventResult<()> {
        self.filters
            .lock()
            .remove(&id)
            .ok_or(EventError::FilterNotFound(id))?;
        EventMetrics::incr(&self.metrics.filters_removed);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.filters.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.lock().is_empty()
    }

    /// Fan an update out to every filter. Removals are ignored.
    pub fn process_update(&self, update: &MpoolUpdate) {
        if update.kind != MpoolUpdateKind::Add {
            return;
        }

        let filters: Vec<_> = self.filters.lock().values().cloned().collect();
        trace!(message = %update.message.cid, filters = filters.len(), "Fanning out pending message");
        for filter in filters {
            filter.collect_message(&update.message);
        }
    }

    /// Forward mempool updates until the stream ends or `cancel` fires.
    pub async fn wait_for_mpool_updates(
        self: Arc<Self>,
        mut updates: mpsc::Receiver<MpoolUpdate>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                update = updates.recv() => match update {
                    Some(update) => self.process_update(&update),
                    None => {
                        info!("Mempool update stream closed");
                        break;
                    }
                },
            }
        }
    }
}
