//! New-head filters.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, trace};

use super::{Collector, Filter, FilterStore, SubItem};
use crate::domain::{FilterId, TipSet, TipSetKey};
use crate::error::{EventError, EventResult};
use crate::metrics::EventMetrics;
use crate::notifier::TipSetObserver;
use crate::ports::TimeSource;

/// Collects the key of every applied tipset.
pub struct TipSetFilter {
    pub(crate) collector: Collector<TipSetKey>,
}

impl TipSetFilter {
    pub fn id(&self) -> FilterId {
        self.collector.id()
    }

    pub fn take_collected_tipsets(&self) -> Vec<TipSetKey> {
        self.collector.take()
    }

    fn collect_tipset(&self, ts: &TipSet) {
        self.collector
            .post(ts.key().clone(), || SubItem::TipSet(ts.clone()));
    }
}

pub struct TipSetFilterManager {
    store: Arc<FilterStore>,
    max_results: usize,
    clock: Arc<dyn TimeSource>,
    metrics: Arc<EventMetrics>,
    filters: Mutex<HashMap<FilterId, Arc<TipSetFilter>>>,
}

impl TipSetFilterManager {
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

    pub fn install(&self) -> EventResult<Arc<TipSetFilter>> {
        let filter = Arc::new(TipSetFilter {
            collector: Collector::new(self.max_results, self.clock.clone(), self.metrics.clone()),
        });

        self.store.add(Filter::TipSet(filter.clone()))?;
        self.filters.lock().insert(filter.id(), filter.clone());

        EventMetrics::incr(&self.metrics.filters_installed);
        debug!(filter_id = %filter.id(), "Installed tipset filter");
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

    fn snapshot(&self) -> Vec<Arc<TipSetFilter>> {
        self.filters.lock().values().cloned().collect()
    }
}

#[async_trait]
impl TipSetObserver for TipSetFilterManager {
    async fn apply(&self, _from: &TipSet, to: &TipSet) -> EventResult<()> {
        let filters = self.snapshot();
        trace!(height = to.height(), filters = filters.len(), "Fanning out tipset");
        for filter in filters {
            filter.collect_tipset(to);
        }
        Ok(())
    }

    async fn revert(&self, _from: &TipSet, _to: &TipSet) -> EventResult<()> {
        Ok(())
    }
}
