//! Actor event filters and the manager that matches chain events against them.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, trace};

use super::{Collector, Filter, FilterStore, SubItem};
use crate::domain::{
    ActorId, Address, ChainEpoch, CollectedEvent, FilterId, MatchCriteria, TipSet,
};
use crate::error::{EventError, EventResult};
use crate::metrics::EventMetrics;
use crate::notifier::TipSetObserver;
use crate::ports::{ActorResolver, EventIndex, MessageStore, TimeSource};

/// Collects events matching its criteria.
pub struct EventFilter {
    criteria: MatchCriteria,
    pub(crate) collector: Collector<CollectedEvent>,
}

impl EventFilter {
    pub fn id(&self) -> FilterId {
        self.collector.id()
    }

    pub fn criteria(&self) -> &MatchCriteria {
        &self.criteria
    }

    pub fn take_collected_events(&self) -> Vec<CollectedEvent> {
        self.collector.take()
    }

    /// Post every event of `msg_ts` that matches. Returns the match count.
    fn collect_events(&self, msg_ts: &TipSet, events: &[CollectedEvent]) -> u64 {
        if !self.criteria.matches_tipset(msg_ts.height(), msg_ts.key()) {
            return 0;
        }

        let mut matched = 0;
        for event in events {
            if self
                .criteria
                .matches_event(&event.emitter_addr, &event.entries)
            {
                self.collector
                    .post(event.clone(), || SubItem::Event(event.clone()));
                matched += 1;
            }
        }
        matched
    }
}

impl std::fmt::Debug for EventFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventFilter")
            .field("id", &self.id())
            .field("criteria", &self.criteria)
            .field("buffered", &self.collector.len())
            .finish()
    }
}

/// Installs event filters and feeds them from applied and reverted tipsets.
pub struct EventFilterManager {
    store: Arc<FilterStore>,
    message_store: Arc<dyn MessageStore>,
    actors: Arc<dyn ActorResolver>,
    index: Option<Arc<dyn EventIndex>>,
    max_results: usize,
    clock: Arc<dyn TimeSource>,
    metrics: Arc<EventMetrics>,
    current_height: AtomicI64,
    filters: Mutex<HashMap<FilterId, Arc<EventFilter>>>,
}

impl EventFilterManager {
    pub fn new(
        store: Arc<FilterStore>,
        message_store: Arc<dyn MessageStore>,
        actors: Arc<dyn ActorResolver>,
        index: Option<Arc<dyn EventIndex>>,
        max_results: usize,
        clock: Arc<dyn TimeSource>,
        metrics: Arc<EventMetrics>,
    ) -> Self {
        Self {
            store,
            message_store,
            actors,
            index,
            max_results,
            clock,
            metrics,
            current_height: AtomicI64::new(0),
            filters: Mutex::new(HashMap::new()),
        }
    }

    pub fn index(&self) -> Option<&Arc<dyn EventIndex>> {
        self.index.as_ref()
    }

    pub fn current_height(&self) -> ChainEpoch {
        self.current_height.load(Ordering::Relaxed)
    }

    pub fn set_current_height(&self, height: ChainEpoch) {
        self.current_height.store(height, Ordering::Relaxed);
    }

    /// Install a filter, prefilling it from the index when the criteria
    /// reach behind the current head.
    ///
    /// # Errors
    /// - `IndexUnavailable`: the criteria need history and there is no index
    /// - `MaxFiltersReached`: the filter store is full
    pub async fn install(
        &self,
        criteria: MatchCriteria,
        exclude_reverted: bool,
    ) -> EventResult<Arc<EventFilter>> {
        let filter = Arc::new(EventFilter {
            criteria,
            collector: Collector::new(self.max_results, self.clock.clone(), self.metrics.clone()),
        });

        if filter.criteria.is_historic(self.current_height()) {
            let index = self.index.as_ref().ok_or(EventError::IndexUnavailable)?;
            let prefill = index
                .prefill_filter(&filter.criteria, exclude_reverted)
                .await?;
            trace!(filter_id = %filter.id(), events = prefill.len(), "Prefilled filter from index");
            filter.collector.prefill(prefill);
        }

        self.store.add(Filter::Event(filter.clone()))?;
        self.filters.lock().insert(filter.id(), filter.clone());

        EventMetrics::incr(&self.metrics.filters_installed);
        debug!(filter_id = %filter.id(), "Installed event filter");
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

    /// Canonical address of an emitter. Lookup failures fall back to the ID
    /// address instead of failing the tipset.
    async fn resolve_emitter(&self, emitter: ActorId, ts: &TipSet) -> Address {
        match self.actors.delegated_address(emitter, ts).await {
            Ok(Some(addr)) => addr,
            Ok(None) => Address::Id(emitter),
            Err(e) => {
                debug!(emitter, error = %e, "Falling back to ID address for emitter");
                Address::Id(emitter)
            }
        }
    }

    /// Every event of the messages in `msg_ts`, executed in `rct_ts`.
    async fn tipset_events(
        &self,
        msg_ts: &TipSet,
        rct_ts: &TipSet,
        reverted: bool,
    ) -> EventResult<Vec<CollectedEvent>> {
        let messages = self.message_store.executed_messages(msg_ts, rct_ts).await?;

        let mut resolved: HashMap<ActorId, Address> = HashMap::new();
        let mut events = Vec::new();
        for (msg_idx, message) in messages.iter().enumerate() {
            for (event_idx, event) in message.events.iter().enumerate() {
                let emitter_addr = match resolved.get(&event.emitter) {
                    Some(addr) => addr.clone(),
                    None => {
                        let addr = self.resolve_emitter(event.emitter, rct_ts).await;
                        resolved.insert(event.emitter, addr.clone());
                        addr
                    }
                };

                events.push(CollectedEvent {
                    entries: event.entries.clone(),
                    emitter_addr,
                    event_idx: event_idx as u64,
                    reverted,
                    height: msg_ts.height(),
                    tipset_key: msg_ts.key().clone(),
                    msg_idx: msg_idx as u64,
                    msg_cid: message.cid,
                });
            }
        }
        Ok(events)
    }

    async fn process(&self, msg_ts: &TipSet, rct_ts: &TipSet, revert: bool) -> EventResult<()> {
        let filters: Vec<_> = self.filters.lock().values().cloned().collect();
        if filters.is_empty() && self.index.is_none() {
            return Ok(());
        }

        let events = self.tipset_events(msg_ts, rct_ts, revert).await?;

        if let Some(index) = &self.index {
            index.collect_events(msg_ts, &events, revert).await?;
        }

        let matched: u64 = filters
            .iter()
            .map(|f| f.collect_events(msg_ts, &events))
            .sum();
        EventMetrics::add(&self.metrics.events_collected, matched);
        trace!(
            height = msg_ts.height(),
            events = events.len(),
            matched,
            revert,
            "Matched tipset events"
        );
        Ok(())
    }
}

#[async_trait]
impl TipSetObserver for EventFilterManager {
    async fn apply(&self, from: &TipSet, to: &TipSet) -> EventResult<()> {
        self.set_current_height(to.height());
        self.process(from, to, false).await
    }

    async fn revert(&self, from: &TipSet, to: &TipSet) -> EventResult<()> {
        self.set_current_height(to.height());
        self.process(to, from, true).await
    }
}
