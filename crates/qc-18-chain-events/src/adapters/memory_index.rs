//! In-memory historical event index.
//!
//! Keeps every collected event for the lifetime of the process. Suitable for
//! tests and light nodes; a persistent index implements the same port.

use std::collections::HashSet;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::trace;

use crate::domain::{ChainEpoch, Cid, CollectedEvent, MatchCriteria, TipSet};
use crate::error::IndexError;
use crate::ports::EventIndex;

const UPDATE_CHANNEL_CAPACITY: usize = 16;

#[derive(Default)]
struct IndexState {
    /// Highest tipset height recorded.
    max_height: Option<ChainEpoch>,
    processed: HashSet<Cid>,
    events: Vec<CollectedEvent>,
}

/// Event index held entirely in memory.
pub struct MemoryEventIndex {
    state: RwLock<IndexState>,
    updates: broadcast::Sender<()>,
}

impl Default for MemoryEventIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryEventIndex {
    #[must_use]
    pub fn new() -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        Self {
            state: RwLock::new(IndexState::default()),
            updates,
        }
    }

    /// Mark a tipset processed without recording events for it.
    pub fn mark_processed(&self, tipset: &TipSet) {
        self.record(tipset, &[], false);
    }

    pub fn event_count(&self) -> usize {
        self.state.read().events.len()
    }

    /// Receivers currently waiting on updates.
    pub fn subscriber_count(&self) -> usize {
        self.updates.receiver_count()
    }

    fn record(&self, tipset: &TipSet, events: &[CollectedEvent], revert: bool) {
        {
            let mut state = self.state.write();
            let key = tipset.key();

            if revert {
                for event in state.events.iter_mut().filter(|e| &e.tipset_key == key) {
                    event.reverted = true;
                }
            } else {
                // A tipset applied again after a revert replaces its old rows.
                state.events.retain(|e| &e.tipset_key != key);
                state.events.extend(events.iter().cloned().map(|mut e| {
                    e.reverted = false;
                    e
                }));
                state.processed.insert(key.cid());
                state.max_height = state.max_height.max(Some(tipset.height()));
            }
        }

        trace!(height = tipset.height(), events = events.len(), revert, "Indexed tipset");
        // No receivers is fine.
        let _ = self.updates.send(());
    }
}

#[async_trait]
impl EventIndex for MemoryEventIndex {
    async fn is_height_past(&self, height: ChainEpoch) -> Result<bool, IndexError> {
        Ok(self.state.read().max_height.is_some_and(|max| max > height))
    }

    async fn is_tipset_processed(&self, tipset_cid: &Cid) -> Result<bool, IndexError> {
        Ok(self.state.read().processed.contains(tipset_cid))
    }

    fn subscribe_updates(&self) -> broadcast::Receiver<()> {
        self.updates.subscribe()
    }

    async fn collect_events(
        &self,
        tipset: &TipSet,
        events: &[CollectedEvent],
        revert: bool,
    ) -> Result<(), IndexError> {
        self.record(tipset, events, revert);
        Ok(())
    }

    async fn prefill_filter(
        &self,
        criteria: &MatchCriteria,
        exclude_reverted: bool,
    ) -> Result<Vec<CollectedEvent>, IndexError> {
        let state = self.state.read();
        let mut matched: Vec<_> = state
            .events
            .iter()
            .filter(|e| !(exclude_reverted && e.reverted))
            .filter(|e| criteria.matches_tipset(e.height, &e.tipset_key))
            .filter(|e| criteria.matches_event(&e.emitter_addr, &e.entries))
            .cloned()
            .collect();
        matched.sort_by_key(|e| (e.height, e.msg_idx, e.event_idx));
        Ok(matched)
    }
}
