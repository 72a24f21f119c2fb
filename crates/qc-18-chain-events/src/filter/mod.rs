//! Filters, their store and the per-kind managers that feed them.
//!
//! ```text
//!  ChainNotifier ──apply/revert──→ EventFilterManager ──→ EventFilter ─┐
//!                └─────────────→ TipSetFilterManager ──→ TipSetFilter ├─→ buffer (polled)
//!  MempoolSource ──────────────→ MemPoolFilterManager ─→ MemPoolFilter ┘   └→ subscription ingest
//! ```

pub mod event;
pub mod mempool;
pub mod registry;
pub mod store;
pub mod tipset;

pub use event::{EventFilter, EventFilterManager};
pub use mempool::{MemPoolFilter, MemPoolFilterManager};
pub use registry::{FilterRegistry, FilterUninstaller};
pub use store::FilterStore;
pub use tipset::{TipSetFilter, TipSetFilterManager};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{trace, warn};

use crate::domain::{CollectedEvent, FilterId, SignedMessage, TipSet, Timestamp};
use crate::metrics::EventMetrics;
use crate::ports::TimeSource;

/// An item pushed from a filter into a subscription's ingest stage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubItem {
    Event(CollectedEvent),
    TipSet(TipSet),
    Message(SignedMessage),
}

/// Kind tag of a filter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FilterKind {
    Event,
    TipSet,
    MemPool,
}

/// A live filter of any kind.
#[derive(Clone)]
pub enum Filter {
    Event(Arc<EventFilter>),
    TipSet(Arc<TipSetFilter>),
    MemPool(Arc<MemPoolFilter>),
}

impl Filter {
    fn collector_state(&self) -> &CollectorState {
        match self {
            Filter::Event(f) => &f.collector.state,
            Filter::TipSet(f) => &f.collector.state,
            Filter::MemPool(f) => &f.collector.state,
        }
    }

    pub fn id(&self) -> FilterId {
        self.collector_state().id
    }

    pub fn kind(&self) -> FilterKind {
        match self {
            Filter::Event(_) => FilterKind::Event,
            Filter::TipSet(_) => FilterKind::TipSet,
            Filter::MemPool(_) => FilterKind::MemPool,
        }
    }

    /// Bind the filter to a subscription. Only the first binding takes effect.
    pub fn set_sub_channel(&self, tx: mpsc::Sender<SubItem>) -> bool {
        self.collector_state().sub_channel.set(tx).is_ok()
    }

    /// When the filter was last drained or successfully streamed.
    pub fn last_taken(&self) -> Timestamp {
        self.collector_state().last_taken.load(Ordering::Relaxed)
    }

    /// Items waiting for the next poll.
    pub fn buffered(&self) -> usize {
        match self {
            Filter::Event(f) => f.collector.len(),
            Filter::TipSet(f) => f.collector.len(),
            Filter::MemPool(f) => f.collector.len(),
        }
    }
}

impl std::fmt::Debug for Filter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Filter")
            .field("id", &self.id())
            .field("kind", &self.kind())
            .finish()
    }
}

struct CollectorState {
    id: FilterId,
    last_taken: AtomicU64,
    sub_channel: OnceLock<mpsc::Sender<SubItem>>,
}

/// Bounded result buffer shared by every filter kind.
pub(crate) struct Collector<T> {
    state: CollectorState,
    max_results: usize,
    buffer: Mutex<Vec<T>>,
    clock: Arc<dyn TimeSource>,
    metrics: Arc<EventMetrics>,
}

impl<T> Collector<T> {
    pub(crate) fn new(
        max_results: usize,
        clock: Arc<dyn TimeSource>,
        metrics: Arc<EventMetrics>,
    ) -> Self {
        Self {
            state: CollectorState {
                id: FilterId::new(),
                last_taken: AtomicU64::new(clock.now()),
                sub_channel: OnceLock::new(),
            },
            max_results,
            buffer: Mutex::new(Vec::new()),
            clock,
            metrics,
        }
    }

    pub(crate) fn id(&self) -> FilterId {
        self.state.id
    }

    fn touch(&self) {
        self.state
            .last_taken
            .store(self.clock.now(), Ordering::Relaxed);
    }

    /// Buffer `item` and, when bound, stream `live()` to the subscription.
    /// Neither path blocks: a full buffer or channel drops the item.
    pub(crate) fn post(&self, item: T, live: impl FnOnce() -> SubItem) {
        if let Some(tx) = self.state.sub_channel.get() {
            match tx.try_send(live()) {
                Ok(()) => self.touch(),
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(filter_id = %self.id(), "subscription ingest full, dropping item");
                    EventMetrics::incr(&self.metrics.items_dropped);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    trace!(filter_id = %self.id(), "subscription gone, filter orphaned");
                }
            }
        }

        let mut buffer = self.buffer.lock();
        if buffer.len() < self.max_results {
            buffer.push(item);
        } else {
            EventMetrics::incr(&self.metrics.items_dropped);
        }
    }

    /// Seed the buffer from history, before the filter is visible to anyone.
    pub(crate) fn prefill(&self, items: Vec<T>) {
        let mut buffer = self.buffer.lock();
        let room = self.max_results.saturating_sub(buffer.len());
        let dropped = items.len().saturating_sub(room);
        buffer.extend(items.into_iter().take(room));
        if dropped > 0 {
            EventMetrics::add(&self.metrics.items_dropped, dropped as u64);
        }
    }

    /// Drain the buffer and mark the filter as taken.
    pub(crate) fn take(&self) -> Vec<T> {
        let taken = std::mem::take(&mut *self.buffer.lock());
        self.touch();
        taken
    }

    pub(crate) fn len(&self) -> usize {
        self.buffer.lock().len()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Manually advanced clock.
    #[derive(Default)]
    pub struct ManualClock(AtomicU64);

    impl ManualClock {
        pub fn at(now: Timestamp) -> Arc<Self> {
            Arc::new(Self(AtomicU64::new(now)))
        }

        pub fn set(&self, now: Timestamp) {
            self.0.store(now, Ordering::Relaxed);
        }
    }

    impl TimeSource for ManualClock {
        fn now(&self) -> Timestamp {
            self.0.load(Ordering::Relaxed)
        }
    }
}
