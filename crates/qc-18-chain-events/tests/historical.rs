//! # Historical Query Tests
//!
//! `get_logs`, historic prefill and the wait for the event index to catch up.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;

use common::{contract, key, message, tipset, tx_hash, TestNode};
use qc_18_chain_events::domain::{
    ChainEpoch, Cid, CollectedEvent, EthFilterResult, EthFilterSpec, EthHash, EthLog, EthUint64,
    MatchCriteria, OneOrMany, TipSet,
};
use qc_18_chain_events::{
    EthEventApi, EventError, EventIndex, EventsConfig, IndexError, MemoryEventIndex,
};

// =============================================================================
// TEST HELPERS
// =============================================================================

/// Counts update subscriptions, and can mark a tipset processed at the moment
/// a subscription is taken.
struct ObservedIndex {
    inner: Arc<MemoryEventIndex>,
    subscriptions: AtomicUsize,
    on_subscribe: parking_lot::Mutex<Option<TipSet>>,
}

impl ObservedIndex {
    fn new(inner: Arc<MemoryEventIndex>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            subscriptions: AtomicUsize::new(0),
            on_subscribe: parking_lot::Mutex::new(None),
        })
    }
}

#[async_trait]
impl EventIndex for ObservedIndex {
    async fn is_height_past(&self, height: ChainEpoch) -> Result<bool, IndexError> {
        self.inner.is_height_past(height).await
    }

    async fn is_tipset_processed(&self, tipset_cid: &Cid) -> Result<bool, IndexError> {
        self.inner.is_tipset_processed(tipset_cid).await
    }

    fn subscribe_updates(&self) -> broadcast::Receiver<()> {
        self.subscriptions.fetch_add(1, Ordering::SeqCst);
        let rx = self.inner.subscribe_updates();
        if let Some(ts) = self.on_subscribe.lock().take() {
            self.inner.mark_processed(&ts);
        }
        rx
    }

    async fn collect_events(
        &self,
        tipset: &TipSet,
        events: &[CollectedEvent],
        revert: bool,
    ) -> Result<(), IndexError> {
        self.inner.collect_events(tipset, events, revert).await
    }

    async fn prefill_filter(
        &self,
        criteria: &MatchCriteria,
        exclude_reverted: bool,
    ) -> Result<Vec<CollectedEvent>, IndexError> {
        self.inner.prefill_filter(criteria, exclude_reverted).await
    }
}

/// Delegates to a memory index but fails queries: the prefill always, and
/// the processed-height check when `fail_height` is set.
struct FailingIndex {
    inner: Arc<MemoryEventIndex>,
    fail_height: bool,
}

impl FailingIndex {
    fn refused() -> IndexError {
        IndexError::Query("connection refused".into())
    }
}

#[async_trait]
impl EventIndex for FailingIndex {
    async fn is_height_past(&self, height: ChainEpoch) -> Result<bool, IndexError> {
        if self.fail_height {
            return Err(Self::refused());
        }
        self.inner.is_height_past(height).await
    }

    async fn is_tipset_processed(&self, tipset_cid: &Cid) -> Result<bool, IndexError> {
        self.inner.is_tipset_processed(tipset_cid).await
    }

    fn subscribe_updates(&self) -> broadcast::Receiver<()> {
        self.inner.subscribe_updates()
    }

    async fn collect_events(
        &self,
        tipset: &TipSet,
        events: &[CollectedEvent],
        revert: bool,
    ) -> Result<(), IndexError> {
        self.inner.collect_events(tipset, events, revert).await
    }

    async fn prefill_filter(
        &self,
        _criteria: &MatchCriteria,
        _exclude_reverted: bool,
    ) -> Result<Vec<CollectedEvent>, IndexError> {
        Err(Self::refused())
    }
}

/// Node at head 10 whose index has caught up to 9 but fails queries.
fn failing_node(fail_height: bool) -> TestNode {
    let memory = Arc::new(MemoryEventIndex::new());
    let failing = Arc::new(FailingIndex {
        inner: memory.clone(),
        fail_height,
    });
    let node = TestNode::with_index(10, EventsConfig::default(), memory.clone(), failing);
    memory.mark_processed(&tipset(9));
    node
}

fn range(from: &str, to: &str) -> EthFilterSpec {
    EthFilterSpec {
        from_block: Some(from.to_string()),
        to_block: Some(to.to_string()),
        ..Default::default()
    }
}

fn logs(result: EthFilterResult) -> Vec<EthLog> {
    match result {
        EthFilterResult::Logs(logs) => logs,
        other => panic!("expected logs, got {other:?}"),
    }
}

/// Node at head 12 with events indexed at heights 5 and 7.
async fn indexed_node() -> TestNode {
    let node = TestNode::new(3, EventsConfig::default());
    node.messages.include(5, message("five", &[(1, 5)]));
    node.messages.include(7, message("seven-a", &[(1, 7)]));
    node.messages.include(7, message("seven-b", &[(2, 7)]));
    while node.advance().await.height() < 12 {}
    node
}

// =============================================================================
// GET LOGS
// =============================================================================

#[tokio::test]
async fn test_get_logs_over_range() {
    let node = indexed_node().await;
    assert_eq!(node.index.event_count(), 3);

    let found = logs(node.service.get_logs(range("0x5", "0x8")).await.unwrap());
    let heights: Vec<_> = found.iter().map(|l| l.block_number).collect();
    assert_eq!(heights, vec![EthUint64(5), EthUint64(7), EthUint64(7)]);

    // Temporary filters are gone again.
    assert!(node.service.registry().store().is_empty());
}

#[tokio::test]
async fn test_get_logs_by_block_hash_and_address() {
    let node = indexed_node().await;
    let spec = EthFilterSpec {
        block_hash: Some(EthHash::from_cid(&key(7).cid())),
        address: OneOrMany::One(contract(2)),
        ..Default::default()
    };

    let found = logs(node.service.get_logs(spec).await.unwrap());
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].address, contract(2));
    assert_eq!(found[0].transaction_index, EthUint64(1));
}

#[tokio::test]
async fn test_logs_for_block_and_transaction() {
    let node = indexed_node().await;
    let wanted = message("seven-b", &[]);

    let found = node
        .service
        .logs_for_block_and_transaction(EthHash::from_cid(&key(7).cid()), tx_hash(&wanted.cid))
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].transaction_hash, tx_hash(&wanted.cid));
}

#[tokio::test]
async fn test_get_logs_rejects_unexecuted_heights() {
    let node = indexed_node().await;

    // The head's own messages are not executed yet.
    assert!(matches!(
        node.service.get_logs(range("0x5", "0xc")).await,
        Err(EventError::InvalidSpec(_))
    ));
    assert!(matches!(
        node.service.get_logs(range("0x1", "0x2")).await,
        Ok(EthFilterResult::Logs(logs)) if logs.is_empty()
    ));
}

#[tokio::test]
async fn test_get_logs_unindexed_tipset() {
    let node = TestNode::new(10, EventsConfig::default());
    // Past height 4 but tipset 4 itself was never indexed.
    node.index.mark_processed(&tipset(6));

    let spec = EthFilterSpec {
        block_hash: Some(EthHash::from_cid(&key(4).cid())),
        ..Default::default()
    };
    assert!(matches!(
        node.service.get_logs(spec).await,
        Err(EventError::TipsetNotIndexed(_))
    ));
}

#[tokio::test]
async fn test_historic_api_disabled() {
    let node = TestNode::new(10, EventsConfig::default().with_historic_filter_api(false));

    assert!(matches!(
        node.service.get_logs(range("0x1", "0x2")).await,
        Err(EventError::IndexUnavailable)
    ));
    // A live filter still works, a historic one cannot be prefilled.
    node.service.new_filter(EthFilterSpec::default()).await.unwrap();
    assert!(matches!(
        node.service.new_filter(range("0x1", "latest")).await,
        Err(EventError::IndexUnavailable)
    ));
    assert_eq!(node.service.registry().store().len(), 1);
}

#[tokio::test]
async fn test_index_prefill_error_propagates() {
    let node = failing_node(false);

    assert!(matches!(
        node.service.get_logs(range("0x1", "0x2")).await,
        Err(EventError::Index(IndexError::Query(_)))
    ));
    assert!(matches!(
        node.service.new_filter(range("0x1", "latest")).await,
        Err(EventError::Index(IndexError::Query(_)))
    ));
    assert!(node.service.registry().store().is_empty());
}

#[tokio::test]
async fn test_index_height_error_propagates() {
    let node = failing_node(true);

    assert!(matches!(
        node.service.get_logs(range("0x1", "0x2")).await,
        Err(EventError::Index(IndexError::Query(_)))
    ));
    assert!(node.service.registry().store().is_empty());
}

#[tokio::test]
async fn test_new_filter_prefills_from_index() {
    let node = indexed_node().await;
    let id = node.service.new_filter(range("0x6", "latest")).await.unwrap();

    let found = logs(node.service.get_filter_changes(id).await.unwrap());
    assert_eq!(found.len(), 2);
    assert!(found.iter().all(|l| l.block_number == EthUint64(7)));
}

// =============================================================================
// WAIT FOR HEIGHT PROCESSED
// =============================================================================

#[tokio::test]
async fn test_wait_returns_immediately_when_index_is_past() {
    let memory = Arc::new(MemoryEventIndex::new());
    let observed = ObservedIndex::new(memory.clone());
    let node = TestNode::with_index(10, EventsConfig::default(), memory.clone(), observed.clone());
    memory.mark_processed(&tipset(9));

    node.service.wait_for_height_processed(8).await.unwrap();
    assert_eq!(observed.subscriptions.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_wait_survives_update_racing_the_subscription() {
    let memory = Arc::new(MemoryEventIndex::new());
    let observed = ObservedIndex::new(memory.clone());
    let node = TestNode::with_index(10, EventsConfig::default(), memory.clone(), observed.clone());
    memory.mark_processed(&tipset(5));

    // The index reaches height 9 exactly while the waiter subscribes; the
    // notification fires before the receiver is polled.
    *observed.on_subscribe.lock() = Some(tipset(9));

    node.service.wait_for_height_processed(8).await.unwrap();
    assert_eq!(observed.subscriptions.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_wait_wakes_on_index_update() {
    let node = TestNode::new(10, EventsConfig::default());
    node.index.mark_processed(&tipset(5));

    let (waited, _) = tokio::join!(node.service.wait_for_height_processed(8), async {
        tokio::task::yield_now().await;
        node.index.mark_processed(&tipset(7));
        tokio::task::yield_now().await;
        node.index.mark_processed(&tipset(9));
    });
    waited.unwrap();
    assert_eq!(node.index.subscriber_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_wait_times_out() {
    let config = EventsConfig::default().with_event_read_timeout(Duration::from_secs(5));
    let node = TestNode::new(10, config);

    let started = tokio::time::Instant::now();
    assert!(matches!(
        node.service.wait_for_height_processed(9).await,
        Err(EventError::IndexTimeout { height: 9 })
    ));
    assert!(started.elapsed() >= Duration::from_secs(5));
}

#[tokio::test]
async fn test_wait_rejects_future_height() {
    let node = TestNode::new(10, EventsConfig::default());
    assert!(matches!(
        node.service.wait_for_height_processed(11).await,
        Err(EventError::FutureHeight { height: 11, head: 10 })
    ));
}

#[tokio::test]
async fn test_wait_cancelled_by_close() {
    let node = TestNode::new(10, EventsConfig::default());
    node.service.close().await;

    assert!(matches!(
        node.service.wait_for_height_processed(9).await,
        Err(EventError::Cancelled)
    ));
}
