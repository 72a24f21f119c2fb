//! Shared fakes for the integration tests.
//!
//! `TestNode` wires an `EthEventService` to in-memory collaborators and lets
//! a test grow the chain one tipset at a time.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Once};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use qc_18_chain_events::domain::{
    ActorEvent, ActorId, Address, ChainEpoch, Cid, EthAddress, EthBlock, EthHash, EthUint64,
    EventEntry, ExecutedMessage, MpoolUpdate, MpoolUpdateKind, SigType, SignedMessage, TipSet,
    TipSetKey, Timestamp, EAM_NAMESPACE,
};
use qc_18_chain_events::{
    ActorResolver, ChainError, ChainNotifier, ChainReader, Collaborators, DeliveryError,
    EthEventService, EventIndex, EventsConfig, HeadChange, MemoryEventIndex, MempoolSource,
    MessageStore, SubscriptionSink, TimeSource,
};

// =============================================================================
// TRACING
// =============================================================================

static TRACING: Once = Once::new();

pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

// =============================================================================
// CHAIN
// =============================================================================

pub fn key(height: ChainEpoch) -> TipSetKey {
    TipSetKey::new(vec![Cid::digest(format!("block-{height}").as_bytes())])
}

pub fn tipset(height: ChainEpoch) -> TipSet {
    let parents = if height == 0 {
        TipSetKey::default()
    } else {
        key(height - 1)
    };
    TipSet::new(height, key(height), parents, 1_000 + height as u64)
}

/// A linear chain starting at genesis.
pub struct FakeChain {
    tipsets: Mutex<BTreeMap<ChainEpoch, TipSet>>,
}

impl FakeChain {
    pub fn new(head: ChainEpoch) -> Self {
        Self {
            tipsets: Mutex::new((0..=head).map(|h| (h, tipset(h))).collect()),
        }
    }

    /// Append a tipset and return `(old head, new head)`.
    pub fn grow(&self) -> (TipSet, TipSet) {
        let mut tipsets = self.tipsets.lock();
        let (_, head) = tipsets.iter().next_back().expect("chain has genesis");
        let head = head.clone();
        let next = tipset(head.height() + 1);
        tipsets.insert(next.height(), next.clone());
        (head, next)
    }

    pub fn at(&self, height: ChainEpoch) -> TipSet {
        self.tipsets.lock()[&height].clone()
    }
}

#[async_trait]
impl ChainReader for FakeChain {
    fn head(&self) -> TipSet {
        self.tipsets
            .lock()
            .values()
            .next_back()
            .cloned()
            .expect("chain has genesis")
    }

    async fn tipset_by_key(&self, k: &TipSetKey) -> Result<TipSet, ChainError> {
        self.tipsets
            .lock()
            .values()
            .find(|ts| ts.key() == k)
            .cloned()
            .ok_or_else(|| ChainError::TipSetNotFound(k.to_string()))
    }

    async fn tipset_by_cid(&self, cid: &Cid) -> Result<TipSet, ChainError> {
        self.tipsets
            .lock()
            .values()
            .find(|ts| ts.key().cid() == *cid)
            .cloned()
            .ok_or_else(|| ChainError::TipSetNotFound(cid.to_string()))
    }

    async fn tipset_by_height(&self, height: ChainEpoch) -> Result<TipSet, ChainError> {
        self.tipsets
            .lock()
            .get(&height)
            .cloned()
            .ok_or_else(|| ChainError::TipSetNotFound(height.to_string()))
    }

    async fn eth_block(&self, ts: &TipSet) -> Result<EthBlock, ChainError> {
        Ok(EthBlock {
            hash: EthHash::from_cid(&ts.key().cid()),
            parent_hash: EthHash::from_cid(&ts.parents().cid()),
            number: EthUint64(ts.height() as u64),
            timestamp: EthUint64(ts.timestamp()),
            transactions: vec![],
        })
    }
}

// =============================================================================
// MESSAGES & ACTORS
// =============================================================================

/// Messages keyed by the height of the tipset that included them.
#[derive(Default)]
pub struct FakeMessages {
    by_height: Mutex<HashMap<ChainEpoch, Vec<ExecutedMessage>>>,
    collected: Mutex<HashSet<Cid>>,
}

impl FakeMessages {
    pub fn include(&self, height: ChainEpoch, message: ExecutedMessage) {
        self.by_height.lock().entry(height).or_default().push(message);
    }

    /// Simulate the message store pruning a message.
    pub fn garbage_collect(&self, cid: Cid) {
        self.collected.lock().insert(cid);
    }
}

#[async_trait]
impl MessageStore for FakeMessages {
    async fn executed_messages(
        &self,
        msg_ts: &TipSet,
        _rct_ts: &TipSet,
    ) -> Result<Vec<ExecutedMessage>, ChainError> {
        Ok(self
            .by_height
            .lock()
            .get(&msg_ts.height())
            .cloned()
            .unwrap_or_default())
    }

    async fn tx_hash_from_message_cid(&self, cid: &Cid) -> Result<Option<EthHash>, ChainError> {
        if self.collected.lock().contains(cid) {
            return Ok(None);
        }
        Ok(Some(tx_hash(cid)))
    }

    fn tx_hash_from_signed_message(&self, message: &SignedMessage) -> Result<EthHash, ChainError> {
        Ok(tx_hash(&message.cid))
    }
}

pub fn tx_hash(cid: &Cid) -> EthHash {
    EthHash(Cid::digest(cid.as_bytes()).0)
}

/// Every actor has a delegated address derived from its ID.
pub struct FakeActors;

pub fn contract(actor: ActorId) -> EthAddress {
    let mut bytes = [0x11u8; 20];
    bytes[12..].copy_from_slice(&actor.to_be_bytes());
    EthAddress(bytes)
}

#[async_trait]
impl ActorResolver for FakeActors {
    async fn delegated_address(
        &self,
        actor: ActorId,
        _tipset: &TipSet,
    ) -> Result<Option<Address>, ChainError> {
        Ok(Some(Address::Delegated {
            namespace: EAM_NAMESPACE,
            sub_address: contract(actor).0.to_vec(),
        }))
    }
}

pub fn topic(n: u8) -> [u8; 32] {
    [n; 32]
}

/// A message emitting one log-shaped event per `(emitter, topic)` pair.
pub fn message(name: &str, events: &[(ActorId, u8)]) -> ExecutedMessage {
    ExecutedMessage {
        cid: Cid::digest(name.as_bytes()),
        events: events
            .iter()
            .map(|(emitter, t)| ActorEvent {
                emitter: *emitter,
                entries: vec![
                    EventEntry::raw("t1", topic(*t).to_vec()),
                    EventEntry::raw("d", vec![*t]),
                ],
            })
            .collect(),
    }
}

// =============================================================================
// MEMPOOL
// =============================================================================

pub struct FakeMempool {
    rx: Mutex<Option<mpsc::Receiver<MpoolUpdate>>>,
}

impl FakeMempool {
    pub fn new() -> (Arc<Self>, mpsc::Sender<MpoolUpdate>) {
        let (tx, rx) = mpsc::channel(64);
        (
            Arc::new(Self {
                rx: Mutex::new(Some(rx)),
            }),
            tx,
        )
    }
}

impl MempoolSource for FakeMempool {
    fn updates(&self) -> mpsc::Receiver<MpoolUpdate> {
        self.rx.lock().take().unwrap_or_else(|| mpsc::channel(1).1)
    }
}

pub fn pending(nonce: u64) -> MpoolUpdate {
    MpoolUpdate {
        kind: MpoolUpdateKind::Add,
        message: SignedMessage {
            cid: Cid::digest(format!("pending-{nonce}").as_bytes()),
            from: Address::Id(100),
            to: Address::Id(101),
            nonce,
            signature_type: SigType::Delegated,
        },
    }
}

// =============================================================================
// CLOCK & SINKS
// =============================================================================

#[derive(Default)]
pub struct ManualClock(AtomicU64);

impl ManualClock {
    pub fn at(now: Timestamp) -> Arc<Self> {
        Arc::new(Self(AtomicU64::new(now)))
    }

    pub fn advance(&self, millis: Timestamp) {
        self.0.fetch_add(millis, Ordering::Relaxed);
    }
}

impl TimeSource for ManualClock {
    fn now(&self) -> Timestamp {
        self.0.load(Ordering::Relaxed)
    }
}

/// Decodes every delivered payload back into JSON.
pub struct RecordingSink(mpsc::UnboundedSender<serde_json::Value>);

impl RecordingSink {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<serde_json::Value>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self(tx)), rx)
    }
}

#[async_trait]
impl SubscriptionSink for RecordingSink {
    async fn deliver(&self, payload: Vec<u8>) -> Result<(), DeliveryError> {
        let value = serde_json::from_slice(&payload).map_err(|e| DeliveryError(e.to_string()))?;
        self.0
            .send(value)
            .map_err(|_| DeliveryError("receiver dropped".to_string()))
    }
}

// =============================================================================
// NODE
// =============================================================================

pub struct TestNode {
    pub service: EthEventService,
    pub notifier: Arc<ChainNotifier>,
    pub chain: Arc<FakeChain>,
    pub messages: Arc<FakeMessages>,
    pub index: Arc<MemoryEventIndex>,
    pub mempool: mpsc::Sender<MpoolUpdate>,
    pub clock: Arc<ManualClock>,
}

impl TestNode {
    /// Node with a historical index, its chain at `head`.
    pub fn new(head: ChainEpoch, config: EventsConfig) -> Self {
        let index = Arc::new(MemoryEventIndex::new());
        Self::with_index(head, config, index.clone(), index)
    }

    /// Node whose service talks to `port`, which is backed by `index`.
    pub fn with_index(
        head: ChainEpoch,
        config: EventsConfig,
        index: Arc<MemoryEventIndex>,
        port: Arc<dyn EventIndex>,
    ) -> Self {
        init_tracing();

        let chain = Arc::new(FakeChain::new(head));
        let messages = Arc::new(FakeMessages::default());
        let (mempool_source, mempool) = FakeMempool::new();
        let clock = ManualClock::at(1_000_000);

        let collaborators = Collaborators::new(
            chain.clone(),
            messages.clone(),
            Arc::new(FakeActors),
            mempool_source,
        )
        .with_index(port)
        .with_clock(clock.clone());

        let service = EthEventService::new(config, collaborators).expect("valid config");
        let notifier = Arc::new(ChainNotifier::new());
        service.start(&notifier);

        Self {
            service,
            notifier,
            chain,
            messages,
            index,
            mempool,
            clock,
        }
    }

    /// Grow the chain by one tipset and dispatch the head change.
    pub async fn advance(&self) -> TipSet {
        let (from, to) = self.chain.grow();
        self.notifier
            .notify(&[HeadChange::Apply {
                from,
                to: to.clone(),
            }])
            .await;
        to
    }

    /// Revert the head back to its parent.
    pub async fn revert_head(&self) {
        let head = self.chain.head();
        let parent = self.chain.at(head.height() - 1);
        self.notifier
            .notify(&[HeadChange::Revert {
                from: head,
                to: parent,
            }])
            .await;
    }
}
