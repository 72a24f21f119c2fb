//! Outbound (Driven) ports for the chain events subsystem.
//!
//! Chain storage, message execution results, actor state, the mempool and the
//! historical event index are owned elsewhere in the node. These traits are
//! the only view the filter engine has of them.

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};

use crate::domain::{
    ActorId, Address, ChainEpoch, Cid, CollectedEvent, EthBlock, EthHash, ExecutedMessage,
    MatchCriteria, MpoolUpdate, SignedMessage, TipSet, TipSetKey, Timestamp,
};
use crate::error::{ChainError, DeliveryError, IndexError};

/// Read access to the chain.
#[async_trait]
pub trait ChainReader: Send + Sync {
    /// Current heaviest tipset.
    fn head(&self) -> TipSet;

    async fn tipset_by_key(&self, key: &TipSetKey) -> Result<TipSet, ChainError>;

    /// Lookup by the CID of the tipset key (the Ethereum block hash).
    async fn tipset_by_cid(&self, cid: &Cid) -> Result<TipSet, ChainError>;

    async fn tipset_by_height(&self, height: ChainEpoch) -> Result<TipSet, ChainError>;

    /// Compose the full block record for a tipset, transactions included.
    async fn eth_block(&self, tipset: &TipSet) -> Result<EthBlock, ChainError>;
}

/// Execution results and message hashing.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Messages included in `msg_ts` together with the events they emitted,
    /// as recorded in the receipts of `rct_ts`.
    async fn executed_messages(
        &self,
        msg_ts: &TipSet,
        rct_ts: &TipSet,
    ) -> Result<Vec<ExecutedMessage>, ChainError>;

    /// Transaction hash of a message. `None` when the message has been
    /// garbage collected.
    async fn tx_hash_from_message_cid(&self, cid: &Cid) -> Result<Option<EthHash>, ChainError>;

    fn tx_hash_from_signed_message(&self, message: &SignedMessage) -> Result<EthHash, ChainError>;
}

/// Actor state lookups.
#[async_trait]
pub trait ActorResolver: Send + Sync {
    /// Delegated address registered for `actor` as of `tipset`, if any.
    async fn delegated_address(
        &self,
        actor: ActorId,
        tipset: &TipSet,
    ) -> Result<Option<Address>, ChainError>;
}

/// Query and notification surface of the historical event index.
#[async_trait]
pub trait EventIndex: Send + Sync {
    /// True once the index holds a tipset above `height`.
    async fn is_height_past(&self, height: ChainEpoch) -> Result<bool, IndexError>;

    async fn is_tipset_processed(&self, tipset_cid: &Cid) -> Result<bool, IndexError>;

    /// Receive a notification on every index update. Dropping the receiver
    /// unsubscribes.
    fn subscribe_updates(&self) -> broadcast::Receiver<()>;

    /// Record the events of one tipset, or mark them reverted.
    async fn collect_events(
        &self,
        tipset: &TipSet,
        events: &[CollectedEvent],
        revert: bool,
    ) -> Result<(), IndexError>;

    /// Stored events matching `criteria`.
    async fn prefill_filter(
        &self,
        criteria: &MatchCriteria,
        exclude_reverted: bool,
    ) -> Result<Vec<CollectedEvent>, IndexError>;
}

/// Stream of mempool changes.
pub trait MempoolSource: Send + Sync {
    fn updates(&self) -> mpsc::Receiver<MpoolUpdate>;
}

/// Push primitive of a connected client.
#[async_trait]
pub trait SubscriptionSink: Send + Sync {
    /// Deliver one serialized subscription payload.
    async fn deliver(&self, payload: Vec<u8>) -> Result<(), DeliveryError>;
}

/// Time source for consistent timestamp handling.
///
/// Abstracted to allow testing with deterministic time.
pub trait TimeSource: Send + Sync {
    /// Returns the current timestamp in milliseconds.
    fn now(&self) -> Timestamp;
}

/// Default system time source.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Timestamp {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as Timestamp
    }
}
