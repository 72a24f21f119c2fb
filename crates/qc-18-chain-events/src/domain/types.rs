//! Chain data model shared with the external collaborators.
//!
//! Block decoding, execution and storage are not handled here. These are the
//! already-decoded shapes the chain reader, message store and mempool hand to
//! the filter engine.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Milliseconds since the UNIX epoch.
pub type Timestamp = u64;

/// Chain height. Signed because `-1` is used as the "track the head" sentinel.
pub type ChainEpoch = i64;

/// Numeric actor identifier.
pub type ActorId = u64;

/// Namespace of the Ethereum address manager; delegated addresses in this
/// namespace carry a 20-byte Ethereum address as their sub-address.
pub const EAM_NAMESPACE: ActorId = 10;

/// Multicodec code for raw bytes.
pub const RAW_CODEC: u64 = 0x55;

/// Event entry flags.
pub mod flags {
    /// The entry key is indexed.
    pub const INDEXED_KEY: u8 = 0b01;
    /// The entry value is indexed.
    pub const INDEXED_VALUE: u8 = 0b10;
}

/// Content identifier, reduced to its 32-byte digest.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Cid(pub [u8; 32]);

impl Cid {
    /// Derive a CID by hashing arbitrary bytes.
    pub fn digest(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        Self(hasher.finalize().into())
    }

    /// Raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

/// Ordered set of block CIDs identifying a tipset.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TipSetKey(Vec<Cid>);

impl TipSetKey {
    pub fn new(cids: Vec<Cid>) -> Self {
        Self(cids)
    }

    pub fn cids(&self) -> &[Cid] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// CID of the key itself: the digest of its concatenated block CIDs.
    pub fn cid(&self) -> Cid {
        let mut hasher = Sha256::new();
        for cid in &self.0 {
            hasher.update(cid.as_bytes());
        }
        Cid(hasher.finalize().into())
    }
}

impl fmt::Display for TipSetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, cid) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{cid}")?;
        }
        write!(f, "}}")
    }
}

/// One step of the chain: the blocks sharing a parent and a height.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TipSet {
    height: ChainEpoch,
    key: TipSetKey,
    parents: TipSetKey,
    timestamp: u64,
}

impl TipSet {
    pub fn new(height: ChainEpoch, key: TipSetKey, parents: TipSetKey, timestamp: u64) -> Self {
        Self {
            height,
            key,
            parents,
            timestamp,
        }
    }

    pub fn height(&self) -> ChainEpoch {
        self.height
    }

    pub fn key(&self) -> &TipSetKey {
        &self.key
    }

    pub fn parents(&self) -> &TipSetKey {
        &self.parents
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }
}

/// Chain address of an actor.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Address {
    /// Canonical short form.
    Id(ActorId),
    /// Address delegated to an address manager actor.
    Delegated {
        namespace: ActorId,
        sub_address: Vec<u8>,
    },
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::Id(id) => write!(f, "f0{id}"),
            Address::Delegated {
                namespace,
                sub_address,
            } => write!(f, "f4{namespace}f{}", hex::encode(sub_address)),
        }
    }
}

/// A single key/value entry of an actor event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEntry {
    pub flags: u8,
    pub key: String,
    pub codec: u64,
    pub value: Vec<u8>,
}

impl EventEntry {
    /// Raw-codec entry indexed by key and value.
    pub fn raw(key: impl Into<String>, value: Vec<u8>) -> Self {
        Self {
            flags: flags::INDEXED_KEY | flags::INDEXED_VALUE,
            key: key.into(),
            codec: RAW_CODEC,
            value,
        }
    }

    /// Only indexed entries take part in key matching.
    pub fn is_indexed(&self) -> bool {
        self.flags & (flags::INDEXED_KEY | flags::INDEXED_VALUE) > 0
    }
}

/// An event emitted by an actor during message execution.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorEvent {
    pub emitter: ActorId,
    pub entries: Vec<EventEntry>,
}

/// A message executed in a tipset, together with the events it emitted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecutedMessage {
    pub cid: Cid,
    pub events: Vec<ActorEvent>,
}

/// Signature scheme of a signed message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SigType {
    Secp256k1,
    Bls,
    Delegated,
}

/// A signed message as seen by the mempool.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedMessage {
    pub cid: Cid,
    pub from: Address,
    pub to: Address,
    pub nonce: u64,
    pub signature_type: SigType,
}

/// Kind of mempool change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MpoolUpdateKind {
    Add,
    Remove,
}

/// A change to the mempool contents.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MpoolUpdate {
    pub kind: MpoolUpdateKind,
    pub message: SignedMessage,
}

/// An event that matched a filter, with its chain position.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CollectedEvent {
    pub entries: Vec<EventEntry>,
    /// Emitter, resolved to its delegated address where one exists.
    pub emitter_addr: Address,
    /// Index of the event within its message.
    pub event_idx: u64,
    /// True when this record retracts an event from a reverted tipset.
    pub reverted: bool,
    pub height: ChainEpoch,
    pub tipset_key: TipSetKey,
    /// Index of the message within the tipset.
    pub msg_idx: u64,
    pub msg_cid: Cid,
}
