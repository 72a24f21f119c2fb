//! Ethereum-flavoured wire types for filter results and subscriptions.
//!
//! All byte strings travel as `0x`-prefixed hex; quantities as minimal hex.

use super::ids::SubscriptionId;
use super::types::{ActorId, Address, Cid, EAM_NAMESPACE};
use crate::error::ChainError;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Prefix marking an Ethereum address that embeds an actor ID.
const MASKED_ID_PREFIX: [u8; 12] = [0xff, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];

fn decode_prefixed(s: &str) -> Result<Vec<u8>, String> {
    let digits = s
        .strip_prefix("0x")
        .ok_or_else(|| format!("{s} is not 0x-prefixed hex"))?;
    // Odd-length inputs are tolerated by left-padding a zero nibble.
    if digits.len() % 2 == 1 {
        hex::decode(format!("0{digits}")).map_err(|e| e.to_string())
    } else {
        hex::decode(digits).map_err(|e| e.to_string())
    }
}

/// Treat an explicit `null` like an absent field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn decode_fixed<const N: usize>(s: &str) -> Result<[u8; N], String> {
    decode_prefixed(s)?
        .try_into()
        .map_err(|v: Vec<u8>| format!("expected {N} bytes, got {}", v.len()))
}

/// 32-byte hash (block hash, transaction hash, topic).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EthHash(pub [u8; 32]);

impl EthHash {
    pub fn from_cid(cid: &Cid) -> Self {
        Self(*cid.as_bytes())
    }

    pub fn to_cid(&self) -> Cid {
        Cid(self.0)
    }

    pub fn parse(s: &str) -> Result<Self, String> {
        decode_fixed::<32>(s).map(Self)
    }
}

impl fmt::Display for EthHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

/// 20-byte Ethereum address.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct EthAddress(pub [u8; 20]);

impl EthAddress {
    pub fn parse(s: &str) -> Result<Self, String> {
        decode_fixed::<20>(s).map(Self)
    }

    /// Ethereum address embedding an actor ID.
    pub fn from_actor_id(id: ActorId) -> Self {
        let mut bytes = [0u8; 20];
        bytes[..12].copy_from_slice(&MASKED_ID_PREFIX);
        bytes[12..].copy_from_slice(&id.to_be_bytes());
        Self(bytes)
    }

    pub fn is_masked_id(&self) -> bool {
        self.0[..12] == MASKED_ID_PREFIX
    }

    pub fn to_chain_address(&self) -> Address {
        if self.is_masked_id() {
            let mut id = [0u8; 8];
            id.copy_from_slice(&self.0[12..]);
            Address::Id(u64::from_be_bytes(id))
        } else {
            Address::Delegated {
                namespace: EAM_NAMESPACE,
                sub_address: self.0.to_vec(),
            }
        }
    }

    pub fn from_chain_address(addr: &Address) -> Result<Self, ChainError> {
        match addr {
            Address::Id(id) => Ok(Self::from_actor_id(*id)),
            Address::Delegated {
                namespace,
                sub_address,
            } if *namespace == EAM_NAMESPACE => sub_address
                .as_slice()
                .try_into()
                .map(Self)
                .map_err(|_| ChainError::InvalidAddress(addr.to_string())),
            _ => Err(ChainError::InvalidAddress(addr.to_string())),
        }
    }
}

impl fmt::Display for EthAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

/// Hex-encoded quantity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct EthUint64(pub u64);

impl EthUint64 {
    pub fn parse(s: &str) -> Result<Self, String> {
        let digits = s
            .strip_prefix("0x")
            .ok_or_else(|| format!("{s} is not 0x-prefixed hex"))?;
        u64::from_str_radix(digits, 16)
            .map(Self)
            .map_err(|e| format!("invalid quantity {s}: {e}"))
    }
}

impl fmt::Display for EthUint64 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

/// Arbitrary byte string.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EthBytes(pub Vec<u8>);

impl fmt::Display for EthBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(&self.0))
    }
}

macro_rules! hex_serde {
    ($ty:ident, $parse:expr) => {
        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                ($parse)(&s).map_err(de::Error::custom)
            }
        }
    };
}

hex_serde!(EthHash, EthHash::parse);
hex_serde!(EthAddress, EthAddress::parse);
hex_serde!(EthUint64, EthUint64::parse);
hex_serde!(EthBytes, |s: &str| decode_prefixed(s).map(EthBytes));

/// One or many values; JSON accepts either a scalar or an array.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    None,
    One(T),
    Many(Vec<T>),
}

impl<T> Default for OneOrMany<T> {
    fn default() -> Self {
        OneOrMany::None
    }
}

impl<T: Clone> OneOrMany<T> {
    pub fn to_vec(&self) -> Vec<T> {
        match self {
            OneOrMany::None => Vec::new(),
            OneOrMany::One(v) => vec![v.clone()],
            OneOrMany::Many(vs) => vs.clone(),
        }
    }
}

/// Address constraint of a filter spec.
pub type EthAddressList = OneOrMany<EthAddress>;

/// Allowed values of one topic slot; empty is a wildcard.
pub type EthHashList = OneOrMany<EthHash>;

/// Positional topic constraints. A `null` slot is a wildcard.
pub type EthTopicSpec = Vec<Option<EthHashList>>;

/// Client-supplied log filter.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EthFilterSpec {
    pub from_block: Option<String>,
    pub to_block: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub address: EthAddressList,
    #[serde(deserialize_with = "null_as_default")]
    pub topics: EthTopicSpec,
    pub block_hash: Option<EthHash>,
}

/// A log record as returned to clients.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EthLog {
    pub address: EthAddress,
    pub data: EthBytes,
    pub topics: Vec<EthHash>,
    pub removed: bool,
    pub log_index: EthUint64,
    pub transaction_index: EthUint64,
    pub transaction_hash: EthHash,
    pub block_hash: EthHash,
    pub block_number: EthUint64,
}

/// Block record composed from a tipset.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EthBlock {
    pub hash: EthHash,
    pub parent_hash: EthHash,
    pub number: EthUint64,
    pub timestamp: EthUint64,
    pub transactions: Vec<EthHash>,
}

/// Result of a filter poll or a log query.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EthFilterResult {
    Logs(Vec<EthLog>),
    Hashes(Vec<EthHash>),
}

impl EthFilterResult {
    pub fn len(&self) -> usize {
        match self {
            EthFilterResult::Logs(logs) => logs.len(),
            EthFilterResult::Hashes(hashes) => hashes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Optional criteria of a `logs` subscription.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EthSubscriptionParams {
    #[serde(deserialize_with = "null_as_default")]
    pub address: EthAddressList,
    #[serde(deserialize_with = "null_as_default")]
    pub topics: EthTopicSpec,
}

/// Subscription event types.
pub mod event_type {
    pub const NEW_HEADS: &str = "newHeads";
    pub const LOGS: &str = "logs";
    pub const PENDING_TRANSACTIONS: &str = "newPendingTransactions";
}

/// Request to open a subscription.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EthSubscribeParams {
    pub event_type: String,
    #[serde(default)]
    pub params: Option<EthSubscriptionParams>,
}

impl EthSubscribeParams {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            params: None,
        }
    }

    pub fn with_params(mut self, params: EthSubscriptionParams) -> Self {
        self.params = Some(params);
        self
    }
}

/// Envelope of every payload pushed to a subscriber.
#[derive(Serialize)]
pub struct EthSubscriptionResponse<'a, T: Serialize> {
    pub subscription: SubscriptionId,
    pub result: &'a T,
}
