//! Domain layer: chain data model, wire types and pure filter logic.

pub mod block_range;
pub mod config;
pub mod criteria;
pub mod eth;
pub mod filter_spec;
pub mod ids;
pub mod log;
pub mod types;

pub use block_range::parse_block_range;
pub use config::{ConfigError, EventsConfig};
pub use criteria::{KeyValue, MatchCriteria, Scope, OPEN_BOUND};
pub use eth::{
    event_type, EthAddress, EthAddressList, EthBlock, EthBytes, EthFilterResult, EthFilterSpec,
    EthHash, EthHashList, EthLog, EthSubscribeParams, EthSubscriptionParams,
    EthSubscriptionResponse, EthTopicSpec, EthUint64, OneOrMany,
};
pub use filter_spec::{
    keys_to_keys_with_codec, parse_eth_topics, parse_filter_spec, parse_subscription_params,
    MAX_TOPICS,
};
pub use ids::{FilterId, SubscriptionId};
pub use log::{decode_log_entries, eth_log_from_event};
pub use types::{
    flags, ActorEvent, ActorId, Address, ChainEpoch, Cid, CollectedEvent, EventEntry,
    ExecutedMessage, MpoolUpdate, MpoolUpdateKind, SigType, SignedMessage, TipSet, TipSetKey,
    Timestamp, EAM_NAMESPACE, RAW_CODEC,
};
