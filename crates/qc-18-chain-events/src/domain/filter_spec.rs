//! Translation of client filter specs into [`MatchCriteria`].

use super::block_range::parse_block_range;
use super::criteria::{KeyValue, MatchCriteria, OPEN_BOUND};
use super::eth::{EthAddressList, EthFilterSpec, EthSubscriptionParams, EthTopicSpec};
use super::types::{Address, ChainEpoch, RAW_CODEC};
use crate::error::{EventError, EventResult};
use std::collections::BTreeMap;

/// Number of positional topic slots a log carries.
pub const MAX_TOPICS: usize = 4;

/// Map topic slots to entry keys. Slot `i` becomes `t{i+1}`; wildcard slots
/// produce no constraint.
pub fn parse_eth_topics(topics: &EthTopicSpec) -> EventResult<BTreeMap<String, Vec<Vec<u8>>>> {
    if topics.len() > MAX_TOPICS {
        return Err(EventError::invalid_spec(format!(
            "too many topics: {} (maximum: {MAX_TOPICS})",
            topics.len()
        )));
    }

    let mut keys = BTreeMap::new();
    for (idx, slot) in topics.iter().enumerate() {
        let values = slot.as_ref().map(|s| s.to_vec()).unwrap_or_default();
        if values.is_empty() {
            continue;
        }
        keys.insert(
            format!("t{}", idx + 1),
            values.into_iter().map(|h| h.0.to_vec()).collect(),
        );
    }
    Ok(keys)
}

/// Contract events are always raw-encoded, so every value is stamped with
/// the raw codec.
pub fn keys_to_keys_with_codec(
    keys: BTreeMap<String, Vec<Vec<u8>>>,
) -> BTreeMap<String, Vec<KeyValue>> {
    keys.into_iter()
        .map(|(key, values)| {
            let values = values
                .into_iter()
                .map(|value| KeyValue::new(RAW_CODEC, value))
                .collect();
            (key, values)
        })
        .collect()
}

pub fn parse_addresses(addresses: &EthAddressList) -> Vec<Address> {
    addresses
        .to_vec()
        .iter()
        .map(|a| a.to_chain_address())
        .collect()
}

/// Resolve a full filter spec against the current head.
pub fn parse_filter_spec(
    spec: &EthFilterSpec,
    heaviest: ChainEpoch,
    max_range: ChainEpoch,
) -> EventResult<MatchCriteria> {
    let criteria = match spec.block_hash {
        Some(hash) => {
            if spec.from_block.is_some() || spec.to_block.is_some() {
                return Err(EventError::invalid_spec(
                    "must not specify block hash and from/to block",
                ));
            }
            MatchCriteria::new(OPEN_BOUND, OPEN_BOUND, Some(hash.to_cid()))?
        }
        None => {
            let (min, max) = parse_block_range(
                heaviest,
                spec.from_block.as_deref(),
                spec.to_block.as_deref(),
                max_range,
            )?;
            MatchCriteria::new(min, max, None)?
        }
    };

    let keys = parse_eth_topics(&spec.topics)?;
    Ok(criteria
        .with_addresses(parse_addresses(&spec.address))
        .with_keys(keys_to_keys_with_codec(keys)))
}

/// Criteria for a `logs` subscription: always live, never historic.
pub fn parse_subscription_params(
    params: Option<&EthSubscriptionParams>,
) -> EventResult<MatchCriteria> {
    let Some(params) = params else {
        return Ok(MatchCriteria::live());
    };
    let keys = parse_eth_topics(&params.topics)?;
    Ok(MatchCriteria::live()
        .with_addresses(parse_addresses(&params.address))
        .with_keys(keys_to_keys_with_codec(keys)))
}
