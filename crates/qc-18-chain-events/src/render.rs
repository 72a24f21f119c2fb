//! Rendering of collected items into client-facing results.

use tracing::debug;

use crate::domain::{eth_log_from_event, CollectedEvent, EthHash, EthLog, SignedMessage, TipSetKey};
use crate::error::EventResult;
use crate::metrics::EventMetrics;
use crate::ports::MessageStore;

/// Render events as logs. Undecodable events and events whose message has
/// been garbage collected are left out.
pub(crate) async fn logs_from_events(
    events: &[CollectedEvent],
    messages: &dyn MessageStore,
    metrics: &EventMetrics,
) -> EventResult<Vec<EthLog>> {
    let mut logs = Vec::with_capacity(events.len());
    for event in events {
        let Some(mut log) = eth_log_from_event(event) else {
            EventMetrics::incr(&metrics.events_malformed);
            continue;
        };

        match messages.tx_hash_from_message_cid(&event.msg_cid).await? {
            Some(hash) => log.transaction_hash = hash,
            None => {
                debug!(msg_cid = %event.msg_cid, "Message no longer available, skipping log");
                continue;
            }
        }

        logs.push(log);
    }
    Ok(logs)
}

pub(crate) fn hashes_from_tipsets(keys: &[TipSetKey]) -> Vec<EthHash> {
    keys.iter().map(|k| EthHash::from_cid(&k.cid())).collect()
}

pub(crate) fn hashes_from_messages(
    pending: &[SignedMessage],
    messages: &dyn MessageStore,
) -> EventResult<Vec<EthHash>> {
    pending
        .iter()
        .map(|m| messages.tx_hash_from_signed_message(m).map_err(Into::into))
        .collect()
}
