//! Decoding of collected events into log records.

use super::eth::{EthAddress, EthBytes, EthHash, EthLog, EthUint64};
use super::filter_spec::MAX_TOPICS;
use super::types::{CollectedEvent, EventEntry, RAW_CODEC};
use tracing::warn;

/// Split raw entries into `(data, topics)`.
///
/// Returns `None` when the event cannot be represented as a log: a non-raw
/// entry, a topic that is not 32 bytes, a repeated topic slot, a second data
/// entry, or a gap in the topic slots. Unknown keys are skipped.
pub fn decode_log_entries(entries: &[EventEntry]) -> Option<(Vec<u8>, Vec<EthHash>)> {
    let mut found = [false; MAX_TOPICS];
    let mut found_count = 0usize;
    let mut topics: Vec<EthHash> = Vec::with_capacity(MAX_TOPICS);
    let mut data: Option<&[u8]> = None;

    for entry in entries {
        if entry.codec != RAW_CODEC {
            return None;
        }

        match topic_slot(&entry.key) {
            Some(idx) => {
                let Ok(topic) = <[u8; 32]>::try_from(entry.value.as_slice()) else {
                    warn!(key = %entry.key, size = entry.value.len(), "event topic has an invalid size");
                    return None;
                };
                if found[idx] {
                    warn!(key = %entry.key, "duplicate event topic");
                    return None;
                }
                found[idx] = true;
                found_count += 1;

                if topics.len() <= idx {
                    topics.resize(idx + 1, EthHash::default());
                }
                topics[idx] = EthHash(topic);
            }
            None if entry.key == "d" => {
                if data.is_some() {
                    warn!("duplicate event data");
                    return None;
                }
                data = Some(entry.value.as_slice());
            }
            None => {
                warn!(key = %entry.key, "unexpected event entry");
            }
        }
    }

    if topics.len() != found_count {
        warn!(
            expected = topics.len(),
            actual = found_count,
            "event topic length mismatch"
        );
        return None;
    }

    Some((data.map(<[u8]>::to_vec).unwrap_or_default(), topics))
}

/// `t1`..`t4` map to slots 0..3.
fn topic_slot(key: &str) -> Option<usize> {
    match key.as_bytes() {
        [b't', n @ b'1'..=b'4'] => Some(usize::from(n - b'1')),
        _ => None,
    }
}

/// Render a collected event, leaving the transaction hash for the caller to
/// resolve. `None` drops the event from results.
pub fn eth_log_from_event(event: &CollectedEvent) -> Option<EthLog> {
    let (data, topics) = decode_log_entries(&event.entries)?;

    let address = match EthAddress::from_chain_address(&event.emitter_addr) {
        Ok(address) => address,
        Err(e) => {
            warn!(emitter = %event.emitter_addr, error = %e, "cannot render event emitter");
            return None;
        }
    };

    Some(EthLog {
        address,
        data: EthBytes(data),
        topics,
        removed: event.reverted,
        log_index: EthUint64(event.event_idx),
        transaction_index: EthUint64(event.msg_idx),
        transaction_hash: EthHash::default(),
        block_hash: EthHash::from_cid(&event.tipset_key.cid()),
        block_number: EthUint64(event.height.max(0) as u64),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{Address, Cid, TipSetKey};

    fn t(key: &str, byte: u8) -> EventEntry {
        EventEntry::raw(key, vec![byte; 32])
    }

    #[test]
    fn test_decodes_topics_and_data() {
        let entries = vec![t("t2", 2), t("t1", 1), EventEntry::raw("d", vec![0xaa, 0xbb])];
        let (data, topics) = decode_log_entries(&entries).unwrap();
        assert_eq!(data, vec![0xaa, 0xbb]);
        assert_eq!(topics, vec![EthHash([1; 32]), EthHash([2; 32])]);
    }

    #[test]
    fn test_rejects_topic_gap() {
        assert!(decode_log_entries(&[t("t1", 1), t("t3", 3)]).is_none());
    }

    #[test]
    fn test_rejects_bad_topic_size() {
        let short = EventEntry::raw("t1", vec![1; 31]);
        assert!(decode_log_entries(&[short]).is_none());
    }

    #[test]
    fn test_rejects_duplicates() {
        assert!(decode_log_entries(&[t("t1", 1), t("t1", 2)]).is_none());
        let d = EventEntry::raw("d", vec![1]);
        assert!(decode_log_entries(&[d.clone(), d]).is_none());
    }

    #[test]
    fn test_rejects_non_raw_codec() {
        let mut entry = t("t1", 1);
        entry.codec = 0x51;
        assert!(decode_log_entries(&[entry]).is_none());
    }

    #[test]
    fn test_unknown_keys_skipped() {
        let entries = vec![
            t("t1", 1),
            EventEntry::raw("t5", vec![0; 32]),
            EventEntry::raw("x", vec![]),
        ];
        let (data, topics) = decode_log_entries(&entries).unwrap();
        assert!(data.is_empty());
        assert_eq!(topics.len(), 1);
    }

    #[test]
    fn test_log_from_event() {
        let key = TipSetKey::new(vec![Cid::digest(b"b")]);
        let event = CollectedEvent {
            entries: vec![t("t1", 1)],
            emitter_addr: Address::Id(99),
            event_idx: 3,
            reverted: true,
            height: 12,
            tipset_key: key.clone(),
            msg_idx: 1,
            msg_cid: Cid::digest(b"m"),
        };
        let log = eth_log_from_event(&event).unwrap();
        assert_eq!(log.address, EthAddress::from_actor_id(99));
        assert!(log.removed);
        assert_eq!(log.log_index, EthUint64(3));
        assert_eq!(log.block_number, EthUint64(12));
        assert_eq!(log.block_hash, EthHash::from_cid(&key.cid()));
    }

    #[test]
    fn test_unrenderable_emitter_dropped() {
        let event = CollectedEvent {
            entries: vec![],
            emitter_addr: Address::Delegated {
                namespace: 32,
                sub_address: vec![1; 20],
            },
            event_idx: 0,
            reverted: false,
            height: 1,
            tipset_key: TipSetKey::default(),
            msg_idx: 0,
            msg_cid: Cid::default(),
        };
        assert!(eth_log_from_event(&event).is_none());
    }
}
