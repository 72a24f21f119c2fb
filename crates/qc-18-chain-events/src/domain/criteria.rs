//! Matching criteria shared by event filters and historical queries.

use super::types::{Address, ChainEpoch, Cid, EventEntry, TipSetKey};
use crate::error::{EventError, EventResult};
use std::collections::{BTreeMap, HashSet};

/// Height value meaning "no bound"; an open upper bound follows the head.
pub const OPEN_BOUND: ChainEpoch = -1;

/// A value an entry must carry, together with the codec it must be encoded in.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct KeyValue {
    pub codec: u64,
    pub value: Vec<u8>,
}

impl KeyValue {
    pub fn new(codec: u64, value: Vec<u8>) -> Self {
        Self { codec, value }
    }
}

/// Where on the chain a filter looks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scope {
    /// Inclusive height range; either bound may be [`OPEN_BOUND`].
    Range { min: ChainEpoch, max: ChainEpoch },
    /// Exactly one tipset, identified by the CID of its key.
    TipSet(Cid),
}

/// Criteria an event must satisfy to be collected.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MatchCriteria {
    scope: Scope,
    addresses: HashSet<Address>,
    keys: BTreeMap<String, Vec<KeyValue>>,
}

impl MatchCriteria {
    /// Build criteria from raw bounds. A tipset scope excludes explicit heights.
    pub fn new(
        min_height: ChainEpoch,
        max_height: ChainEpoch,
        tipset_cid: Option<Cid>,
    ) -> EventResult<Self> {
        let scope = match tipset_cid {
            Some(cid) => {
                if min_height != OPEN_BOUND || max_height != OPEN_BOUND {
                    return Err(EventError::invalid_spec(
                        "cannot specify both a tipset and a height range",
                    ));
                }
                Scope::TipSet(cid)
            }
            None => {
                if min_height < OPEN_BOUND || max_height < OPEN_BOUND {
                    return Err(EventError::invalid_spec(format!(
                        "invalid height bounds {min_height}..{max_height}"
                    )));
                }
                Scope::Range {
                    min: min_height,
                    max: max_height,
                }
            }
        };

        Ok(Self {
            scope,
            addresses: HashSet::new(),
            keys: BTreeMap::new(),
        })
    }

    /// Criteria tracking the live head with no lower bound.
    pub fn live() -> Self {
        Self {
            scope: Scope::Range {
                min: OPEN_BOUND,
                max: OPEN_BOUND,
            },
            addresses: HashSet::new(),
            keys: BTreeMap::new(),
        }
    }

    pub fn with_addresses(mut self, addresses: impl IntoIterator<Item = Address>) -> Self {
        self.addresses.extend(addresses);
        self
    }

    /// Empty value lists are wildcards and are not stored.
    pub fn with_keys(mut self, keys: BTreeMap<String, Vec<KeyValue>>) -> Self {
        self.keys
            .extend(keys.into_iter().filter(|(_, values)| !values.is_empty()));
        self
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn tipset_cid(&self) -> Option<Cid> {
        match self.scope {
            Scope::TipSet(cid) => Some(cid),
            Scope::Range { .. } => None,
        }
    }

    pub fn min_height(&self) -> ChainEpoch {
        match self.scope {
            Scope::Range { min, .. } => min,
            Scope::TipSet(_) => OPEN_BOUND,
        }
    }

    pub fn max_height(&self) -> ChainEpoch {
        match self.scope {
            Scope::Range { max, .. } => max,
            Scope::TipSet(_) => OPEN_BOUND,
        }
    }

    pub fn addresses(&self) -> &HashSet<Address> {
        &self.addresses
    }

    pub fn keys(&self) -> &BTreeMap<String, Vec<KeyValue>> {
        &self.keys
    }

    /// True when the criteria reach tipsets already behind `head`, so results
    /// must come from the historical index.
    pub fn is_historic(&self, head: ChainEpoch) -> bool {
        match self.scope {
            Scope::TipSet(_) => true,
            Scope::Range { min, .. } => min != OPEN_BOUND && min < head,
        }
    }

    /// Height or tipset check for events executed in the tipset `key` at `height`.
    pub fn matches_tipset(&self, height: ChainEpoch, key: &TipSetKey) -> bool {
        match self.scope {
            Scope::TipSet(cid) => key.cid() == cid,
            Scope::Range { min, max } => {
                if min != OPEN_BOUND && height < min {
                    return false;
                }
                if max != OPEN_BOUND && height > max {
                    return false;
                }
                true
            }
        }
    }

    pub fn matches_address(&self, emitter: &Address) -> bool {
        self.addresses.is_empty() || self.addresses.contains(emitter)
    }

    /// Every key constraint must be satisfied by some indexed entry with the
    /// same key, value and codec. A missing key is a rejection.
    pub fn matches_keys(&self, entries: &[EventEntry]) -> bool {
        if self.keys.is_empty() {
            return true;
        }

        let mut matched: HashSet<&str> = HashSet::with_capacity(self.keys.len());
        for entry in entries.iter().filter(|e| e.is_indexed()) {
            if matched.contains(entry.key.as_str()) {
                continue;
            }
            let Some(wanted) = self.keys.get(&entry.key) else {
                continue;
            };
            if wanted
                .iter()
                .any(|w| w.codec == entry.codec && w.value == entry.value)
            {
                matched.insert(entry.key.as_str());
                if matched.len() == self.keys.len() {
                    return true;
                }
            }
        }
        false
    }

    pub fn matches_event(&self, emitter: &Address, entries: &[EventEntry]) -> bool {
        self.matches_address(emitter) && self.matches_keys(entries)
    }
}
