//! Resolution of client block tags into filter height bounds.

use super::criteria::OPEN_BOUND;
use super::eth::EthUint64;
use super::types::ChainEpoch;
use crate::error::{EventError, EventResult};

const LATEST: &str = "latest";
const EARLIEST: &str = "earliest";

fn parse_height(tag: &str, field: &str) -> EventResult<ChainEpoch> {
    if !tag.starts_with("0x") {
        return Err(EventError::invalid_spec(format!("{field} is not a hex")));
    }
    let EthUint64(height) =
        EthUint64::parse(tag).map_err(|_| EventError::invalid_spec("invalid epoch"))?;
    ChainEpoch::try_from(height).map_err(|_| EventError::invalid_spec("invalid epoch"))
}

/// Turn `fromBlock`/`toBlock` tags into `(min, max)` heights.
///
/// An absent or `latest` lower bound pins to `heaviest`; an absent or `latest`
/// upper bound stays open ([`OPEN_BOUND`]) and follows the head. The span is
/// checked against `max_range`, using `heaviest` for whichever end is open.
pub fn parse_block_range(
    heaviest: ChainEpoch,
    from_block: Option<&str>,
    to_block: Option<&str>,
    max_range: ChainEpoch,
) -> EventResult<(ChainEpoch, ChainEpoch)> {
    let min_height = match from_block {
        None | Some("") | Some(LATEST) => heaviest,
        Some(EARLIEST) => 0,
        Some(tag) => parse_height(tag, "FromBlock")?,
    };

    let max_height = match to_block {
        None | Some("") | Some(LATEST) => OPEN_BOUND,
        Some(EARLIEST) => 0,
        Some(tag) => parse_height(tag, "ToBlock")?,
    };

    if min_height == OPEN_BOUND && max_height > 0 {
        if max_height - heaviest > max_range {
            return Err(EventError::invalid_spec(format!(
                "invalid epoch range: to block is too far in the future (maximum: {max_range})"
            )));
        }
    } else if min_height >= 0 && max_height == OPEN_BOUND {
        if heaviest - min_height > max_range {
            return Err(EventError::invalid_spec(format!(
                "invalid epoch range: from block is too far in the past (maximum: {max_range})"
            )));
        }
    } else if min_height >= 0 && max_height >= 0 {
        if min_height > max_height {
            return Err(EventError::invalid_spec(format!(
                "invalid epoch range: to block ({max_height}) must be after from block ({min_height})"
            )));
        }
        if max_height - min_height > max_range {
            return Err(EventError::invalid_spec(format!(
                "invalid epoch range: range between to and from blocks is too large (maximum: {max_range})"
            )));
        }
    }

    Ok((min_height, max_height))
}
