//! The range coordinator: resolves the starting block and dispatches the block numbers of the
//! range in descending order.

use crate::{PipelineError, StartBlock};
use alloy_eips::BlockNumberOrTag;
use dacost_providers::BlockSource;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Returns the block numbers from `start` down to `stop + 1`.
pub fn block_range(start: u64, stop: u64) -> impl DoubleEndedIterator<Item = u64> {
    (stop.saturating_add(1)..=start).rev()
}

/// Resolves the starting block number with a single query to `source`.
///
/// An explicit number is fetched as well, so a block the source does not know fails the run
/// before anything is dispatched.
pub async fn resolve_start<S: BlockSource>(
    source: &mut S,
    start: StartBlock,
) -> Result<u64, PipelineError> {
    let tag = match start {
        StartBlock::Latest => BlockNumberOrTag::Latest,
        StartBlock::Number(n) => BlockNumberOrTag::Number(n),
    };
    let block = source.block_by_number(tag).await.map_err(PipelineError::StartBlock)?;
    info!(target: "coordinator", "Starting from block {}", block.number);
    Ok(block.number)
}

/// Pushes the block numbers from `start` down to `stop + 1` into `numbers`, waiting for free
/// queue slots. Returns the number of blocks dispatched.
///
/// Dispatch stops early when `cancel` fires or all fetchers are gone. The queue is closed on
/// return by dropping `numbers`.
pub async fn dispatch(
    start: u64,
    stop: u64,
    delay: Option<Duration>,
    numbers: mpsc::Sender<u64>,
    cancel: CancellationToken,
) -> u64 {
    if start <= stop {
        warn!(target: "coordinator", "Start block {start} is not above stop block {stop}, nothing to do");
        return 0;
    }
    info!(target: "coordinator", "Dispatching blocks {start} down to {}", stop + 1);

    let mut dispatched = 0;
    for number in block_range(start, stop) {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!(target: "coordinator", "Cancelled before dispatching block {number}");
                break;
            }
            sent = numbers.send(number) => {
                if sent.is_err() {
                    debug!(target: "coordinator", "Block number queue closed at block {number}");
                    break;
                }
            }
        }
        dispatched += 1;

        if let Some(delay) = delay {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    debug!(target: "coordinator", "Dispatched {dispatched} blocks");
    dispatched
}
