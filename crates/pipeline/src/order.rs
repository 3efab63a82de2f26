//! Reordering of fetched blocks into the coordinator's dispatch order.

use crate::{coordinator::block_range, FetchOutcome};
use dacost_providers::Block;
use std::collections::BTreeMap;
use tracing::{trace, warn};

/// Buffers fetch outcomes and releases blocks in descending block number order.
///
/// Dropped blocks are skipped once their turn comes, so a dropped block never stalls the
/// buffer. Blocks fetched ahead of a slow one are held until it arrives.
#[derive(Debug)]
pub struct ReorderBuffer {
    /// The next block number to release, or [None] once the range is exhausted.
    next: Option<u64>,
    /// The exclusive lower bound of the range.
    stop: u64,
    /// Outcomes waiting for their turn. Dropped blocks are held as [None].
    pending: BTreeMap<u64, Option<Block>>,
}

impl ReorderBuffer {
    /// Creates a buffer for the range `start` down to `stop + 1`.
    pub fn new(start: u64, stop: u64) -> Self {
        Self { next: block_range(start, stop).next(), stop, pending: BTreeMap::new() }
    }

    /// Accepts an outcome and returns the blocks that are now released, in order.
    pub fn push(&mut self, outcome: FetchOutcome) -> Vec<Block> {
        let number = outcome.number();
        if self.next.map_or(true, |next| number > next) || number <= self.stop {
            warn!(target: "estimator", "Ignoring block {number} outside of the pending range");
            return Vec::new();
        }

        let entry = match outcome {
            FetchOutcome::Fetched(block) => Some(block),
            FetchOutcome::Dropped(_) => None,
        };
        if self.pending.insert(number, entry).is_some() {
            warn!(target: "estimator", "Received block {number} twice, keeping the latest");
        }

        let mut released = Vec::new();
        while let Some(next) = self.next {
            let Some(entry) = self.pending.remove(&next) else { break };
            if let Some(block) = entry {
                released.push(block);
            } else {
                trace!(target: "estimator", "Skipping dropped block {next}");
            }
            self.next = next.checked_sub(1).filter(|n| *n > self.stop);
        }
        released
    }

    /// Returns the number of outcomes waiting for an earlier block.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Returns true once every block of the range was released or skipped.
    pub const fn is_complete(&self) -> bool {
        self.next.is_none()
    }
}
