//! The fetcher pool. Every [Fetcher] owns its own block source connection and pulls block
//! numbers from a queue shared with the other fetchers.

use crate::{inc, retry::RetryStep, RetryPolicy};
use alloy_eips::BlockNumberOrTag;
use dacost_providers::{Block, BlockSource};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// The outcome of fetching one block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The block was fetched.
    Fetched(Block),
    /// The block could not be fetched within the retry policy and was dropped.
    Dropped(u64),
}

impl FetchOutcome {
    /// Returns the block number the outcome refers to.
    pub const fn number(&self) -> u64 {
        match self {
            Self::Fetched(block) => block.number,
            Self::Dropped(number) => *number,
        }
    }
}

/// The block number queue shared by the fetcher pool.
pub type SharedNumbers = Arc<Mutex<mpsc::Receiver<u64>>>;

/// A single fetcher of the pool.
#[derive(Debug)]
pub struct Fetcher<S> {
    id: usize,
    source: S,
    retry: RetryPolicy,
    cancel: CancellationToken,
}

impl<S: BlockSource> Fetcher<S> {
    /// Creates a new [Fetcher] over its own `source`.
    pub const fn new(id: usize, source: S, retry: RetryPolicy, cancel: CancellationToken) -> Self {
        Self { id, source, retry, cancel }
    }

    /// Fetches block `number`, retrying failures with the configured backoff.
    ///
    /// Returns [None] if the run was cancelled while waiting to retry.
    pub async fn fetch(&mut self, number: u64) -> Option<FetchOutcome> {
        let mut backoff = self.retry.backoff(self.cancel.clone());
        loop {
            let err = match self.source.block_by_number(BlockNumberOrTag::Number(number)).await {
                Ok(block) => {
                    inc!(BLOCKS_FETCHED);
                    return Some(FetchOutcome::Fetched(block));
                }
                Err(err) => err,
            };

            debug!(
                target: "fetcher",
                "Fetcher {}: attempt {} for block {number} failed: {err}",
                self.id,
                backoff.attempt()
            );
            match backoff.wait().await {
                RetryStep::Retry => {
                    inc!(FETCH_RETRIES);
                }
                RetryStep::Exhausted => {
                    warn!(
                        target: "fetcher",
                        "Fetcher {}: dropping block {number} after {} attempts: {err}",
                        self.id,
                        backoff.attempt()
                    );
                    inc!(BLOCKS_DROPPED);
                    return Some(FetchOutcome::Dropped(number));
                }
                RetryStep::Cancelled => {
                    info!(target: "fetcher", "Fetcher {}: abandoning block {number}", self.id);
                    return None;
                }
            }
        }
    }

    /// Pulls block numbers from `numbers` until the queue is drained, the job queue closes or the
    /// run is cancelled, pushing every outcome into `jobs`. Closes the source on return.
    pub async fn run(mut self, numbers: SharedNumbers, jobs: mpsc::Sender<FetchOutcome>) {
        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                number = async { numbers.lock().await.recv().await } => number,
            };
            let Some(number) = next else { break };

            let Some(outcome) = self.fetch(number).await else { break };
            if jobs.send(outcome).await.is_err() {
                debug!(target: "fetcher", "Fetcher {}: job queue closed", self.id);
                break;
            }
        }
        self.source.close().await;
        debug!(target: "fetcher", "Fetcher {} stopped", self.id);
    }
}
