//! Configuration of a pipeline run.

use crate::{PipelineError, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::{fmt, path::PathBuf, str::FromStr, time::Duration};

/// The default number of parallel fetchers.
pub const DEFAULT_FETCHERS: usize = 5;

/// The default number of transactions used to warm up the zlib window.
pub const DEFAULT_BOOTSTRAP_TRANSACTIONS: u64 = 1000;

/// The default capacity of the job queue between the fetchers and the estimator.
pub const DEFAULT_JOB_CAPACITY: usize = 20;

/// The default capacity of the result queue between the estimator and the writer.
pub const DEFAULT_RESULT_CAPACITY: usize = 1000;

/// Block numbers queued per fetcher when no explicit capacity is configured.
pub const BLOCK_NUMBERS_PER_FETCHER: usize = 10;

/// The default interval between progress reports.
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_secs(10);

/// The default output path.
pub const DEFAULT_OUTPUT: &str = "./data/fastlz.bin";

/// The first block of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StartBlock {
    /// The head of the block source when the run starts.
    #[default]
    Latest,
    /// An explicit block number.
    Number(u64),
}

impl FromStr for StartBlock {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("latest") {
            return Ok(Self::Latest);
        }
        s.parse::<u64>().map(Self::Number).map_err(|e| {
            PipelineError::InvalidConfig(format!("start block must be a number or `latest`: {e}"))
        })
    }
}

impl fmt::Display for StartBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Latest => f.write_str("latest"),
            Self::Number(n) => write!(f, "{n}"),
        }
    }
}

/// The order in which fetched blocks are fed to the estimator.
///
/// The zlib window carries history from one transaction to the next, so the estimates depend
/// on this order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArrivalOrder {
    /// Blocks are estimated as soon as any fetcher delivers them. Results can differ from one
    /// run to the next.
    #[default]
    Arrival,
    /// Blocks are buffered and estimated in descending block number order.
    Sorted,
}

impl FromStr for ArrivalOrder {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "arrival" => Ok(Self::Arrival),
            "sorted" => Ok(Self::Sorted),
            other => Err(PipelineError::InvalidConfig(format!(
                "unknown arrival order `{other}`, expected `arrival` or `sorted`"
            ))),
        }
    }
}

impl fmt::Display for ArrivalOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Arrival => f.write_str("arrival"),
            Self::Sorted => f.write_str("sorted"),
        }
    }
}

/// The configuration of a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// The first block to process.
    pub start: StartBlock,
    /// The exclusive lower bound of the range. Blocks are processed from `start` down to
    /// `stop + 1`.
    pub stop: u64,
    /// The number of parallel fetchers, each with its own connection.
    pub fetchers: usize,
    /// The retry policy applied to every block fetch.
    pub retry: RetryPolicy,
    /// The number of transactions fed to the zlib window before results are emitted.
    pub bootstrap_transactions: u64,
    /// Whether to strip the 68 byte signature suffix from every transaction.
    pub trim_signature: bool,
    /// The order in which blocks are fed to the estimator.
    pub order: ArrivalOrder,
    /// An optional delay between two dispatched block numbers.
    pub dispatch_delay: Option<Duration>,
    /// The capacity of the block number queue. Defaults to ten slots per fetcher.
    pub block_number_capacity: Option<usize>,
    /// The capacity of the job queue.
    pub job_capacity: usize,
    /// The capacity of the result queue.
    pub result_capacity: usize,
    /// The interval between progress reports.
    pub progress_interval: Duration,
    /// The output file.
    pub output: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            start: StartBlock::default(),
            stop: 0,
            fetchers: DEFAULT_FETCHERS,
            retry: RetryPolicy::default(),
            bootstrap_transactions: DEFAULT_BOOTSTRAP_TRANSACTIONS,
            trim_signature: false,
            order: ArrivalOrder::default(),
            dispatch_delay: None,
            block_number_capacity: None,
            job_capacity: DEFAULT_JOB_CAPACITY,
            result_capacity: DEFAULT_RESULT_CAPACITY,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            output: PathBuf::from(DEFAULT_OUTPUT),
        }
    }
}

impl PipelineConfig {
    /// Returns the capacity of the block number queue.
    pub fn block_number_capacity(&self) -> usize {
        self.block_number_capacity
            .unwrap_or_else(|| self.fetchers.saturating_mul(BLOCK_NUMBERS_PER_FETCHER))
    }

    /// Checks that the configuration describes a runnable pipeline.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.fetchers == 0 {
            return Err(PipelineError::InvalidConfig("at least one fetcher is required".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(PipelineError::InvalidConfig("at least one fetch attempt is required".into()));
        }
        if self.block_number_capacity() == 0 || self.job_capacity == 0 || self.result_capacity == 0
        {
            return Err(PipelineError::InvalidConfig("queue capacities must be positive".into()));
        }
        if let StartBlock::Number(start) = self.start {
            if start <= self.stop {
                return Err(PipelineError::InvalidConfig(format!(
                    "start block {start} must be above the stop block {}",
                    self.stop
                )));
            }
        }
        Ok(())
    }
}
