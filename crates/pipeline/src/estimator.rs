//! The estimator: the single, sequential consumer of fetched blocks.
//!
//! The zlib window carries compression history from one transaction to the next, so the
//! [Estimator] must only ever be driven by one task. It owns its [ZlibBatchEstimator] and is
//! moved onto a dedicated blocking thread by the pipeline.

use crate::{
    inc, set,
    transaction::{classify, trim_signature},
    EstimationResult, FetchOutcome, PipelineError, ReorderBuffer,
};
use dacost_compression::{flz_compress_len, CompressionError, ZlibBatchEstimator};
use dacost_providers::Block;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Counters kept by the [Estimator].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EstimatorStats {
    /// Blocks received from the fetchers.
    pub blocks_fetched: u64,
    /// Blocks the fetchers dropped after exhausting their retries.
    pub blocks_dropped: u64,
    /// Deposit transactions excluded from the estimates.
    pub deposits_skipped: u64,
    /// Transactions skipped because their encoding could not be classified.
    pub malformed_skipped: u64,
    /// Transactions used to warm up the zlib window.
    pub bootstrap_transactions: u64,
    /// Transactions that produced a result.
    pub estimated: u64,
}

/// Drives both compression estimators over every eligible transaction.
#[derive(Debug)]
pub struct Estimator {
    zlib: ZlibBatchEstimator,
    bootstrap: u64,
    trim_signature: bool,
    stats: EstimatorStats,
}

impl Estimator {
    /// Creates a new [Estimator] that warms up its zlib window with the first `bootstrap`
    /// transactions before emitting results.
    pub fn new(bootstrap: u64, trim_signature: bool) -> Self {
        Self { zlib: ZlibBatchEstimator::new(), bootstrap, trim_signature, stats: Default::default() }
    }

    /// Returns the counters collected so far.
    pub const fn stats(&self) -> EstimatorStats {
        self.stats
    }

    /// Returns true once the zlib window is warmed up.
    pub const fn is_bootstrapped(&self) -> bool {
        self.stats.bootstrap_transactions >= self.bootstrap
    }

    /// Estimates a single encoded transaction of block `number`.
    ///
    /// Returns [None] for deposits, malformed payloads and bootstrap transactions.
    pub fn estimate_transaction(
        &mut self,
        number: u64,
        payload: &[u8],
    ) -> Result<Option<EstimationResult>, CompressionError> {
        match classify(payload) {
            Ok(kind) if kind.is_deposit() => {
                self.stats.deposits_skipped += 1;
                inc!(TRANSACTIONS, &["deposit"]);
                return Ok(None);
            }
            Ok(_) => {}
            Err(err) => {
                warn!(target: "estimator", "Skipping malformed transaction in block {number}: {err}");
                self.stats.malformed_skipped += 1;
                inc!(TRANSACTIONS, &["malformed"]);
                return Ok(None);
            }
        }

        let payload = if self.trim_signature { trim_signature(payload) } else { payload };

        if !self.is_bootstrapped() {
            self.zlib.write(payload)?;
            self.stats.bootstrap_transactions += 1;
            inc!(TRANSACTIONS, &["bootstrap"]);
            if self.is_bootstrapped() {
                info!(
                    target: "estimator",
                    "Bootstrap complete after {} transactions",
                    self.stats.bootstrap_transactions
                );
            }
            return Ok(None);
        }

        let best = self.zlib.write(payload)?;
        let zeroes = payload.iter().filter(|b| **b == 0).count();
        let non_zeroes = payload.len() - zeroes;

        self.stats.estimated += 1;
        inc!(TRANSACTIONS, &["estimated"]);
        Ok(Some(EstimationResult {
            // The output format carries 32 bit block numbers.
            block_number: number as u32,
            best,
            fastlz: flz_compress_len(payload),
            zeroes: saturating_u32(zeroes),
            non_zeroes: saturating_u32(non_zeroes),
        }))
    }

    /// Estimates every transaction of `block`, in block order.
    pub fn process_block(&mut self, block: &Block) -> Result<Vec<EstimationResult>, CompressionError> {
        self.stats.blocks_fetched += 1;
        let mut results = Vec::with_capacity(block.transactions.len());
        for tx in &block.transactions {
            if let Some(result) = self.estimate_transaction(block.number, tx)? {
                results.push(result);
            }
        }
        debug!(
            target: "estimator",
            "Block {}: {} transactions, {} results",
            block.number,
            block.transactions.len(),
            results.len()
        );
        set!(WINDOW_ROTATIONS, self.zlib.rotations() as i64);
        Ok(results)
    }

    /// Consumes fetch outcomes until the job queue is closed and drained, pushing every result
    /// into `results`. With a `reorder` buffer, blocks are estimated in descending block order
    /// instead of arrival order.
    ///
    /// Must run on a blocking thread. A compression engine failure ends the run, since the
    /// window state is undefined afterwards.
    pub fn run(
        mut self,
        mut jobs: mpsc::Receiver<FetchOutcome>,
        results: mpsc::Sender<EstimationResult>,
        mut reorder: Option<ReorderBuffer>,
    ) -> Result<EstimatorStats, PipelineError> {
        while let Some(outcome) = jobs.blocking_recv() {
            let blocks = match (&mut reorder, outcome) {
                (Some(buffer), outcome) => {
                    if let FetchOutcome::Dropped(_) = outcome {
                        self.stats.blocks_dropped += 1;
                    }
                    buffer.push(outcome)
                }
                (None, FetchOutcome::Fetched(block)) => vec![block],
                (None, FetchOutcome::Dropped(_)) => {
                    self.stats.blocks_dropped += 1;
                    Vec::new()
                }
            };

            for block in blocks {
                let estimates = self.process_block(&block).map_err(|err| {
                    error!(
                        target: "estimator",
                        "Compression engine failed on block {}: {err}",
                        block.number
                    );
                    PipelineError::Compression(err)
                })?;
                for result in estimates {
                    if results.blocking_send(result).is_err() {
                        warn!(target: "estimator", "Result queue closed, stopping");
                        return Ok(self.stats);
                    }
                }
            }
        }

        if let Some(buffer) = reorder.filter(|b| !b.is_complete()) {
            warn!(
                target: "estimator",
                "Sorted estimation stopped early, {} fetched blocks never became ready",
                buffer.pending()
            );
        }
        debug!(target: "estimator", "Job queue drained");
        Ok(self.stats)
    }
}

fn saturating_u32(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{CollectingLayer, TraceStorage};
    use alloy_primitives::Bytes;
    use dacost_providers::test_utils::{block_with_transactions, raw_block, sample_transactions};
    use tracing::Level;
    use tracing_subscriber::layer::SubscriberExt;

    fn legacy_tx(seed: u8, len: usize) -> Bytes {
        let mut payload = vec![0xf8];
        payload.extend((0..len).map(|i| if i % 3 == 0 { 0 } else { seed.wrapping_add(i as u8) }));
        Bytes::from(payload)
    }

    fn deposit_tx() -> Bytes {
        Bytes::from(vec![0x7e, 0xf8, 0x01, 0x02, 0x03])
    }

    #[test]
    fn test_results_count_bytes() {
        let mut estimator = Estimator::new(0, false);
        let tx = legacy_tx(1, 120);
        let result = estimator.estimate_transaction(42, &tx).unwrap().unwrap();

        assert_eq!(result.block_number, 42);
        assert_eq!(result.payload_len(), tx.len() as u64);
        assert_eq!(result.zeroes as usize, tx.iter().filter(|b| **b == 0).count());
        assert_eq!(result.fastlz, flz_compress_len(&tx));
        assert!(result.best > 0);
    }

    #[test]
    fn test_deposits_are_excluded() {
        let mut estimator = Estimator::new(0, false);
        let block = block_with_transactions(7, vec![deposit_tx(), legacy_tx(2, 64)]);
        let results = estimator.process_block(&block).unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(estimator.stats().deposits_skipped, 1);
        assert_eq!(estimator.stats().estimated, 1);
    }

    #[test]
    fn test_bootstrap_suppresses_first_transactions() {
        let trace_store = TraceStorage::default();
        let layer = CollectingLayer::new(trace_store.clone());
        let _guard = tracing::subscriber::set_default(tracing_subscriber::Registry::default().with(layer));

        let mut estimator = Estimator::new(3, false);
        for i in 0..3 {
            assert!(!estimator.is_bootstrapped());
            assert_eq!(estimator.estimate_transaction(1, &legacy_tx(i, 80)).unwrap(), None);
        }
        assert!(estimator.is_bootstrapped());
        assert!(estimator.estimate_transaction(1, &legacy_tx(9, 80)).unwrap().is_some());

        // Deposits do not count towards the bootstrap.
        let mut estimator = Estimator::new(1, false);
        assert_eq!(estimator.estimate_transaction(1, &deposit_tx()).unwrap(), None);
        assert!(!estimator.is_bootstrapped());

        let infos = trace_store.get_by_level(Level::INFO);
        assert_eq!(infos.len(), 1);
        assert!(infos[0].contains("Bootstrap complete after 3 transactions"));
    }

    #[test]
    fn test_bootstrap_warms_the_window() {
        let tx = legacy_tx(5, 300);

        let mut cold = Estimator::new(0, false);
        let cold_best = cold.estimate_transaction(1, &tx).unwrap().unwrap().best;

        let mut warm = Estimator::new(1, false);
        assert_eq!(warm.estimate_transaction(1, &tx).unwrap(), None);
        let warm_best = warm.estimate_transaction(1, &tx).unwrap().unwrap().best;

        assert!(warm_best < cold_best);
    }

    #[test]
    fn test_malformed_transactions_are_logged_and_skipped() {
        let trace_store = TraceStorage::default();
        let layer = CollectingLayer::new(trace_store.clone());
        let _guard = tracing::subscriber::set_default(tracing_subscriber::Registry::default().with(layer));

        let mut estimator = Estimator::new(0, false);
        let block = block_with_transactions(
            3,
            vec![Bytes::new(), legacy_tx(1, 40), Bytes::from_static(&[0x85, 0x01])],
        );
        let results = estimator.process_block(&block).unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(estimator.stats().malformed_skipped, 2);
        let warnings = trace_store.get_by_level(Level::WARN);
        assert_eq!(warnings.len(), 2);
        assert!(warnings[0].contains("Skipping malformed transaction in block 3"));
    }

    #[test]
    fn test_trim_signature() {
        let tx = legacy_tx(3, 199);
        let mut estimator = Estimator::new(0, true);
        let result = estimator.estimate_transaction(1, &tx).unwrap().unwrap();
        assert_eq!(result.payload_len(), (tx.len() - 68) as u64);

        let short = legacy_tx(3, 10);
        let result = estimator.estimate_transaction(1, &short).unwrap().unwrap();
        assert_eq!(result.payload_len(), short.len() as u64);
    }

    #[test]
    fn test_block_number_is_truncated() {
        let mut estimator = Estimator::new(0, false);
        let result =
            estimator.estimate_transaction((1 << 32) + 5, &legacy_tx(1, 20)).unwrap().unwrap();
        assert_eq!(result.block_number, 5);
    }

    #[test]
    fn test_run_counts_drops() {
        let (jobs_tx, jobs_rx) = mpsc::channel(8);
        let (results_tx, mut results_rx) = mpsc::channel(8);

        jobs_tx
            .blocking_send(FetchOutcome::Fetched(block_with_transactions(2, vec![legacy_tx(1, 30)])))
            .unwrap();
        jobs_tx.blocking_send(FetchOutcome::Dropped(1)).unwrap();
        drop(jobs_tx);

        let stats = Estimator::new(0, false).run(jobs_rx, results_tx, None).unwrap();
        assert_eq!(stats.blocks_fetched, 1);
        assert_eq!(stats.blocks_dropped, 1);
        assert_eq!(results_rx.blocking_recv().map(|r| r.block_number), Some(2));
        assert_eq!(results_rx.blocking_recv(), None);
    }

    #[test]
    fn test_run_sorted_feeds_descending_blocks() {
        let (jobs_tx, jobs_rx) = mpsc::channel(8);
        let (results_tx, mut results_rx) = mpsc::channel(8);

        for number in [11, 13, 12] {
            let block = block_with_transactions(number, vec![legacy_tx(number as u8, 30)]);
            jobs_tx.blocking_send(FetchOutcome::Fetched(block)).unwrap();
        }
        drop(jobs_tx);

        let buffer = ReorderBuffer::new(13, 10);
        Estimator::new(0, false).run(jobs_rx, results_tx, Some(buffer)).unwrap();

        let mut order = Vec::new();
        while let Some(result) = results_rx.blocking_recv() {
            order.push(result.block_number);
        }
        assert_eq!(order, vec![13, 12, 11]);
    }

    #[test]
    fn test_run_sorted_reports_unfinished_range() {
        let trace_store = TraceStorage::default();
        let layer = CollectingLayer::new(trace_store.clone());
        let _guard = tracing::subscriber::set_default(tracing_subscriber::Registry::default().with(layer));

        let (jobs_tx, jobs_rx) = mpsc::channel(8);
        let (results_tx, mut results_rx) = mpsc::channel(8);
        for number in [13, 11] {
            let block = block_with_transactions(number, vec![legacy_tx(number as u8, 30)]);
            jobs_tx.blocking_send(FetchOutcome::Fetched(block)).unwrap();
        }
        drop(jobs_tx);

        let buffer = ReorderBuffer::new(13, 10);
        Estimator::new(0, false).run(jobs_rx, results_tx, Some(buffer)).unwrap();

        assert_eq!(results_rx.blocking_recv().map(|r| r.block_number), Some(13));
        assert_eq!(results_rx.blocking_recv(), None);
        let warnings = trace_store.get_by_level(Level::WARN);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("Sorted estimation stopped early, 1 fetched blocks"));
    }

    #[test]
    fn test_decoded_block_skips_deposit() {
        let block = Block::decode_raw(&raw_block(21, sample_transactions())).unwrap();
        assert_eq!(block.transactions.len(), 3);

        let mut estimator = Estimator::new(0, false);
        let results = estimator.process_block(&block).unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(estimator.stats().deposits_skipped, 1);
        assert_eq!(estimator.stats().malformed_skipped, 0);
        assert!(results.iter().all(|r| r.block_number == 21));
        assert_eq!(results[0].payload_len(), block.transactions[1].len() as u64);
        assert_eq!(results[1].payload_len(), block.transactions[2].len() as u64);
        assert_eq!(results[1].fastlz, flz_compress_len(&block.transactions[2]));
    }
}
