//! Wiring of the pipeline stages.

use crate::{
    coordinator::{dispatch, resolve_start},
    ArrivalOrder, Estimator, EstimatorStats, Fetcher, PipelineConfig, PipelineError,
    ReorderBuffer, ResultWriter,
};
use dacost_providers::{BlockSource, Connector};
use serde::Serialize;
use std::{io::Write, sync::Arc};
use tokio::{
    sync::{mpsc, Mutex},
    task::{JoinError, JoinSet},
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// The outcome of a pipeline run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineSummary {
    /// The resolved starting block.
    pub start_block: u64,
    /// The exclusive lower bound of the range.
    pub stop_block: u64,
    /// Block numbers handed to the fetchers.
    pub blocks_dispatched: u64,
    /// Blocks fetched and estimated.
    pub blocks_fetched: u64,
    /// Blocks dropped after exhausting their retries.
    pub blocks_dropped: u64,
    /// Deposit transactions excluded from the estimates.
    pub deposits_skipped: u64,
    /// Malformed transactions skipped.
    pub malformed_skipped: u64,
    /// Transactions used to warm up the zlib window.
    pub bootstrap_transactions: u64,
    /// Records written to the output.
    pub records_written: u64,
    /// Records that failed to be written.
    pub write_failures: u64,
    /// The block number of the last record written.
    pub last_block: Option<u32>,
    /// Whether the run was cancelled before the range was exhausted.
    pub cancelled: bool,
}

/// A pipeline run over the blocks served by a [Connector].
#[derive(Debug)]
pub struct Pipeline<C> {
    config: PipelineConfig,
    connector: C,
    cancel: CancellationToken,
}

impl<C: Connector + 'static> Pipeline<C> {
    /// Creates a new [Pipeline].
    pub fn new(config: PipelineConfig, connector: C) -> Self {
        Self { config, connector, cancel: CancellationToken::new() }
    }

    /// Uses `cancel` to stop the run. Cancelling stops dispatching new blocks and abandons
    /// pending retries, while everything already fetched is still estimated and written.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Returns the token that cancels the run.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Runs the pipeline, writing results to the configured output file.
    pub async fn run(self) -> Result<PipelineSummary, PipelineError> {
        self.config.validate()?;
        let writer = ResultWriter::create(&self.config.output, self.config.progress_interval)?;
        self.run_with_writer(writer).await.map(|(_, summary)| summary)
    }

    /// Runs the pipeline with the given writer. Returns the writer's sink along with the
    /// summary.
    pub async fn run_with_writer<W: Write + Send + 'static>(
        self,
        writer: ResultWriter<W>,
    ) -> Result<(W, PipelineSummary), PipelineError> {
        let Self { config, connector, cancel } = self;
        config.validate()?;
        info!(target: "pipeline", "Processing blocks down to block {}", config.stop);

        // The coordinator resolves the range over its own connection.
        let mut source = connector.connect().await.map_err(PipelineError::Connect)?;
        let start = resolve_start(&mut source, config.start).await;
        source.close().await;
        let start = start.inspect_err(|err| error!(target: "pipeline", "{err}"))?;

        let (numbers_tx, numbers_rx) = mpsc::channel(config.block_number_capacity());
        let (jobs_tx, jobs_rx) = mpsc::channel(config.job_capacity);
        let (results_tx, results_rx) = mpsc::channel(config.result_capacity);

        let numbers = Arc::new(Mutex::new(numbers_rx));
        let mut fetchers = JoinSet::new();
        for id in 0..config.fetchers {
            let source = connector.connect().await.map_err(PipelineError::Connect)?;
            let fetcher = Fetcher::new(id, source, config.retry, cancel.clone());
            fetchers.spawn(fetcher.run(Arc::clone(&numbers), jobs_tx.clone()));
        }
        drop((numbers, jobs_tx));

        let coordinator = tokio::spawn(dispatch(
            start,
            config.stop,
            config.dispatch_delay,
            numbers_tx,
            cancel.clone(),
        ));

        let reorder =
            (config.order == ArrivalOrder::Sorted).then(|| ReorderBuffer::new(start, config.stop));
        let estimator = Estimator::new(config.bootstrap_transactions, config.trim_signature);
        let estimator =
            tokio::task::spawn_blocking(move || estimator.run(jobs_rx, results_tx, reorder));
        let writer = tokio::task::spawn_blocking(move || writer.run(results_rx));

        // The estimator returns once every fetcher is gone, or early on a compression failure.
        let estimated = estimator.await.map_err(task_failed).and_then(|res| res);
        if estimated.is_err() {
            cancel.cancel();
        }

        let (out, writer_stats) = writer.await.map_err(task_failed)?;
        let blocks_dispatched = coordinator.await.map_err(task_failed)?;
        while let Some(res) = fetchers.join_next().await {
            res.map_err(task_failed)?;
        }
        let EstimatorStats {
            blocks_fetched,
            blocks_dropped,
            deposits_skipped,
            malformed_skipped,
            bootstrap_transactions,
            ..
        } = estimated?;

        let summary = PipelineSummary {
            start_block: start,
            stop_block: config.stop,
            blocks_dispatched,
            blocks_fetched,
            blocks_dropped,
            deposits_skipped,
            malformed_skipped,
            bootstrap_transactions,
            records_written: writer_stats.records_written,
            write_failures: writer_stats.write_failures,
            last_block: writer_stats.last_block,
            cancelled: cancel.is_cancelled(),
        };
        if summary.cancelled {
            warn!(target: "pipeline", "Run cancelled after dispatching {blocks_dispatched} blocks");
        }
        info!(
            target: "pipeline",
            "Run finished: {} blocks fetched, {} dropped, {} records written, {} write failures",
            summary.blocks_fetched,
            summary.blocks_dropped,
            summary.records_written,
            summary.write_failures
        );
        Ok((out, summary))
    }
}

fn task_failed(err: JoinError) -> PipelineError {
    error!(target: "pipeline", "Pipeline task failed: {err}");
    PipelineError::Task(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        test_utils::{CollectingLayer, TraceStorage},
        EstimationResult, RecordReader, RetryPolicy, StartBlock,
    };
    use alloy_primitives::Bytes;
    use dacost_providers::{
        test_utils::{block_with_transactions, MockConnector},
        BlockSourceError,
    };
    use std::{collections::HashMap, time::Duration};
    use tracing::Level;
    use tracing_subscriber::layer::SubscriberExt;

    /// A legacy-looking transaction whose length depends on its block and position.
    fn tx(block: u64, index: usize) -> Bytes {
        let len = 40 + (block % 7) as usize + index * 13;
        let mut payload = vec![0xf8];
        payload.extend((1..len).map(|i| (i * 7 % 5) as u8));
        Bytes::from(payload)
    }

    fn deposit() -> Bytes {
        Bytes::from(vec![0x7e, 0xf8, 0x10, 0x00, 0x00, 0x01])
    }

    fn chain(range: std::ops::RangeInclusive<u64>) -> MockConnector {
        MockConnector::with_blocks(
            range.map(|n| block_with_transactions(n, vec![tx(n, 0), tx(n, 1)])),
        )
    }

    fn config(start: StartBlock, stop: u64) -> PipelineConfig {
        PipelineConfig {
            start,
            stop,
            fetchers: 3,
            retry: RetryPolicy::new(3, Duration::from_millis(1)),
            bootstrap_transactions: 0,
            ..Default::default()
        }
    }

    async fn run(
        config: PipelineConfig,
        connector: MockConnector,
    ) -> Result<(Vec<EstimationResult>, PipelineSummary), PipelineError> {
        let writer = ResultWriter::new(Vec::new(), Duration::from_secs(10));
        let (out, summary) = Pipeline::new(config, connector).run_with_writer(writer).await?;
        let records = RecordReader::new(out.as_slice()).collect::<std::io::Result<Vec<_>>>()?;
        Ok((records, summary))
    }

    #[tokio::test]
    async fn test_end_to_end() {
        let connector = chain(100..=104);
        let (records, summary) =
            run(config(StartBlock::Number(104), 99), connector.clone()).await.unwrap();

        assert_eq!(records.len(), 10);
        let mut per_block = HashMap::<u32, usize>::new();
        records.iter().for_each(|r| *per_block.entry(r.block_number).or_default() += 1);
        assert_eq!(per_block.len(), 5);
        assert!((100..=104).all(|n| per_block[&n] == 2));

        // The two records of a block are adjacent and follow the transaction order.
        for pair in records.chunks_exact(2) {
            assert_eq!(pair[0].block_number, pair[1].block_number);
            let number = u64::from(pair[0].block_number);
            assert_eq!(pair[0].payload_len(), tx(number, 0).len() as u64);
            assert_eq!(pair[1].payload_len(), tx(number, 1).len() as u64);
        }

        assert_eq!(summary.start_block, 104);
        assert_eq!(summary.blocks_dispatched, 5);
        assert_eq!(summary.blocks_fetched, 5);
        assert_eq!(summary.records_written, 10);
        assert!(!summary.cancelled);
        assert_eq!(connector.connections(), 4);
    }

    #[tokio::test]
    async fn test_latest_start() {
        let (records, summary) = run(config(StartBlock::Latest, 2), chain(1..=5)).await.unwrap();
        assert_eq!(summary.start_block, 5);
        assert_eq!(summary.blocks_fetched, 3);
        assert_eq!(records.len(), 6);
        assert!(records.iter().all(|r| (3..=5).contains(&r.block_number)));
    }

    #[tokio::test]
    async fn test_deposit_exclusion() {
        let connector = MockConnector::with_blocks([block_with_transactions(
            10,
            vec![deposit(), tx(10, 0)],
        )]);
        let (records, summary) = run(config(StartBlock::Number(10), 9), connector).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].payload_len(), tx(10, 0).len() as u64);
        assert_eq!(summary.deposits_skipped, 1);
    }

    #[tokio::test]
    async fn test_bootstrap() {
        let config = PipelineConfig {
            bootstrap_transactions: 4,
            fetchers: 1,
            ..config(StartBlock::Number(3), 0)
        };
        let (records, summary) = run(config, chain(1..=3)).await.unwrap();
        assert_eq!(summary.bootstrap_transactions, 4);
        assert_eq!(records.len(), 2);
        assert_eq!(summary.records_written, 2);
    }

    #[tokio::test]
    async fn test_retry_recovers() {
        let connector = chain(1..=3);
        connector.fail_times(2, 2);
        let (records, summary) =
            run(config(StartBlock::Number(3), 0), connector.clone()).await.unwrap();

        assert_eq!(connector.attempts(2), 3);
        assert_eq!(summary.blocks_dropped, 0);
        assert_eq!(records.iter().filter(|r| r.block_number == 2).count(), 2);
        assert_eq!(records.len(), 6);
    }

    #[tokio::test]
    async fn test_exhausted_retries_drop_block() {
        let trace_store = TraceStorage::default();
        let layer = CollectingLayer::new(trace_store.clone());
        let _guard = tracing::subscriber::set_default(tracing_subscriber::Registry::default().with(layer));

        let connector = chain(1..=3);
        connector.fail_times(2, 3);
        let (records, summary) =
            run(config(StartBlock::Number(3), 0), connector.clone()).await.unwrap();

        assert_eq!(connector.attempts(2), 3);
        assert_eq!(summary.blocks_dropped, 1);
        assert_eq!(summary.blocks_fetched, 2);
        assert_eq!(records.len(), 4);
        assert!(records.iter().all(|r| r.block_number != 2));

        let warnings = trace_store.get_by_level(Level::WARN);
        assert!(warnings.iter().any(|w| w.contains("dropping block 2 after 3 attempts")));
    }

    #[tokio::test]
    async fn test_sorted_order() {
        let connector = chain(1..=20);
        connector.fail_times(18, 2);
        let config = PipelineConfig {
            order: ArrivalOrder::Sorted,
            fetchers: 4,
            ..config(StartBlock::Number(20), 0)
        };
        let (records, _) = run(config, connector).await.unwrap();

        let numbers = records.iter().map(|r| r.block_number).collect::<Vec<_>>();
        let expected = (1..=20u32).rev().flat_map(|n| [n, n]).collect::<Vec<_>>();
        assert_eq!(numbers, expected);
    }

    #[tokio::test]
    async fn test_unresolvable_start_is_fatal() {
        let err = run(config(StartBlock::Number(10), 0), chain(1..=3)).await.unwrap_err();
        assert!(matches!(err, PipelineError::StartBlock(BlockSourceError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_cancelled_run_drains() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let writer = ResultWriter::new(Vec::new(), Duration::from_secs(10));
        let (out, summary) = Pipeline::new(config(StartBlock::Number(5), 0), chain(1..=5))
            .with_cancellation(cancel)
            .run_with_writer(writer)
            .await
            .unwrap();

        assert!(summary.cancelled);
        assert_eq!(summary.blocks_dispatched, 0);
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_run_writes_output_file() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("data").join("fastlz.bin");
        let config = PipelineConfig { output: output.clone(), ..config(StartBlock::Number(4), 1) };

        let summary = Pipeline::new(config, chain(1..=4)).run().await.unwrap();
        assert_eq!(summary.records_written, 6);
        assert_eq!(std::fs::read(&output).unwrap().len(), 6 * crate::RECORD_LEN);
    }
}
