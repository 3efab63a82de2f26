//! The result writer: appends records to the output and reports progress.

use crate::{inc, set, EstimationResult};
use std::{
    fs::{self, File},
    io::{self, BufWriter, Write},
    path::Path,
    time::{Duration, Instant},
};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

/// Counters kept by the [ResultWriter].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterStats {
    /// Records written to the output.
    pub records_written: u64,
    /// Records that failed to be written.
    pub write_failures: u64,
    /// The block number of the last record written.
    pub last_block: Option<u32>,
}

/// Serializes [EstimationResult]s into a sink.
///
/// Write failures are logged per record and do not stop the writer.
#[derive(Debug)]
pub struct ResultWriter<W: Write> {
    out: W,
    progress_interval: Duration,
    last_progress: Instant,
    stats: WriterStats,
}

impl ResultWriter<BufWriter<File>> {
    /// Creates the output file at `path`, truncating an existing one. Missing parent
    /// directories are created.
    pub fn create(path: &Path, progress_interval: Duration) -> io::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = File::create(path)?;
        debug!(target: "writer", "Writing results to {}", path.display());
        Ok(Self::new(BufWriter::new(file), progress_interval))
    }
}

impl<W: Write> ResultWriter<W> {
    /// Creates a new [ResultWriter] over `out`.
    pub fn new(out: W, progress_interval: Duration) -> Self {
        Self { out, progress_interval, last_progress: Instant::now(), stats: WriterStats::default() }
    }

    /// Returns the counters collected so far.
    pub const fn stats(&self) -> WriterStats {
        self.stats
    }

    /// Writes a single record.
    pub fn write(&mut self, record: &EstimationResult) {
        if let Err(err) = self.out.write_all(&record.encode()) {
            error!(
                target: "writer",
                "Failed to write record for block {}: {err}",
                record.block_number
            );
            self.stats.write_failures += 1;
            inc!(WRITE_FAILURES);
            return;
        }

        self.stats.records_written += 1;
        self.stats.last_block = Some(record.block_number);
        inc!(RECORDS_WRITTEN);
        set!(LAST_BLOCK_WRITTEN, i64::from(record.block_number));

        if self.last_progress.elapsed() > self.progress_interval {
            self.report_progress();
        }
    }

    fn report_progress(&mut self) {
        info!(
            target: "writer",
            "Processed {} transactions, current block: {}",
            self.stats.records_written,
            self.stats.last_block.unwrap_or_default()
        );
        self.last_progress = Instant::now();
    }

    /// Flushes the output and returns the sink with the final counters.
    pub fn finish(mut self) -> (W, WriterStats) {
        if let Err(err) = self.out.flush() {
            error!(target: "writer", "Failed to flush results: {err}");
        }
        debug!(target: "writer", "Wrote {} records", self.stats.records_written);
        (self.out, self.stats)
    }

    /// Writes every result received until the queue is closed and drained, then flushes.
    ///
    /// Must run on a blocking thread.
    pub fn run(mut self, mut results: mpsc::Receiver<EstimationResult>) -> (W, WriterStats) {
        while let Some(record) = results.blocking_recv() {
            self.write(&record);
        }
        self.finish()
    }
}
