//! This module contains all CLI-specific code.

use anyhow::{anyhow, Result};
use clap::{
    builder::styling::{AnsiColor, Color, Style},
    ArgAction, Args, Parser, Subcommand,
};
use dacost_pipeline::{
    config::{DEFAULT_BOOTSTRAP_TRANSACTIONS, DEFAULT_FETCHERS, DEFAULT_OUTPUT},
    retry::DEFAULT_MAX_ATTEMPTS,
    ArrivalOrder, PipelineConfig, RetryPolicy, StartBlock,
};
use dacost_providers::BlockSourceLocation;
use std::{path::PathBuf, time::Duration};
use tracing::Level;

/// The dacost CLI application arguments.
#[derive(Parser, Clone, Debug)]
#[command(author, version, about, long_about = None, styles = cli_styles())]
pub(crate) struct Cli {
    /// Verbosity level (0-2)
    #[arg(long, short, help = "Verbosity level (0-2)", action = ArgAction::Count, global = true)]
    pub v: u8,
    /// The subcommand to run.
    #[clap(subcommand)]
    pub command: Command,
}

/// Subcommands for the CLI.
#[derive(Debug, Clone, Subcommand)]
pub(crate) enum Command {
    /// Estimate the compressed size of every transaction in a block range.
    Estimate(EstimateArgs),
    /// Copy a block range from a JSON-RPC endpoint into a local block store.
    Import(ImportArgs),
}

/// Retry options shared by the subcommands.
#[derive(Debug, Clone, Args)]
pub(crate) struct RetryArgs {
    /// Attempts per block, including the first one.
    #[clap(long, env = "DACOST_MAX_ATTEMPTS", default_value_t = DEFAULT_MAX_ATTEMPTS)]
    pub max_attempts: u32,
    /// Delay before the first retry of a block, in milliseconds. Doubles on every retry.
    #[clap(long, env = "DACOST_BASE_DELAY_MS", default_value_t = 100)]
    pub base_delay_ms: u64,
}

impl RetryArgs {
    /// Returns the [RetryPolicy] described by the arguments.
    pub(crate) const fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Duration::from_millis(self.base_delay_ms))
    }
}

/// Arguments of the `estimate` subcommand.
#[derive(Debug, Clone, Args)]
pub(crate) struct EstimateArgs {
    /// A JSON-RPC URL (debug namespace required) or the path of a local block store.
    #[clap(long, short, env = "DACOST_SOURCE")]
    pub source: BlockSourceLocation,
    /// The first block to process: a block number or `latest`.
    #[clap(long, env = "DACOST_START_BLOCK", default_value = "latest")]
    pub start_block: StartBlock,
    /// The block to stop at. This block is not processed.
    #[clap(long, env = "DACOST_STOP_BLOCK", default_value_t = 0)]
    pub stop_block: u64,
    /// Number of parallel fetchers.
    #[clap(long, env = "DACOST_FETCHERS", default_value_t = DEFAULT_FETCHERS)]
    pub fetchers: usize,
    /// Retry options.
    #[clap(flatten)]
    pub retry: RetryArgs,
    /// Transactions used to warm up the zlib window before results are written.
    #[clap(long, env = "DACOST_BOOTSTRAP", default_value_t = DEFAULT_BOOTSTRAP_TRANSACTIONS)]
    pub bootstrap: u64,
    /// Strip the 68 byte signature suffix from every transaction.
    #[clap(long, env = "DACOST_TRIM_SIGNATURE")]
    pub trim_signature: bool,
    /// The order in which blocks are estimated: `arrival` or `sorted`.
    #[clap(long, env = "DACOST_ORDER", default_value = "arrival")]
    pub order: ArrivalOrder,
    /// Delay between two dispatched block numbers, in milliseconds.
    #[clap(long, env = "DACOST_DISPATCH_DELAY_MS")]
    pub dispatch_delay_ms: Option<u64>,
    /// Interval between progress reports, in seconds.
    #[clap(long, env = "DACOST_PROGRESS_INTERVAL", default_value_t = 10)]
    pub progress_interval: u64,
    /// The output file.
    #[clap(long, short, env = "DACOST_OUTPUT", default_value = DEFAULT_OUTPUT)]
    pub output: PathBuf,
    /// Address to serve prometheus metrics on, e.g. `127.0.0.1:9090`.
    #[clap(long, env = "DACOST_METRICS_ADDR")]
    pub metrics_addr: Option<String>,
}

impl EstimateArgs {
    /// Returns the [PipelineConfig] described by the arguments.
    pub(crate) fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            start: self.start_block,
            stop: self.stop_block,
            fetchers: self.fetchers,
            retry: self.retry.policy(),
            bootstrap_transactions: self.bootstrap,
            trim_signature: self.trim_signature,
            order: self.order,
            dispatch_delay: self.dispatch_delay_ms.map(Duration::from_millis),
            progress_interval: Duration::from_secs(self.progress_interval),
            output: self.output.clone(),
            ..Default::default()
        }
    }
}

/// Arguments of the `import` subcommand.
#[derive(Debug, Clone, Args)]
pub(crate) struct ImportArgs {
    /// The JSON-RPC URL to copy blocks from (debug namespace required).
    #[clap(long, short, env = "DACOST_IMPORT_SOURCE")]
    pub source: reqwest::Url,
    /// The local block store to copy blocks into. Created if missing.
    #[clap(long, env = "DACOST_STORE")]
    pub store: PathBuf,
    /// The lowest block to copy.
    #[clap(long)]
    pub from: u64,
    /// The highest block to copy.
    #[clap(long)]
    pub to: u64,
    /// Retry options.
    #[clap(flatten)]
    pub retry: RetryArgs,
}

impl Cli {
    /// Initializes telemetry for the application.
    pub(crate) fn init_telemetry(self) -> Result<Self> {
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(log_level(self.v))
            .finish();
        tracing::subscriber::set_global_default(subscriber).map_err(|e| anyhow!(e))?;
        Ok(self)
    }
}

/// Maps the `-v` count to the maximum log level. Progress reports and dropped blocks are
/// logged at the default level.
const fn log_level(verbosity: u8) -> Level {
    match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Styles for the CLI application.
const fn cli_styles() -> clap::builder::Styles {
    clap::builder::Styles::styled()
        .usage(Style::new().bold().underline().fg_color(Some(Color::Ansi(AnsiColor::Yellow))))
        .header(Style::new().bold().underline().fg_color(Some(Color::Ansi(AnsiColor::Yellow))))
        .literal(Style::new().fg_color(Some(Color::Ansi(AnsiColor::Green))))
        .invalid(Style::new().bold().fg_color(Some(Color::Ansi(AnsiColor::Red))))
        .error(Style::new().bold().fg_color(Some(Color::Ansi(AnsiColor::Red))))
        .valid(Style::new().bold().underline().fg_color(Some(Color::Ansi(AnsiColor::Green))))
        .placeholder(Style::new().fg_color(Some(Color::Ansi(AnsiColor::White))))
}
