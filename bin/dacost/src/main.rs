#![doc = include_str!("../README.md")]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]

use anyhow::{anyhow, Result};
use clap::Parser;
use cli::{Cli, Command, EstimateArgs};
use dacost_pipeline::{Pipeline, PipelineSummary};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

mod cli;
mod import;
mod metrics;

const LOG_TARGET: &str = "dacost";

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse().init_telemetry()?;
    let cancel = cancel_on_ctrl_c();

    match cli.command {
        Command::Estimate(args) => {
            let summary = estimate(args, cancel).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::Import(args) => {
            let summary = import::import(&args, cancel).await?;
            info!(target: LOG_TARGET, "Import finished: {summary:?}");
        }
    }
    Ok(())
}

/// Runs the estimation pipeline, next to the metrics server if one is configured.
async fn estimate(args: EstimateArgs, cancel: CancellationToken) -> Result<PipelineSummary> {
    let config = args.pipeline_config();
    info!(target: LOG_TARGET, "Configuration: {}", serde_json::to_string(&config)?);
    info!(target: LOG_TARGET, "Reading blocks from {}", args.source);

    let pipeline = Pipeline::new(config, args.source).with_cancellation(cancel);
    let Some(addr) = args.metrics_addr else {
        return pipeline.run().await.map_err(|e| anyhow!(e));
    };

    info!(target: LOG_TARGET, "Serving metrics on {addr}");
    tokio::select! {
        res = metrics::serve_metrics(&addr) => {
            error!(target: LOG_TARGET, "Metrics server stopped: {:?}", res);
            res.and(Err(anyhow!("metrics server stopped")))
        }
        summary = pipeline.run() => summary.map_err(|e| anyhow!(e)),
    }
}

/// Returns a token that is cancelled on the first Ctrl-C.
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!(target: LOG_TARGET, "Received Ctrl-C, draining the pipeline");
            token.cancel();
        }
    });
    cancel
}
