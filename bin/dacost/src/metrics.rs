//! Prometheus metrics server.

use actix_web::{get, App, HttpServer, Responder};
use anyhow::{anyhow, Result};
use prometheus::{Encoder, TextEncoder};

/// Serves the registered metrics on `bind` until the server stops.
pub(crate) async fn serve_metrics(bind: &str) -> Result<()> {
    HttpServer::new(|| App::new().service(index).service(metrics))
        .disable_signals()
        .bind(bind)
        .map_err(|e| anyhow!(e))?
        .run()
        .await
        .map_err(|e| anyhow!(e))
}

#[get("/")]
async fn index() -> impl Responder {
    "dacost-metrics-server: visit /metrics to view metrics"
}

#[get("/metrics")]
async fn metrics() -> impl Responder {
    let encoder = TextEncoder::new();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::error!(target: "metrics", "Failed to encode prometheus metrics: {:?}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
