//! Ingest watcher binary.
//!
//! Watches `OBS_FOLDER`, uploads finished recordings and creates their
//! video records until Ctrl-C.

use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use obsclip_worker::ingest::watch;
use obsclip_worker::{Ingestor, PipelineContext, Role, WorkerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    obsclip_worker::init_process();
    info!("Starting ingest-watch");

    let config = WorkerConfig::from_env();
    info!("Marker file: {}", config.marker_file.display());

    let ctx = PipelineContext::init(config, Role::Ingest)
        .await
        .inspect_err(|e| error!("Initialization failed: {}", e))
        .context("initialization failed")?;

    let ingestor = Arc::new(Ingestor::new(
        ctx.config.clone(),
        ctx.storage.clone(),
        ctx.videos.clone(),
    ));

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            return;
        }
        info!("Received shutdown signal");
        signal.cancel();
    });

    let result = watch(ingestor, shutdown).await;
    ctx.shutdown().await;

    result
        .inspect_err(|e| error!("Watcher failed: {}", e))
        .context("watcher failed")?;
    info!("Ingest watcher shutdown complete");
    Ok(())
}
