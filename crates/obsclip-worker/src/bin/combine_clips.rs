//! Clip combination stage binary.
//!
//! Usage: `combine-clips [video_id]`. Without an id the next eligible video is
//! selected. Exits 0 when there is nothing to do or the video failed (the
//! failure is logged); exits 1 on initialization or selection errors.

use std::process::ExitCode;

use tracing::{error, info};

use obsclip_models::Stage;
use obsclip_worker::{run_combine, video_id_arg, PipelineContext, Role, WorkerConfig};

#[tokio::main]
async fn main() -> ExitCode {
    obsclip_worker::init_process();
    info!("Starting combine-clips");

    let config = WorkerConfig::from_env();
    let ctx = match PipelineContext::init(config, Role::Stage).await {
        Ok(ctx) => ctx,
        Err(e) => {
            error!("Initialization failed: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let explicit_id = video_id_arg();
    let result = run_combine(ctx.deps(), explicit_id.as_ref()).await;
    ctx.shutdown().await;

    match result {
        Ok(run) => {
            run.report(Stage::ClipsCombined);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Clip combination failed: {}", e);
            ExitCode::FAILURE
        }
    }
}
