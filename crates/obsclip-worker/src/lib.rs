//! OBS recording pipeline worker.
//!
//! This crate provides:
//! - The ingest watcher (stability debounce, upload, record creation, marker drain)
//! - Clip derivation from markers (`clipsExtracted`)
//! - Highlights compilation (`clipsCombined`)
//! - The pipeline context shared by the three binaries

pub mod combine;
pub mod config;
pub mod context;
pub mod derive;
pub mod error;
pub mod ingest;
pub mod logging;
pub mod markers;
pub mod metrics;
pub mod run;
pub mod stability;
pub mod stores;

pub use combine::{combine, run_combine, ClipDownload, Compilation};
pub use config::WorkerConfig;
pub use context::{PipelineContext, Role, StageDeps};
pub use derive::{derive_clips, run_extract};
pub use error::{WorkerError, WorkerResult};
pub use ingest::{InFlightGuard, InFlightSet, IngestOutcome, Ingestor, SkipReason};
pub use logging::{init_tracing, StageLogger};
pub use markers::{read_markers, PendingMarkers};
pub use run::StageRun;
pub use stability::{is_stable, is_stable_with, SizeProbe, StabilityPolicy};
pub use stores::{MediaTool, ObjectStore, VideoStore};

use obsclip_models::VideoId;

/// Common process setup for the binaries: TLS provider, `.env`, tracing.
pub fn init_process() {
    // Install rustls crypto provider (required for TLS/HTTPS)
    let _ = rustls::crypto::ring::default_provider().install_default();

    dotenvy::dotenv().ok();
    init_tracing();
}

/// Optional positional `video_id` argument.
pub fn video_id_arg() -> Option<VideoId> {
    std::env::args()
        .nth(1)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .map(VideoId::from)
}
