//! Structured stage logging and subscriber setup.

use tracing::{info, warn, Span};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use obsclip_models::{Stage, VideoId};

/// Install the global subscriber.
///
/// `LOG_FORMAT=json` selects JSON output; otherwise ANSI text.
pub fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("obsclip=info"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}

/// Stage logger for structured logging with consistent formatting.
///
/// Every line carries the video id and the stage being worked on.
#[derive(Debug, Clone)]
pub struct StageLogger {
    video_id: String,
    stage: Stage,
}

impl StageLogger {
    pub fn new(video_id: &VideoId, stage: Stage) -> Self {
        Self {
            video_id: video_id.to_string(),
            stage,
        }
    }

    /// Log the start of a stage run.
    pub fn log_start(&self, message: &str) {
        info!(
            video_id = %self.video_id,
            stage = %self.stage,
            "Stage started: {}", message
        );
    }

    /// Log a progress update.
    pub fn log_progress(&self, message: &str) {
        info!(
            video_id = %self.video_id,
            stage = %self.stage,
            "Stage progress: {}", message
        );
    }

    /// Log a per-item failure.
    pub fn log_warning(&self, clip_index: u32, message: &str) {
        warn!(
            video_id = %self.video_id,
            stage = %self.stage,
            clip_index,
            "Stage warning: {}", message
        );
    }

    /// Log the completion of a stage run.
    pub fn log_completion(&self, message: &str) {
        info!(
            video_id = %self.video_id,
            stage = %self.stage,
            "Stage completed: {}", message
        );
    }

    pub fn video_id(&self) -> &str {
        &self.video_id
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Create a tracing span for this run.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "stage",
            video_id = %self.video_id,
            stage = %self.stage
        )
    }
}
