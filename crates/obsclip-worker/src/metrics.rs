//! Worker metrics.

use metrics::counter;

use obsclip_models::Stage;

/// Metric name constants for consistency.
pub mod names {
    /// Source recordings uploaded and recorded.
    pub const VIDEOS_INGESTED_TOTAL: &str = "obsclip_videos_ingested_total";

    /// Files the watcher looked at but skipped, by reason.
    pub const INGEST_SKIPPED_TOTAL: &str = "obsclip_ingest_skipped_total";

    /// Clips cut and uploaded.
    pub const CLIPS_EXTRACTED_TOTAL: &str = "obsclip_clips_extracted_total";

    /// Markers or clips that failed within a stage run.
    pub const ITEMS_FAILED_TOTAL: &str = "obsclip_items_failed_total";

    /// Stage runs by stage and outcome.
    pub const STAGE_RUNS_TOTAL: &str = "obsclip_stage_runs_total";
}

pub fn record_ingested() {
    counter!(names::VIDEOS_INGESTED_TOTAL).increment(1);
}

pub fn record_ingest_skipped(reason: &'static str) {
    counter!(names::INGEST_SKIPPED_TOTAL, "reason" => reason).increment(1);
}

pub fn record_clip_extracted() {
    counter!(names::CLIPS_EXTRACTED_TOTAL).increment(1);
}

pub fn record_item_failed(stage: Stage) {
    counter!(names::ITEMS_FAILED_TOTAL, "stage" => stage.as_str()).increment(1);
}

pub fn record_stage_run(stage: Stage, outcome: &'static str) {
    counter!(
        names::STAGE_RUNS_TOTAL,
        "stage" => stage.as_str(),
        "outcome" => outcome
    )
    .increment(1);
}
