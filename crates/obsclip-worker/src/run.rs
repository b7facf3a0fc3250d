//! Result of one stage process run.

use tracing::{error, info, warn};

use obsclip_models::{Stage, VideoId};

use crate::error::WorkerError;
use crate::metrics;

/// What a single `extract-clips` / `combine-clips` run did.
#[derive(Debug)]
pub enum StageRun {
    /// No eligible record; nothing done
    Idle,
    /// Record advanced; `failed` items were skipped
    Advanced {
        video_id: VideoId,
        stage: Stage,
        succeeded: usize,
        failed: usize,
    },
    /// Another run set the flag first
    LostRace { video_id: VideoId, stage: Stage },
    /// Per-video failure; the flag was not advanced
    Failed {
        video_id: VideoId,
        stage: Stage,
        error: WorkerError,
    },
}

impl StageRun {
    pub fn failed(video_id: &VideoId, stage: Stage, error: impl Into<WorkerError>) -> Self {
        Self::Failed {
            video_id: video_id.clone(),
            stage,
            error: error.into(),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            StageRun::Idle => "idle",
            StageRun::Advanced { failed: 0, .. } => "complete",
            StageRun::Advanced { .. } => "partial",
            StageRun::LostRace { .. } => "lost_race",
            StageRun::Failed { .. } => "failed",
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, StageRun::Failed { .. })
    }

    /// Log the final line of the run and count it.
    pub fn report(&self, stage: Stage) {
        metrics::record_stage_run(stage, self.label());
        match self {
            StageRun::Idle => info!(stage = %stage, "No eligible video, nothing to do"),
            StageRun::Advanced {
                video_id,
                succeeded,
                failed,
                ..
            } => info!(
                video_id = %video_id,
                stage = %stage,
                succeeded,
                failed,
                "Stage advanced"
            ),
            StageRun::LostRace { video_id, .. } => warn!(
                video_id = %video_id,
                stage = %stage,
                "Another run completed this stage first; result discarded"
            ),
            StageRun::Failed { video_id, error, .. } => error!(
                video_id = %video_id,
                stage = %stage,
                "Stage failed: {}", error
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels() {
        let id = VideoId::from("1700000000000_abcdefghi");
        let partial = StageRun::Advanced {
            video_id: id.clone(),
            stage: Stage::ClipsExtracted,
            succeeded: 2,
            failed: 1,
        };
        assert_eq!(partial.label(), "partial");
        assert_eq!(StageRun::Idle.label(), "idle");

        let failed = StageRun::failed(
            &id,
            Stage::ClipsCombined,
            WorkerError::no_output(Stage::ClipsCombined, "no clips downloaded"),
        );
        assert!(failed.is_failure());
    }
}
