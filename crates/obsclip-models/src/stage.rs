//! Pipeline stages and their persisted gates.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::clip::Clip;
use crate::locator::StorageLocator;

/// Processing stages, in their strict order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Source uploaded and record created
    Uploaded,
    /// Clips cut from markers and uploaded
    ClipsExtracted,
    /// Clips concatenated into one highlights video
    ClipsCombined,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Uploaded => "uploaded",
            Stage::ClipsExtracted => "clips_extracted",
            Stage::ClipsCombined => "clips_combined",
        }
    }

    /// The stage that must be complete before this one may be set.
    pub fn previous(&self) -> Option<Stage> {
        match self {
            Stage::Uploaded => None,
            Stage::ClipsExtracted => Some(Stage::Uploaded),
            Stage::ClipsCombined => Some(Stage::ClipsExtracted),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Persisted boolean + timestamp pair. Never cleared once set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StageFlag {
    pub done: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Output of a completed stage, written in the same update as its flag.
#[derive(Debug, Clone, PartialEq)]
pub enum StageResult {
    ClipsExtracted { clips: Vec<Clip> },
    ClipsCombined { combined_video: StorageLocator },
}

impl StageResult {
    pub fn stage(&self) -> Stage {
        match self {
            StageResult::ClipsExtracted { .. } => Stage::ClipsExtracted,
            StageResult::ClipsCombined { .. } => Stage::ClipsCombined,
        }
    }

    /// True when the result would write no output.
    pub fn is_empty(&self) -> bool {
        match self {
            StageResult::ClipsExtracted { clips } => clips.is_empty(),
            StageResult::ClipsCombined { .. } => false,
        }
    }
}

/// Why a record is or is not selectable for a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
    Eligible,
    /// Target flag already set
    AlreadyComplete,
    /// No markers (for extraction) or no clips (for combination)
    MissingInput,
}

impl Eligibility {
    pub fn is_eligible(&self) -> bool {
        matches!(self, Eligibility::Eligible)
    }
}

/// A stage result that cannot be applied to a record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("stage {0} is already complete")]
    AlreadyComplete(Stage),

    #[error("stage {stage} requires {missing} to be complete first")]
    OutOfOrder { stage: Stage, missing: Stage },

    #[error("stage {0} result carries no output")]
    EmptyPayload(Stage),
}
