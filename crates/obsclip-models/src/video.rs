//! Video record models.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::clip::Clip;
use crate::locator::{LocatorError, StorageLocator};
use crate::stage::{Eligibility, Stage, StageFlag, StageResult, TransitionError};

/// Value written to `metadata.uploadedBy` for records created by the ingest watcher.
pub const UPLOADED_BY: &str = "obs-watcher";

/// Length of the random base36 suffix of a [`VideoId`].
const ID_SUFFIX_LEN: usize = 9;

const BASE36: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Unique identifier for an ingested recording.
///
/// Formatted as `<unix-millis>_<9 base36 chars>`, so ids sort by creation time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct VideoId(pub String);

impl VideoId {
    /// Generate a new id stamped with the current wall-clock time.
    pub fn new() -> Self {
        Self::generate_at(Utc::now())
    }

    /// Generate an id for the given creation time.
    pub fn generate_at(created_at: DateTime<Utc>) -> Self {
        Self(format!(
            "{}_{}",
            created_at.timestamp_millis(),
            random_base36(ID_SUFFIX_LEN)
        ))
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Creation time encoded in the id prefix, if the id is well-formed.
    pub fn created_millis(&self) -> Option<i64> {
        self.0.split_once('_').and_then(|(millis, _)| millis.parse().ok())
    }
}

fn random_base36(len: usize) -> String {
    // Low bits of a v4 uuid are fully random.
    let mut n = Uuid::new_v4().as_u128();
    (0..len)
        .map(|_| {
            let c = BASE36[(n % 36) as usize] as char;
            n /= 36;
            c
        })
        .collect()
}

impl Default for VideoId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for VideoId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for VideoId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Source file details stored under `metadata`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SourceMetadata {
    /// Size of the uploaded source file in bytes
    pub file_size: u64,
    /// Process that created the record
    pub uploaded_by: String,
}

/// One ingested recording and everything derived from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VideoRecord {
    /// Unique video ID
    pub video_id: VideoId,

    /// Original file name as written by the recorder
    pub file_name: String,

    /// Locator of the uploaded source, kept raw so a malformed value
    /// fails only the video that carries it
    pub gcs_path: String,

    /// Server-assigned creation timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uploaded_at: Option<DateTime<Utc>>,

    /// Raw marker offsets in seconds, in capture order
    #[serde(default)]
    pub markers: Vec<f64>,

    #[serde(default)]
    pub has_markers: bool,

    /// Stage 1 gate
    #[serde(default)]
    pub clips_extracted: StageFlag,

    /// Stage 2 gate
    #[serde(default)]
    pub clips_combined: StageFlag,

    /// Clips derived in stage 1, in ordinal order
    #[serde(default)]
    pub clips: Vec<Clip>,

    /// Locator of the compiled highlights video
    #[serde(skip_serializing_if = "Option::is_none")]
    pub combined_video: Option<String>,

    pub metadata: SourceMetadata,
}

impl VideoRecord {
    /// Build the record written by the ingest path once the upload completed.
    pub fn uploaded(
        video_id: VideoId,
        file_name: impl Into<String>,
        source: &StorageLocator,
        file_size: u64,
        markers: Vec<f64>,
    ) -> Self {
        Self {
            video_id,
            file_name: file_name.into(),
            gcs_path: source.to_string(),
            uploaded_at: None,
            has_markers: !markers.is_empty(),
            markers,
            clips_extracted: StageFlag::default(),
            clips_combined: StageFlag::default(),
            clips: Vec::new(),
            combined_video: None,
            metadata: SourceMetadata {
                file_size,
                uploaded_by: UPLOADED_BY.to_string(),
            },
        }
    }

    /// Parse the source locator.
    pub fn source_locator(&self) -> Result<StorageLocator, LocatorError> {
        self.gcs_path.parse()
    }

    /// File name without its extension, used to name derived artifacts.
    pub fn file_stem(&self) -> &str {
        match self.file_name.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem,
            _ => &self.file_name,
        }
    }

    /// Flag for a stage. `Uploaded` is implied by the record existing.
    pub fn flag(&self, stage: Stage) -> StageFlag {
        match stage {
            Stage::Uploaded => StageFlag {
                done: true,
                completed_at: self.uploaded_at,
            },
            Stage::ClipsExtracted => self.clips_extracted.clone(),
            Stage::ClipsCombined => self.clips_combined.clone(),
        }
    }

    pub fn is_complete(&self, stage: Stage) -> bool {
        self.flag(stage).done
    }

    /// Whether the inputs a stage consumes are present.
    pub fn meets_precondition(&self, stage: Stage) -> bool {
        match stage {
            Stage::Uploaded => true,
            Stage::ClipsExtracted => !self.markers.is_empty(),
            Stage::ClipsCombined => self.clips_extracted.done && !self.clips.is_empty(),
        }
    }

    /// Whether this record can be picked up as work for `stage`.
    pub fn eligibility(&self, stage: Stage) -> Eligibility {
        if self.is_complete(stage) {
            Eligibility::AlreadyComplete
        } else if !self.meets_precondition(stage) {
            Eligibility::MissingInput
        } else {
            Eligibility::Eligible
        }
    }

    /// Check that `result` may be applied without breaking stage ordering.
    pub fn check_transition(&self, result: &StageResult) -> Result<(), TransitionError> {
        let stage = result.stage();
        if self.is_complete(stage) {
            return Err(TransitionError::AlreadyComplete(stage));
        }
        if let Some(previous) = stage.previous() {
            if !self.is_complete(previous) {
                return Err(TransitionError::OutOfOrder {
                    stage,
                    missing: previous,
                });
            }
        }
        if result.is_empty() {
            return Err(TransitionError::EmptyPayload(stage));
        }
        Ok(())
    }

    /// Apply a stage result in memory, enforcing the same rules as the store.
    pub fn apply(
        &mut self,
        result: StageResult,
        completed_at: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        self.check_transition(&result)?;
        let flag = StageFlag {
            done: true,
            completed_at: Some(completed_at),
        };
        match result {
            StageResult::ClipsExtracted { clips } => {
                self.clips = clips;
                self.clips_extracted = flag;
            }
            StageResult::ClipsCombined { combined_video } => {
                self.combined_video = Some(combined_video.to_string());
                self.clips_combined = flag;
            }
        }
        Ok(())
    }
}
