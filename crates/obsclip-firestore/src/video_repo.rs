//! Typed repository for the `videos` collection.
//!
//! Records move through `uploaded -> clipsExtracted -> clipsCombined`.
//! Every stage write is conditional on the document's `updateTime` from a
//! read made just before it, so two runs racing on the same record cannot
//! both apply a result.

use std::collections::HashMap;

use tracing::{debug, info, warn};

use obsclip_models::{
    Clip, Eligibility, SourceMetadata, Stage, StageFlag, StageResult, StorageLocator, VideoId,
    VideoRecord,
};

use crate::client::FirestoreClient;
use crate::error::{FirestoreError, FirestoreResult};
use crate::metrics::record_transition;
use crate::wire::{Document, Fields, Precondition, StructuredQuery, Value, Write};

/// Collection holding one document per ingested recording.
pub const VIDEOS_COLLECTION: &str = "videos";

/// Records inspected per auto-selection query.
pub const DEFAULT_SELECTION_WINDOW: u32 = 10;

/// Reads + conditional writes attempted before giving up on a contended record.
const MAX_TRANSITION_ATTEMPTS: u32 = 3;

/// Result of a conditional stage write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// This call set the flag.
    Advanced,
    /// Another writer set the flag first; nothing was written.
    LostRace,
}

impl TransitionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransitionOutcome::Advanced => "advanced",
            TransitionOutcome::LostRace => "lost_race",
        }
    }
}

/// Repository for video documents.
#[derive(Clone)]
pub struct VideoRepository {
    client: FirestoreClient,
    selection_window: u32,
}

impl VideoRepository {
    /// Create a new video repository.
    pub fn new(client: FirestoreClient) -> Self {
        Self {
            client,
            selection_window: DEFAULT_SELECTION_WINDOW,
        }
    }

    /// Override how many records an auto-selection query inspects.
    pub fn with_selection_window(mut self, window: u32) -> Self {
        self.selection_window = window.max(1);
        self
    }

    fn document_name(&self, video_id: &VideoId) -> String {
        self.client
            .full_document_name(VIDEOS_COLLECTION, video_id.as_str())
    }

    /// Create the record for a freshly uploaded source.
    ///
    /// Fails with `AlreadyExists` rather than overwrite an existing record.
    pub async fn create(&self, record: &VideoRecord) -> FirestoreResult<()> {
        let writes = [Write::update(Document::named(
            self.document_name(&record.video_id),
            record_to_fields(record),
        ))
        .stamp("uploadedAt")
        .when(Precondition::Exists(false))];

        self.client
            .with_retry("create_video", || self.client.batch_write(&writes))
            .await?;

        info!(
            video_id = %record.video_id,
            markers = record.markers.len(),
            "Created video record"
        );
        Ok(())
    }

    /// Get a video by ID.
    pub async fn get(&self, video_id: &VideoId) -> FirestoreResult<Option<VideoRecord>> {
        Ok(self.get_versioned(video_id).await?.map(|(record, _)| record))
    }

    /// Get a video together with the document's `updateTime`.
    async fn get_versioned(
        &self,
        video_id: &VideoId,
    ) -> FirestoreResult<Option<(VideoRecord, Option<String>)>> {
        let doc = self
            .client
            .with_retry("get_video", || {
                self.client
                    .get_document(VIDEOS_COLLECTION, video_id.as_str())
            })
            .await?;

        match doc {
            Some(d) => {
                let record = document_to_record(&d, Some(video_id))?;
                Ok(Some((record, d.update_time)))
            }
            None => Ok(None),
        }
    }

    /// Records matching the stage's input filter, in listing order.
    pub async fn list_candidates(&self, stage: Stage) -> FirestoreResult<Vec<VideoRecord>> {
        let Some(field) = input_field(stage) else {
            return Ok(Vec::new());
        };

        let query = StructuredQuery::collection(VIDEOS_COLLECTION)
            .where_equal(field, true)
            .limit(self.selection_window);

        let docs = self
            .client
            .with_retry("query_videos", || self.client.run_query(&query))
            .await?;

        let mut records = Vec::with_capacity(docs.len());
        for doc in &docs {
            match document_to_record(doc, None) {
                Ok(record) => records.push(record),
                Err(e) => warn!(
                    document = doc.name.as_deref().unwrap_or("?"),
                    "Skipping unreadable video document: {}", e
                ),
            }
        }
        Ok(records)
    }

    /// Pick the next record to process for `stage`.
    ///
    /// With an explicit id the record is returned only if it is eligible;
    /// otherwise the reason is logged and `None` is returned.
    pub async fn find_next_eligible(
        &self,
        stage: Stage,
        explicit_id: Option<&VideoId>,
    ) -> FirestoreResult<Option<VideoRecord>> {
        if let Some(video_id) = explicit_id {
            let Some(record) = self.get(video_id).await? else {
                info!(video_id = %video_id, stage = %stage, "Video not found");
                return Ok(None);
            };

            return match record.eligibility(stage) {
                Eligibility::Eligible => Ok(Some(record)),
                Eligibility::AlreadyComplete => {
                    info!(video_id = %video_id, stage = %stage, "Stage already complete, nothing to do");
                    Ok(None)
                }
                Eligibility::MissingInput => {
                    info!(video_id = %video_id, stage = %stage, "Video has no input for this stage");
                    Ok(None)
                }
            };
        }

        let candidates = self.list_candidates(stage).await?;
        let inspected = candidates.len();
        let picked = pick_candidate(stage, candidates);

        if picked.is_none() {
            info!(stage = %stage, inspected, "No eligible videos found");
        }
        Ok(picked)
    }

    /// Atomically mark `result`'s stage complete and store its output.
    ///
    /// Returns `LostRace` if the flag is already set, either before the
    /// write or by a concurrent writer that beat this one.
    pub async fn advance_stage(
        &self,
        video_id: &VideoId,
        result: StageResult,
    ) -> FirestoreResult<TransitionOutcome> {
        let stage = result.stage();

        for attempt in 1..=MAX_TRANSITION_ATTEMPTS {
            let (record, update_time) = self
                .get_versioned(video_id)
                .await?
                .ok_or_else(|| {
                    FirestoreError::not_found(format!("{}/{}", VIDEOS_COLLECTION, video_id))
                })?;

            if record.is_complete(stage) {
                info!(video_id = %video_id, stage = %stage, "Stage already set by another run");
                record_transition(stage.as_str(), TransitionOutcome::LostRace.as_str());
                return Ok(TransitionOutcome::LostRace);
            }
            record.check_transition(&result)?;

            let precondition = match update_time {
                Some(ts) => Precondition::UpdateTime(ts),
                None => Precondition::Exists(true),
            };
            let writes = [transition_write(self.document_name(video_id), &result, precondition)];

            let written = self
                .client
                .with_retry("advance_stage", || self.client.batch_write(&writes))
                .await;

            match written {
                Ok(_) => {
                    info!(video_id = %video_id, stage = %stage, "Advanced video stage");
                    record_transition(stage.as_str(), TransitionOutcome::Advanced.as_str());
                    return Ok(TransitionOutcome::Advanced);
                }
                Err(e) if e.is_precondition_failed() => {
                    debug!(
                        video_id = %video_id,
                        stage = %stage,
                        attempt,
                        "Stage write precondition failed, re-reading"
                    );
                    tokio::time::sleep(std::time::Duration::from_millis(50 * attempt as u64))
                        .await;
                }
                Err(e) => return Err(e),
            }
        }

        warn!(
            video_id = %video_id,
            stage = %stage,
            "Stage write kept losing to unrelated edits after {} attempts",
            MAX_TRANSITION_ATTEMPTS
        );
        Err(FirestoreError::PreconditionFailed(format!(
            "{}/{}: gave up after {} attempts",
            VIDEOS_COLLECTION, video_id, MAX_TRANSITION_ATTEMPTS
        )))
    }
}

// ============================================================================
// Selection
// ============================================================================

/// Boolean field the selection query filters on.
fn input_field(stage: Stage) -> Option<&'static str> {
    match stage {
        Stage::Uploaded => None,
        Stage::ClipsExtracted => Some("hasMarkers"),
        Stage::ClipsCombined => Some("clipsExtracted"),
    }
}

/// Choose among queried records.
///
/// Extraction is FIFO in listing order. Combination takes the newest
/// `uploadedAt`; on ties the later listing position wins.
pub fn pick_candidate(stage: Stage, candidates: Vec<VideoRecord>) -> Option<VideoRecord> {
    let mut eligible = candidates
        .into_iter()
        .filter(|r| r.eligibility(stage).is_eligible());

    match stage {
        Stage::Uploaded => None,
        Stage::ClipsExtracted => eligible.next(),
        // max_by_key keeps the last of equal maxima
        Stage::ClipsCombined => eligible.max_by_key(|r| r.uploaded_at),
    }
}

// ============================================================================
// Document conversion
// ============================================================================

fn clip_to_value(clip: &Clip) -> Value {
    Value::map(Fields::from([
        ("markerTime".to_string(), clip.marker_time.into()),
        ("clipIndex".to_string(), clip.clip_index.into()),
        ("gcsPath".to_string(), clip.gcs_path.as_str().into()),
        ("fileName".to_string(), clip.file_name.as_str().into()),
        ("duration".to_string(), clip.duration.into()),
    ]))
}

/// A bare file name, usable as a scratch path component.
fn usable_file_name(name: &str) -> Option<&str> {
    let name = name.trim();
    let bare = !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\']);
    bare.then_some(name)
}

/// Clips without a usable name, from `fileName` or the locator, are unreadable.
fn value_to_clip(value: &Value) -> Option<Clip> {
    let fields = value.as_map()?;
    let clip_index = fields.get("clipIndex").and_then(Value::as_u64)?;
    let gcs_path = fields.get("gcsPath").and_then(Value::as_str)?;
    let file_name = fields
        .get("fileName")
        .and_then(Value::as_str)
        .and_then(usable_file_name)
        .map(str::to_string)
        .or_else(|| {
            let locator = gcs_path.parse::<StorageLocator>().ok()?;
            usable_file_name(locator.file_name()).map(str::to_string)
        })?;
    Some(Clip {
        marker_time: fields.get("markerTime").and_then(Value::as_f64)?,
        clip_index: u32::try_from(clip_index).ok()?,
        gcs_path: gcs_path.to_string(),
        file_name,
        duration: fields
            .get("duration")
            .and_then(Value::as_f64)
            .unwrap_or_default(),
    })
}

/// Fields written when a record is created. `uploadedAt` is set by a server transform.
pub(crate) fn record_to_fields(record: &VideoRecord) -> Fields {
    let mut fields = Fields::from([
        ("videoId".to_string(), record.video_id.as_str().into()),
        ("fileName".to_string(), record.file_name.as_str().into()),
        ("gcsPath".to_string(), record.gcs_path.as_str().into()),
        ("clipsExtracted".to_string(), record.clips_extracted.done.into()),
        ("clipsCombined".to_string(), record.clips_combined.done.into()),
        (
            "metadata".to_string(),
            Value::map(Fields::from([
                ("fileSize".to_string(), record.metadata.file_size.into()),
                ("uploadedBy".to_string(), record.metadata.uploaded_by.as_str().into()),
            ])),
        ),
    ]);

    if !record.markers.is_empty() {
        fields.insert("markers".to_string(), record.markers.clone().into());
        fields.insert("hasMarkers".to_string(), true.into());
    }
    fields
}

/// Build the conditional write for one stage result.
fn transition_write(name: String, result: &StageResult, precondition: Precondition) -> Write {
    let (fields, mask, stamp) = match result {
        StageResult::ClipsExtracted { clips } => (
            Fields::from([
                ("clipsExtracted".to_string(), true.into()),
                ("clips".to_string(), Value::array(clips.iter().map(clip_to_value))),
                ("clipsCount".to_string(), (clips.len() as u64).into()),
            ]),
            ["clipsExtracted", "clips", "clipsCount"].as_slice(),
            "clipsExtractedAt",
        ),
        StageResult::ClipsCombined { combined_video } => (
            Fields::from([
                ("clipsCombined".to_string(), true.into()),
                ("combinedVideo".to_string(), combined_video.to_string().into()),
            ]),
            ["clipsCombined", "combinedVideo"].as_slice(),
            "clipsCombinedAt",
        ),
    };

    Write::update(Document::named(name, fields))
        .masked(mask.iter().copied())
        .stamp(stamp)
        .when(precondition)
}

fn document_to_record(doc: &Document, video_id: Option<&VideoId>) -> FirestoreResult<VideoRecord> {
    if doc.fields.is_empty() {
        return Err(FirestoreError::invalid_response("Document has no fields"));
    }

    let text = |key: &str| doc.get(key).and_then(Value::as_str).map(str::to_string);
    let flag = |key: &str| doc.get(key).and_then(Value::as_bool).unwrap_or(false);
    let time = |key: &str| doc.get(key).and_then(Value::as_timestamp);

    let video_id = match video_id {
        Some(id) => id.clone(),
        None => text("videoId")
            .or_else(|| doc.id().map(str::to_string))
            .map(VideoId::from_string)
            .ok_or_else(|| FirestoreError::invalid_response("Video document has no id"))?,
    };

    let markers: Vec<f64> = doc
        .get("markers")
        .and_then(Value::as_array)
        .map(|values| values.iter().filter_map(Value::as_f64).collect())
        .unwrap_or_default();

    let clips: Vec<Clip> = doc
        .get("clips")
        .and_then(Value::as_array)
        .map(|values| values.iter().filter_map(value_to_clip).collect())
        .unwrap_or_default();

    let metadata = doc.get("metadata").and_then(Value::as_map);
    let metadata_field = |key: &str| metadata.and_then(|m| m.get(key));

    Ok(VideoRecord {
        video_id,
        file_name: text("fileName").unwrap_or_default(),
        gcs_path: text("gcsPath").unwrap_or_default(),
        uploaded_at: time("uploadedAt"),
        has_markers: flag("hasMarkers"),
        markers,
        clips_extracted: StageFlag {
            done: flag("clipsExtracted"),
            completed_at: time("clipsExtractedAt"),
        },
        clips_combined: StageFlag {
            done: flag("clipsCombined"),
            completed_at: time("clipsCombinedAt"),
        },
        clips,
        combined_video: text("combinedVideo"),
        metadata: SourceMetadata {
            file_size: metadata_field("fileSize")
                .and_then(Value::as_u64)
                .unwrap_or(0),
            uploaded_by: metadata_field("uploadedBy")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        },
    })
}
