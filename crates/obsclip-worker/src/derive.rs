//! Clip derivation: cut one clip per marker and advance to `clipsExtracted`.

use std::path::Path;

use tracing::Instrument;

use obsclip_firestore::TransitionOutcome;
use obsclip_media::{ensure_dir, remove_dir_quietly, remove_quietly};
use obsclip_models::{
    clip_file_name, BatchOutcome, Clip, ClipWindow, ItemOutcome, Stage, StageResult,
    StorageLocator, VideoId, VideoRecord,
};
use obsclip_storage::{clip_key, content_type_for};

use crate::context::StageDeps;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::StageLogger;
use crate::metrics;
use crate::run::StageRun;

const STAGE: Stage = Stage::ClipsExtracted;

/// Select one record, derive its clips and advance it.
///
/// `Err` is reserved for failures outside any single video (the selection
/// query); per-video failures come back as [`StageRun::Failed`].
pub async fn run_extract(deps: StageDeps<'_>, explicit_id: Option<&VideoId>) -> WorkerResult<StageRun> {
    let Some(record) = deps.videos.find_next_eligible(STAGE, explicit_id).await? else {
        return Ok(StageRun::Idle);
    };

    let logger = StageLogger::new(&record.video_id, STAGE);
    let span = logger.create_span();
    Ok(extract_and_advance(deps, &record, &logger).instrument(span).await)
}

async fn extract_and_advance(deps: StageDeps<'_>, record: &VideoRecord, logger: &StageLogger) -> StageRun {
    let video_id = &record.video_id;
    logger.log_start(&format!(
        "{} with {} marker(s)",
        record.file_name,
        record.markers.len()
    ));

    let outcome = match derive_clips(deps, record).await {
        Ok(outcome) => outcome,
        Err(e) => return StageRun::failed(video_id, STAGE, e),
    };

    let failed = outcome.failed_count();
    if !outcome.has_successes() {
        return StageRun::failed(
            video_id,
            STAGE,
            WorkerError::no_output(STAGE, format!("all {} marker(s) failed", failed)),
        );
    }

    let clips = outcome.into_succeeded();
    let succeeded = clips.len();

    match deps
        .videos
        .advance_stage(video_id, StageResult::ClipsExtracted { clips })
        .await
    {
        Ok(TransitionOutcome::Advanced) => {
            logger.log_completion(&format!("{} clip(s), {} failed", succeeded, failed));
            StageRun::Advanced {
                video_id: video_id.clone(),
                stage: STAGE,
                succeeded,
                failed,
            }
        }
        Ok(TransitionOutcome::LostRace) => StageRun::LostRace {
            video_id: video_id.clone(),
            stage: STAGE,
        },
        Err(e) => StageRun::failed(video_id, STAGE, e),
    }
}

/// Cut and upload one clip per marker, in stored order.
///
/// Individual markers fail independently. Local files are removed on every
/// exit path.
pub async fn derive_clips(deps: StageDeps<'_>, record: &VideoRecord) -> WorkerResult<BatchOutcome<Clip>> {
    let source = record.source_locator()?;
    let scratch = deps.config.scratch_dir(&record.video_id, STAGE);
    ensure_dir(&scratch).await?;

    let result = extract_all(deps, record, &source, &scratch).await;
    remove_dir_quietly(&scratch).await;
    result
}

async fn extract_all(
    deps: StageDeps<'_>,
    record: &VideoRecord,
    source: &StorageLocator,
    scratch: &Path,
) -> WorkerResult<BatchOutcome<Clip>> {
    let logger = StageLogger::new(&record.video_id, STAGE);
    let local_source = scratch.join(&record.file_name);

    logger.log_progress(&format!("Downloading source {}", source));
    deps.objects.download(source, &local_source).await?;

    let mut items = Vec::with_capacity(record.markers.len());
    for (i, &marker) in record.markers.iter().enumerate() {
        let clip_index = (i + 1) as u32;

        match extract_one(deps, record, &local_source, scratch, clip_index, marker).await {
            Ok(clip) => {
                metrics::record_clip_extracted();
                logger.log_progress(&format!("Clip {} uploaded to {}", clip_index, clip.gcs_path));
                items.push(ItemOutcome::Succeeded {
                    index: clip_index,
                    value: clip,
                });
            }
            Err(e) => {
                metrics::record_item_failed(STAGE);
                logger.log_warning(clip_index, &format!("Marker at {:.2}s skipped: {}", marker, e));
                items.push(ItemOutcome::Failed {
                    index: clip_index,
                    error: e.to_string(),
                });
            }
        }
    }

    remove_quietly(&local_source).await;
    Ok(BatchOutcome::from_items(items))
}

async fn extract_one(
    deps: StageDeps<'_>,
    record: &VideoRecord,
    local_source: &Path,
    scratch: &Path,
    clip_index: u32,
    marker: f64,
) -> WorkerResult<Clip> {
    let config = deps.config;
    let window = ClipWindow::around(marker, config.clip_before_secs, config.clip_after_secs);
    let file_name = clip_file_name(&record.file_name, clip_index, marker);
    let local_clip = scratch.join(&file_name);

    let result = async {
        deps.media.extract_clip(local_source, &local_clip, window).await?;

        let key = clip_key(&record.video_id, &file_name);
        let locator = deps
            .objects
            .upload(&local_clip, &key, content_type_for(&local_clip), &[])
            .await?;

        Ok::<_, WorkerError>(Clip {
            marker_time: marker,
            clip_index,
            gcs_path: locator.to_string(),
            file_name: file_name.clone(),
            duration: window.duration,
        })
    }
    .await;

    remove_quietly(&local_clip).await;
    result
}
