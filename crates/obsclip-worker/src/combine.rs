//! Compilation: join a record's clips into one highlights video.

use std::path::{Path, PathBuf};

use tracing::Instrument;

use obsclip_firestore::TransitionOutcome;
use obsclip_media::{ensure_dir, remove_dir_quietly};
use obsclip_models::{
    combined_file_name, BatchOutcome, ItemOutcome, Stage, StageResult, StorageLocator, VideoId,
    VideoRecord,
};
use obsclip_storage::{content_type_for, final_key};

use crate::context::StageDeps;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::StageLogger;
use crate::metrics;
use crate::run::StageRun;

const STAGE: Stage = Stage::ClipsCombined;

/// One clip fetched into the scratch directory.
#[derive(Debug, Clone, PartialEq)]
pub struct ClipDownload {
    pub clip_index: u32,
    pub path: PathBuf,
}

/// Result of [`combine`].
#[derive(Debug)]
pub struct Compilation {
    pub downloads: BatchOutcome<ClipDownload>,
    /// Uploaded highlights video; `None` when no clip could be downloaded
    pub combined: Option<StorageLocator>,
}

/// Select one record, build its highlights video and advance it.
pub async fn run_combine(deps: StageDeps<'_>, explicit_id: Option<&VideoId>) -> WorkerResult<StageRun> {
    let Some(record) = deps.videos.find_next_eligible(STAGE, explicit_id).await? else {
        return Ok(StageRun::Idle);
    };

    let logger = StageLogger::new(&record.video_id, STAGE);
    let span = logger.create_span();
    Ok(combine_and_advance(deps, &record, &logger).instrument(span).await)
}

async fn combine_and_advance(deps: StageDeps<'_>, record: &VideoRecord, logger: &StageLogger) -> StageRun {
    let video_id = &record.video_id;
    logger.log_start(&format!("{} clip(s) to combine", record.clips.len()));

    let compilation = match combine(deps, record).await {
        Ok(compilation) => compilation,
        Err(e) => return StageRun::failed(video_id, STAGE, e),
    };

    let failed = compilation.downloads.failed_count();
    let Some(combined_video) = compilation.combined else {
        return StageRun::failed(
            video_id,
            STAGE,
            WorkerError::no_output(STAGE, "no clip could be downloaded"),
        );
    };
    let succeeded = compilation.downloads.succeeded().count();

    match deps
        .videos
        .advance_stage(video_id, StageResult::ClipsCombined { combined_video })
        .await
    {
        Ok(TransitionOutcome::Advanced) => {
            logger.log_completion(&format!("combined {} clip(s), {} dropped", succeeded, failed));
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

/// Download the clips in stored order, concatenate and upload the result.
pub async fn combine(deps: StageDeps<'_>, record: &VideoRecord) -> WorkerResult<Compilation> {
    let scratch = deps.config.scratch_dir(&record.video_id, STAGE);
    ensure_dir(&scratch).await?;

    let result = combine_in(deps, record, &scratch).await;
    remove_dir_quietly(&scratch).await;
    result
}

async fn combine_in(deps: StageDeps<'_>, record: &VideoRecord, scratch: &Path) -> WorkerResult<Compilation> {
    let logger = StageLogger::new(&record.video_id, STAGE);

    let mut items = Vec::with_capacity(record.clips.len());
    for clip in &record.clips {
        let path = scratch.join(&clip.file_name);
        let fetched = async {
            let locator: StorageLocator = clip.gcs_path.parse()?;
            deps.objects.download(&locator, &path).await?;
            Ok::<_, WorkerError>(())
        }
        .await;

        match fetched {
            Ok(()) => items.push(ItemOutcome::Succeeded {
                index: clip.clip_index,
                value: ClipDownload {
                    clip_index: clip.clip_index,
                    path,
                },
            }),
            Err(e) => {
                metrics::record_item_failed(STAGE);
                logger.log_warning(clip.clip_index, &format!("Clip dropped: {}", e));
                items.push(ItemOutcome::Failed {
                    index: clip.clip_index,
                    error: e.to_string(),
                });
            }
        }
    }

    let downloads = BatchOutcome::from_items(items);
    if !downloads.has_successes() {
        return Ok(Compilation {
            downloads,
            combined: None,
        });
    }

    let inputs: Vec<PathBuf> = downloads.succeeded().map(|d| d.path.clone()).collect();
    let file_name = combined_file_name(&record.file_name);
    let output = scratch.join(&file_name);

    logger.log_progress(&format!("Concatenating {} clip(s)", inputs.len()));
    deps.media.concat(&inputs, &output).await?;

    let locator = deps
        .objects
        .upload(
            &output,
            &final_key(&record.video_id, &file_name),
            content_type_for(&output),
            &[],
        )
        .await?;
    logger.log_progress(&format!("Uploaded {}", locator));

    Ok(Compilation {
        downloads,
        combined: Some(locator),
    })
}
