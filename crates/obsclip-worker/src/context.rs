//! Process-wide pipeline context.
//!
//! Built once at startup in a fixed order and passed explicitly:
//!
//! 1. configuration
//! 2. ffmpeg check (stage processes) or watch folder check (ingest)
//! 3. object storage client
//! 4. Firestore client and video repository
//! 5. scratch directory
//!
//! Any failure here is an initialization failure and the binary exits 1.

use std::sync::Arc;

use tracing::{debug, info};

use obsclip_firestore::{FirestoreClient, VideoRepository};
use obsclip_media::{check_ffmpeg, ensure_dir, FfmpegRunner};
use obsclip_storage::StorageClient;

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::stores::{MediaTool, ObjectStore, VideoStore};

/// What the process needs from its environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Watches the OBS folder; needs the folder, not ffmpeg
    Ingest,
    /// Runs a derivation stage; needs ffmpeg
    Stage,
}

/// Clients and configuration shared by one pipeline process.
pub struct PipelineContext {
    pub config: WorkerConfig,
    pub storage: Arc<StorageClient>,
    pub videos: Arc<VideoRepository>,
    pub media: FfmpegRunner,
}

impl PipelineContext {
    /// Build the context for `role` from `config`.
    pub async fn init(config: WorkerConfig, role: Role) -> WorkerResult<Self> {
        let mut media = FfmpegRunner::new().with_timeout(config.ffmpeg_timeout);
        match role {
            Role::Stage => {
                let ffmpeg = check_ffmpeg()?;
                debug!("Using ffmpeg at {}", ffmpeg.display());
                media = media.with_binary(ffmpeg);
            }
            Role::Ingest => {
                if !tokio::fs::metadata(&config.obs_folder)
                    .await
                    .map(|m| m.is_dir())
                    .unwrap_or(false)
                {
                    return Err(WorkerError::config_error(format!(
                        "OBS folder not found: {}",
                        config.obs_folder.display()
                    )));
                }
            }
        }

        let storage = StorageClient::from_env()?;
        info!("Object storage ready (bucket: {})", storage.bucket());

        let client = FirestoreClient::from_env()?;
        let videos = VideoRepository::new(client).with_selection_window(config.selection_window);
        info!("Firestore ready");

        ensure_dir(&config.work_dir).await?;

        Ok(Self {
            config,
            storage: Arc::new(storage),
            videos: Arc::new(videos),
            media,
        })
    }

    /// Borrow the collaborators a stage run needs.
    pub fn deps(&self) -> StageDeps<'_> {
        StageDeps {
            config: &self.config,
            objects: self.storage.as_ref(),
            videos: self.videos.as_ref(),
            media: &self.media,
        }
    }

    /// Release the context. Removes the scratch directory if it is empty.
    pub async fn shutdown(self) {
        if tokio::fs::remove_dir(&self.config.work_dir).await.is_ok() {
            debug!("Removed scratch dir {}", self.config.work_dir.display());
        }
        info!("Pipeline context shut down");
    }
}

/// Borrowed collaborators for one stage run.
#[derive(Clone, Copy)]
pub struct StageDeps<'a> {
    pub config: &'a WorkerConfig,
    pub objects: &'a dyn ObjectStore,
    pub videos: &'a dyn VideoStore,
    pub media: &'a dyn MediaTool,
}
