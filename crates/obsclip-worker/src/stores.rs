//! Seams between the stages and their external collaborators.
//!
//! The production implementations wrap the storage, Firestore and ffmpeg
//! clients; tests substitute in-memory fakes.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use obsclip_firestore::{FirestoreResult, TransitionOutcome, VideoRepository};
use obsclip_media::{concat_clips, extract_clip, FfmpegRunner, MediaResult};
use obsclip_models::{ClipWindow, Stage, StageResult, StorageLocator, VideoId, VideoRecord};
use obsclip_storage::{StorageClient, StorageResult};

/// Object storage used for sources, clips and finals.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn upload(
        &self,
        path: &Path,
        key: &str,
        content_type: &str,
        metadata: &[(&str, &str)],
    ) -> StorageResult<StorageLocator>;

    async fn download(&self, locator: &StorageLocator, path: &Path) -> StorageResult<u64>;
}

/// Persistence for video records.
#[async_trait]
pub trait VideoStore: Send + Sync {
    async fn create(&self, record: &VideoRecord) -> FirestoreResult<()>;

    async fn find_next_eligible(
        &self,
        stage: Stage,
        explicit_id: Option<&VideoId>,
    ) -> FirestoreResult<Option<VideoRecord>>;

    async fn advance_stage(
        &self,
        video_id: &VideoId,
        result: StageResult,
    ) -> FirestoreResult<TransitionOutcome>;
}

/// Stream-copy media operations.
#[async_trait]
pub trait MediaTool: Send + Sync {
    async fn extract_clip(&self, input: &Path, output: &Path, window: ClipWindow) -> MediaResult<()>;

    async fn concat(&self, inputs: &[PathBuf], output: &Path) -> MediaResult<()>;
}

#[async_trait]
impl ObjectStore for StorageClient {
    async fn upload(
        &self,
        path: &Path,
        key: &str,
        content_type: &str,
        metadata: &[(&str, &str)],
    ) -> StorageResult<StorageLocator> {
        self.upload_file(path, key, content_type, metadata).await
    }

    async fn download(&self, locator: &StorageLocator, path: &Path) -> StorageResult<u64> {
        self.download_file(locator, path).await
    }
}

#[async_trait]
impl VideoStore for VideoRepository {
    async fn create(&self, record: &VideoRecord) -> FirestoreResult<()> {
        VideoRepository::create(self, record).await
    }

    async fn find_next_eligible(
        &self,
        stage: Stage,
        explicit_id: Option<&VideoId>,
    ) -> FirestoreResult<Option<VideoRecord>> {
        VideoRepository::find_next_eligible(self, stage, explicit_id).await
    }

    async fn advance_stage(
        &self,
        video_id: &VideoId,
        result: StageResult,
    ) -> FirestoreResult<TransitionOutcome> {
        VideoRepository::advance_stage(self, video_id, result).await
    }
}

#[async_trait]
impl MediaTool for FfmpegRunner {
    async fn extract_clip(&self, input: &Path, output: &Path, window: ClipWindow) -> MediaResult<()> {
        extract_clip(self, input, output, window).await
    }

    async fn concat(&self, inputs: &[PathBuf], output: &Path) -> MediaResult<()> {
        concat_clips(self, inputs, output).await
    }
}
