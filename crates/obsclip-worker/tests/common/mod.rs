//! In-memory doubles for the worker's storage, Firestore and ffmpeg seams.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use obsclip_firestore::{pick_candidate, FirestoreError, FirestoreResult, TransitionOutcome};
use obsclip_media::{MediaError, MediaResult};
use obsclip_models::{
    ClipWindow, Stage, StageResult, StorageLocator, TransitionError, VideoId, VideoRecord,
};
use obsclip_storage::{StorageError, StorageResult};
use obsclip_worker::{
    MediaTool, ObjectStore, StabilityPolicy, StageDeps, VideoStore, WorkerConfig,
};

pub const BUCKET: &str = "obs-pipeline-videos";

/// Object store keeping bodies in memory.
#[derive(Default)]
pub struct MemoryObjectStore {
    pub objects: Mutex<HashMap<String, Vec<u8>>>,
    pub metadata: Mutex<HashMap<String, Vec<(String, String)>>>,
    pub fail_uploads: Mutex<HashSet<String>>,
}

impl MemoryObjectStore {
    pub fn put(&self, key: &str, body: &[u8]) -> StorageLocator {
        self.objects.lock().unwrap().insert(key.to_string(), body.to_vec());
        StorageLocator::new(BUCKET, key)
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    pub fn remove(&self, key: &str) {
        self.objects.lock().unwrap().remove(key);
    }

    pub fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        let mut keys: Vec<_> = self
            .objects
            .lock()
            .unwrap()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    pub fn fail_upload_of(&self, key: &str) {
        self.fail_uploads.lock().unwrap().insert(key.to_string());
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn upload(
        &self,
        path: &Path,
        key: &str,
        _content_type: &str,
        metadata: &[(&str, &str)],
    ) -> StorageResult<StorageLocator> {
        if self.fail_uploads.lock().unwrap().contains(key) {
            return Err(StorageError::upload_failed(key));
        }
        let body = tokio::fs::read(path).await?;
        self.metadata.lock().unwrap().insert(
            key.to_string(),
            metadata
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        );
        Ok(self.put(key, &body))
    }

    async fn download(&self, locator: &StorageLocator, path: &Path) -> StorageResult<u64> {
        let body = self
            .get(&locator.path)
            .ok_or_else(|| StorageError::not_found(locator.to_string()))?;
        tokio::fs::write(path, &body).await?;
        Ok(body.len() as u64)
    }
}

/// Video store with the same eligibility and transition rules as Firestore.
#[derive(Default)]
pub struct MemoryVideoStore {
    /// Records in listing order
    pub records: Mutex<Vec<VideoRecord>>,
    /// Simulate another run completing the stage between select and advance
    pub race_on_advance: Mutex<bool>,
    pub advance_calls: Mutex<usize>,
    /// Make `create` fail as an unavailable backend would
    pub fail_create: Mutex<bool>,
}

impl MemoryVideoStore {
    pub fn insert(&self, mut record: VideoRecord) {
        let mut records = self.records.lock().unwrap();
        if record.uploaded_at.is_none() {
            let millis = 1_700_000_000_000 + records.len() as i64 * 1000;
            record.uploaded_at = Utc.timestamp_millis_opt(millis).single();
        }
        records.push(record);
    }

    pub fn get(&self, video_id: &VideoId) -> Option<VideoRecord> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .find(|r| &r.video_id == video_id)
            .cloned()
    }

    pub fn all(&self) -> Vec<VideoRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl VideoStore for MemoryVideoStore {
    async fn create(&self, record: &VideoRecord) -> FirestoreResult<()> {
        if *self.fail_create.lock().unwrap() {
            return Err(FirestoreError::Unavailable {
                status: 503,
                message: "backend unavailable".to_string(),
            });
        }
        if self.get(&record.video_id).is_some() {
            return Err(FirestoreError::AlreadyExists(record.video_id.to_string()));
        }
        self.insert(record.clone());
        Ok(())
    }

    async fn find_next_eligible(
        &self,
        stage: Stage,
        explicit_id: Option<&VideoId>,
    ) -> FirestoreResult<Option<VideoRecord>> {
        if let Some(id) = explicit_id {
            return Ok(self.get(id).filter(|r| r.eligibility(stage).is_eligible()));
        }
        Ok(pick_candidate(stage, self.all()))
    }

    async fn advance_stage(
        &self,
        video_id: &VideoId,
        result: StageResult,
    ) -> FirestoreResult<TransitionOutcome> {
        *self.advance_calls.lock().unwrap() += 1;
        let mut records = self.records.lock().unwrap();
        let record = records
            .iter_mut()
            .find(|r| &r.video_id == video_id)
            .ok_or_else(|| FirestoreError::NotFound(video_id.to_string()))?;

        if *self.race_on_advance.lock().unwrap() {
            return Ok(TransitionOutcome::LostRace);
        }

        match record.apply(result, Utc::now()) {
            Ok(()) => Ok(TransitionOutcome::Advanced),
            Err(TransitionError::AlreadyComplete(_)) => Ok(TransitionOutcome::LostRace),
            Err(e) => Err(e.into()),
        }
    }
}

/// Media tool that writes marker text instead of video.
#[derive(Default)]
pub struct FakeMedia {
    pub windows: Mutex<Vec<ClipWindow>>,
    /// Window starts for which extraction fails
    pub fail_starts: Mutex<Vec<f64>>,
    pub concat_inputs: Mutex<Vec<Vec<PathBuf>>>,
}

#[async_trait]
impl MediaTool for FakeMedia {
    async fn extract_clip(&self, input: &Path, output: &Path, window: ClipWindow) -> MediaResult<()> {
        self.windows.lock().unwrap().push(window);
        if self.fail_starts.lock().unwrap().contains(&window.start) {
            return Err(MediaError::ffmpeg_failed(
                "FFmpeg exited with non-zero status",
                Some("Invalid data found when processing input".to_string()),
                Some(1),
            ));
        }
        if !input.exists() {
            return Err(MediaError::FileNotFound(input.to_path_buf()));
        }
        tokio::fs::write(output, format!("[{}+{}]", window.start, window.duration)).await?;
        Ok(())
    }

    async fn concat(&self, inputs: &[PathBuf], output: &Path) -> MediaResult<()> {
        self.concat_inputs.lock().unwrap().push(inputs.to_vec());
        let mut body = Vec::new();
        for input in inputs {
            body.extend(tokio::fs::read(input).await?);
        }
        tokio::fs::write(output, body).await?;
        Ok(())
    }
}

/// Collaborators plus a scratch dir, torn down with the test.
pub struct Harness {
    pub config: WorkerConfig,
    pub objects: MemoryObjectStore,
    pub videos: MemoryVideoStore,
    pub media: FakeMedia,
    pub dir: tempfile::TempDir,
}

impl Harness {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config = WorkerConfig {
            obs_folder: dir.path().join("obs"),
            marker_file: dir.path().join("markers.txt"),
            work_dir: dir.path().join("work"),
            min_file_size_bytes: 0,
            stability: StabilityPolicy {
                debounce_window: Duration::from_millis(200),
                poll_interval: Duration::from_millis(10),
                required_consecutive: 3,
            },
            ..WorkerConfig::default()
        };
        std::fs::create_dir_all(&config.obs_folder).unwrap();

        Self {
            config,
            objects: MemoryObjectStore::default(),
            videos: MemoryVideoStore::default(),
            media: FakeMedia::default(),
            dir,
        }
    }

    pub fn deps(&self) -> StageDeps<'_> {
        StageDeps {
            config: &self.config,
            objects: &self.objects,
            videos: &self.videos,
            media: &self.media,
        }
    }

    /// Upload a fake source and record it with `markers`.
    pub fn seed_video(&self, file_name: &str, markers: Vec<f64>) -> VideoId {
        let source = self
            .objects
            .put(&format!("videos/{}", file_name), b"source-bytes");
        let record = VideoRecord::uploaded(VideoId::new(), file_name, &source, 12, markers);
        let id = record.video_id.clone();
        self.videos.insert(record);
        id
    }

    /// Scratch directory exists and holds nothing.
    pub fn scratch_is_clean(&self) -> bool {
        match std::fs::read_dir(&self.config.work_dir) {
            Ok(mut entries) => entries.next().is_none(),
            Err(_) => true,
        }
    }
}
