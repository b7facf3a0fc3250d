//! Ingest watcher: upload finished OBS recordings and create their records.
//!
//! Filesystem events are filtered by name, deduplicated through an
//! [`InFlightSet`], debounced with the stability detector and then handed
//! to [`Ingestor::ingest_file`].

use std::collections::{HashMap, HashSet};
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use notify::event::ModifyKind;
use notify::{Event, EventKind, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use obsclip_models::{VideoId, VideoRecord, UPLOADED_BY};
use obsclip_storage::{content_type_for, source_key};

use crate::config::WorkerConfig;
use crate::error::WorkerResult;
use crate::markers::read_markers;
use crate::metrics;
use crate::stability::{is_stable_with, FsProbe, SizeProbe};
use crate::stores::{ObjectStore, VideoStore};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Lexically normalize a path so repeated events for one file compare equal.
fn normalize(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

// =============================================================================
// In-flight set
// =============================================================================

/// Paths currently being ingested, each with a "changed since claimed" mark.
#[derive(Debug, Clone, Default)]
pub struct InFlightSet {
    paths: Arc<Mutex<HashMap<PathBuf, bool>>>,
}

impl InFlightSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `path`; `None` if another task already holds it, in which case
    /// the holder's entry is marked changed.
    pub fn try_acquire(&self, path: &Path) -> Option<InFlightGuard> {
        let path = normalize(path);
        let mut paths = lock(&self.paths);
        if let Some(changed) = paths.get_mut(&path) {
            *changed = true;
            return None;
        }
        paths.insert(path.clone(), false);
        Some(InFlightGuard {
            paths: Arc::clone(&self.paths),
            path,
            held: true,
        })
    }

    /// Record a filesystem event for `path`. Returns `true` when a holder
    /// exists and will see the change.
    pub fn mark_changed(&self, path: &Path) -> bool {
        match lock(&self.paths).get_mut(&normalize(path)) {
            Some(changed) => {
                *changed = true;
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, path: &Path) -> bool {
        lock(&self.paths).contains_key(&normalize(path))
    }

    pub fn len(&self) -> usize {
        lock(&self.paths).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Membership in an [`InFlightSet`]; released on drop.
#[derive(Debug)]
pub struct InFlightGuard {
    paths: Arc<Mutex<HashMap<PathBuf, bool>>>,
    path: PathBuf,
    held: bool,
}

impl InFlightGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Release the path unless an event arrived since the last check.
    ///
    /// Returns `false` and clears the mark when the path changed; the holder
    /// keeps it. The check and the removal happen under one lock, so no
    /// event can slip in between.
    pub fn release_unless_changed(&mut self) -> bool {
        let mut paths = lock(&self.paths);
        match paths.get_mut(&self.path) {
            Some(changed) if *changed => {
                *changed = false;
                false
            }
            _ => {
                paths.remove(&self.path);
                self.held = false;
                true
            }
        }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.held {
            lock(&self.paths).remove(&self.path);
        }
    }
}

// =============================================================================
// Ledger
// =============================================================================

/// `(path, size)` pairs already uploaded by this process.
#[derive(Debug, Default)]
pub struct IngestLedger {
    seen: Mutex<HashSet<(PathBuf, u64)>>,
}

impl IngestLedger {
    pub fn contains(&self, path: &Path, size: u64) -> bool {
        lock(&self.seen).contains(&(normalize(path), size))
    }

    pub fn record(&self, path: &Path, size: u64) {
        lock(&self.seen).insert((normalize(path), size));
    }
}

// =============================================================================
// Filter
// =============================================================================

/// Name-based filter applied before touching the file.
#[derive(Debug, Clone)]
pub struct IngestFilter {
    extensions: Vec<String>,
}

impl IngestFilter {
    pub fn new(extensions: &[String]) -> Self {
        Self {
            extensions: extensions.iter().map(|e| e.to_lowercase()).collect(),
        }
    }

    /// Hidden files and `.DS_Store` are rejected; the extension must match
    /// case-insensitively.
    pub fn accepts(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        if name.starts_with('.') {
            return false;
        }
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            return false;
        };
        let ext = format!(".{}", ext.to_lowercase());
        self.extensions.iter().any(|allowed| *allowed == ext)
    }
}

/// Whether a watcher event should trigger ingestion.
pub fn is_ingest_event(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Modify(ModifyKind::Data(_))
    )
}

// =============================================================================
// Ingestor
// =============================================================================

/// Why a file was not ingested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Filtered,
    InFlight,
    Missing,
    TooSmall,
    AlreadyIngested,
    Unstable,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::Filtered => "filtered",
            SkipReason::InFlight => "in_flight",
            SkipReason::Missing => "missing",
            SkipReason::TooSmall => "too_small",
            SkipReason::AlreadyIngested => "already_ingested",
            SkipReason::Unstable => "unstable",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    Skipped(SkipReason),
    Uploaded { video_id: VideoId, markers: usize },
}

/// Uploads stable recordings and creates their Stage-0 records.
pub struct Ingestor {
    config: WorkerConfig,
    filter: IngestFilter,
    objects: Arc<dyn ObjectStore>,
    videos: Arc<dyn VideoStore>,
    probe: Arc<dyn SizeProbe>,
    in_flight: InFlightSet,
    ledger: IngestLedger,
}

impl Ingestor {
    pub fn new(config: WorkerConfig, objects: Arc<dyn ObjectStore>, videos: Arc<dyn VideoStore>) -> Self {
        Self {
            filter: IngestFilter::new(&config.watch_extensions),
            config,
            objects,
            videos,
            probe: Arc::new(FsProbe),
            in_flight: InFlightSet::new(),
            ledger: IngestLedger::default(),
        }
    }

    pub fn in_flight(&self) -> &InFlightSet {
        &self.in_flight
    }

    /// Ingest one file if it passes every check.
    pub async fn ingest_file(&self, path: &Path) -> WorkerResult<IngestOutcome> {
        let outcome = self.try_ingest(path).await;
        if let Ok(IngestOutcome::Skipped(reason)) = &outcome {
            metrics::record_ingest_skipped(reason.as_str());
        }
        outcome
    }

    async fn try_ingest(&self, path: &Path) -> WorkerResult<IngestOutcome> {
        if !self.filter.accepts(path) {
            return Ok(IngestOutcome::Skipped(SkipReason::Filtered));
        }

        let Some(mut guard) = self.in_flight.try_acquire(path) else {
            return Ok(IngestOutcome::Skipped(SkipReason::InFlight));
        };

        let Ok(size) = self.probe.size(path).await else {
            return Ok(IngestOutcome::Skipped(SkipReason::Missing));
        };
        if size < self.config.min_file_size_bytes {
            debug!(
                "Skipping {}: too small ({:.2} MB)",
                path.display(),
                size as f64 / (1024.0 * 1024.0)
            );
            return Ok(IngestOutcome::Skipped(SkipReason::TooSmall));
        }
        if self.ledger.contains(path, size) {
            return Ok(IngestOutcome::Skipped(SkipReason::AlreadyIngested));
        }

        info!("New recording detected: {}", path.display());
        // Events for a held path only mark it, so keep waiting while they arrive
        while !is_stable_with(self.probe.as_ref(), path, &self.config.stability).await {
            if guard.release_unless_changed() {
                warn!("File did not stabilize, skipping: {}", path.display());
                return Ok(IngestOutcome::Skipped(SkipReason::Unstable));
            }
            debug!("{} still being written, waiting again", path.display());
        }

        let Ok(size) = self.probe.size(path).await else {
            return Ok(IngestOutcome::Skipped(SkipReason::Missing));
        };
        if self.ledger.contains(path, size) {
            return Ok(IngestOutcome::Skipped(SkipReason::AlreadyIngested));
        }

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let source = self
            .objects
            .upload(
                path,
                &source_key(&file_name),
                content_type_for(path),
                &[("uploadedBy", UPLOADED_BY)],
            )
            .await?;
        info!("Upload complete: {}", source);

        let markers = read_markers(&self.config.marker_file).await?;
        let marker_count = markers.values().len();
        let record = VideoRecord::uploaded(
            VideoId::new(),
            file_name,
            &source,
            size,
            markers.values().to_vec(),
        );
        self.videos.create(&record).await?;
        if let Err(e) = markers.consume().await {
            error!(
                video_id = %record.video_id,
                "Markers attached but not cleared from {}: {}",
                self.config.marker_file.display(),
                e
            );
        }

        self.ledger.record(path, size);
        metrics::record_ingested();
        info!(
            video_id = %record.video_id,
            markers = marker_count,
            "Video record created for {}", record.file_name
        );

        Ok(IngestOutcome::Uploaded {
            video_id: record.video_id,
            markers: marker_count,
        })
    }
}

// =============================================================================
// Watch loop
// =============================================================================

/// Watch the OBS folder until `shutdown` is cancelled.
///
/// Each relevant event spawns an ingest task; in-flight tasks are awaited
/// before returning.
pub async fn watch(ingestor: Arc<Ingestor>, shutdown: CancellationToken) -> WorkerResult<()> {
    let (sender, mut receiver) = mpsc::unbounded_channel::<Result<Event, notify::Error>>();

    let mut watcher = notify::recommended_watcher(move |result| {
        let _ = sender.send(result);
    })?;
    watcher.watch(&ingestor.config.obs_folder, RecursiveMode::NonRecursive)?;

    info!(
        "Watching {} for {}",
        ingestor.config.obs_folder.display(),
        ingestor.config.watch_extensions.join(", ")
    );

    let mut tasks = tokio::task::JoinSet::new();
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            Some(result) = receiver.recv() => match result {
                Ok(event) if is_ingest_event(&event.kind) => {
                    for path in event.paths {
                        // A held path only needs its holder told that it changed
                        if !ingestor.filter.accepts(&path)
                            || ingestor.in_flight.mark_changed(&path)
                        {
                            continue;
                        }
                        let ingestor = Arc::clone(&ingestor);
                        tasks.spawn(async move {
                            if let Err(e) = ingestor.ingest_file(&path).await {
                                error!("Failed to ingest {}: {}", path.display(), e);
                            }
                        });
                    }
                }
                Ok(_) => {}
                Err(e) => warn!("Watcher error: {}", e),
            },
            Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
        }
    }

    drop(watcher);
    if !tasks.is_empty() {
        info!("Waiting for {} ingest task(s) to finish", tasks.len());
    }
    while tasks.join_next().await.is_some() {}
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_flight_guard_releases_on_drop() {
        let set = InFlightSet::new();
        let guard = set.try_acquire(Path::new("/obs/./rec.mkv")).unwrap();
        assert!(set.contains(Path::new("/obs/rec.mkv")));
        assert!(set.try_acquire(Path::new("/obs/rec.mkv")).is_none());

        drop(guard);
        assert!(set.is_empty());
        assert!(set.try_acquire(Path::new("/obs/rec.mkv")).is_some());
    }

    #[test]
    fn test_event_on_held_path_keeps_it_claimed() {
        let set = InFlightSet::new();
        let mut guard = set.try_acquire(Path::new("/obs/rec.mkv")).unwrap();
        assert!(!set.mark_changed(Path::new("/obs/other.mkv")));

        assert!(set.try_acquire(Path::new("/obs/rec.mkv")).is_none());
        assert!(!guard.release_unless_changed());
        assert!(set.contains(Path::new("/obs/rec.mkv")));

        assert!(set.mark_changed(Path::new("/obs/./rec.mkv")));
        assert!(!guard.release_unless_changed());

        assert!(guard.release_unless_changed());
        assert!(set.is_empty());

        // A new holder is not evicted by the old guard's drop
        let _next = set.try_acquire(Path::new("/obs/rec.mkv")).unwrap();
        drop(guard);
        assert!(set.contains(Path::new("/obs/rec.mkv")));
    }

    #[test]
    fn test_ledger_keys_on_size() {
        let ledger = IngestLedger::default();
        ledger.record(Path::new("/obs/rec.mkv"), 100);
        assert!(ledger.contains(Path::new("/obs/rec.mkv"), 100));
        assert!(!ledger.contains(Path::new("/obs/rec.mkv"), 200));
    }

    #[test]
    fn test_filter() {
        let filter = IngestFilter::new(&[".mp4".to_string(), ".mkv".to_string()]);
        assert!(filter.accepts(Path::new("/obs/2024-05-01 20-00-00.mkv")));
        assert!(filter.accepts(Path::new("/obs/REC.MP4")));
        assert!(!filter.accepts(Path::new("/obs/.hidden.mp4")));
        assert!(!filter.accepts(Path::new("/obs/.DS_Store")));
        assert!(!filter.accepts(Path::new("/obs/notes.txt")));
        assert!(!filter.accepts(Path::new("/obs/noext")));
    }

    #[test]
    fn test_event_kinds() {
        use notify::event::{AccessKind, CreateKind, DataChange, MetadataKind};

        assert!(is_ingest_event(&EventKind::Create(CreateKind::File)));
        assert!(is_ingest_event(&EventKind::Modify(ModifyKind::Data(DataChange::Size))));
        assert!(!is_ingest_event(&EventKind::Modify(ModifyKind::Metadata(MetadataKind::Any))));
        assert!(!is_ingest_event(&EventKind::Access(AccessKind::Any)));
    }
}
