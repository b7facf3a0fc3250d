//! Ingest path against in-memory collaborators.

mod common;

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use common::{Harness, MemoryObjectStore, MemoryVideoStore};
use obsclip_models::UPLOADED_BY;
use obsclip_worker::{IngestOutcome, Ingestor, SkipReason, StabilityPolicy, WorkerConfig};

fn build_ingestor(config: WorkerConfig) -> (Ingestor, Arc<MemoryObjectStore>, Arc<MemoryVideoStore>) {
    let objects = Arc::new(MemoryObjectStore::default());
    let videos = Arc::new(MemoryVideoStore::default());
    let ingestor = Ingestor::new(config, objects.clone(), videos.clone());
    (ingestor, objects, videos)
}

/// Test a stable recording is uploaded with the pending markers attached.
#[tokio::test]
async fn test_ingest_uploads_and_drains_markers() {
    let h = Harness::new();
    let path = h.config.obs_folder.join("2024-05-01 20-00-00.mkv");
    std::fs::write(&path, vec![0u8; 4096]).unwrap();
    std::fs::write(&h.config.marker_file, "12.50\n196.10\n").unwrap();

    let (ingestor, objects, videos) = build_ingestor(h.config.clone());
    let outcome = ingestor.ingest_file(&path).await.unwrap();

    let (video_id, markers) = match outcome {
        IngestOutcome::Uploaded { video_id, markers } => (video_id, markers),
        other => panic!("expected upload, got {:?}", other),
    };
    assert_eq!(markers, 2);

    let key = "videos/2024-05-01 20-00-00.mkv";
    assert_eq!(objects.get(key).unwrap().len(), 4096);
    assert_eq!(
        objects.metadata.lock().unwrap()[key],
        vec![("uploadedBy".to_string(), UPLOADED_BY.to_string())]
    );

    let record = videos.get(&video_id).unwrap();
    assert_eq!(record.markers, vec![12.5, 196.1]);
    assert!(record.has_markers);
    assert!(!record.clips_extracted.done);
    assert_eq!(record.metadata.file_size, 4096);
    assert_eq!(record.gcs_path, format!("storage://{}/{}", common::BUCKET, key));

    assert_eq!(std::fs::read_to_string(&h.config.marker_file).unwrap(), "");
    assert!(ingestor.in_flight().is_empty());
}

/// Test a repeat event for the same file and size does not create a second record.
#[tokio::test]
async fn test_ingest_ledger_dedupes() {
    let h = Harness::new();
    let path = h.config.obs_folder.join("rec.mp4");
    std::fs::write(&path, b"recording").unwrap();

    let (ingestor, _objects, videos) = build_ingestor(h.config.clone());
    assert!(matches!(
        ingestor.ingest_file(&path).await.unwrap(),
        IngestOutcome::Uploaded { markers: 0, .. }
    ));
    assert_eq!(
        ingestor.ingest_file(&path).await.unwrap(),
        IngestOutcome::Skipped(SkipReason::AlreadyIngested)
    );
    assert_eq!(videos.all().len(), 1);
    assert!(!videos.all()[0].has_markers);
}

/// Test small, hidden and foreign files are skipped before any upload.
#[tokio::test]
async fn test_ingest_skips() {
    let h = Harness::new();
    let config = WorkerConfig {
        min_file_size_bytes: 1024,
        ..h.config.clone()
    };
    let small = config.obs_folder.join("small.mkv");
    let hidden = config.obs_folder.join(".rec.mkv");
    let text = config.obs_folder.join("notes.txt");
    for path in [&small, &hidden, &text] {
        std::fs::write(path, b"tiny").unwrap();
    }

    let (ingestor, objects, videos) = build_ingestor(config.clone());
    assert_eq!(
        ingestor.ingest_file(&small).await.unwrap(),
        IngestOutcome::Skipped(SkipReason::TooSmall)
    );
    assert_eq!(
        ingestor.ingest_file(&hidden).await.unwrap(),
        IngestOutcome::Skipped(SkipReason::Filtered)
    );
    assert_eq!(
        ingestor.ingest_file(&text).await.unwrap(),
        IngestOutcome::Skipped(SkipReason::Filtered)
    );
    assert_eq!(
        ingestor
            .ingest_file(&config.obs_folder.join("gone.mkv"))
            .await
            .unwrap(),
        IngestOutcome::Skipped(SkipReason::Missing)
    );
    assert!(objects.keys_with_prefix("").is_empty());
    assert!(videos.all().is_empty());
}

/// Test a file held by another task is not ingested twice.
#[tokio::test]
async fn test_ingest_skips_in_flight_path() {
    let h = Harness::new();
    let path = h.config.obs_folder.join("rec.mkv");
    std::fs::write(&path, b"recording").unwrap();

    let (ingestor, _objects, videos) = build_ingestor(h.config.clone());
    let guard = ingestor.in_flight().try_acquire(&path).unwrap();

    assert_eq!(
        ingestor.ingest_file(&path).await.unwrap(),
        IngestOutcome::Skipped(SkipReason::InFlight)
    );
    drop(guard);

    assert!(matches!(
        ingestor.ingest_file(&path).await.unwrap(),
        IngestOutcome::Uploaded { .. }
    ));
    assert_eq!(videos.all().len(), 1);
}

/// Test a failed record creation leaves the markers for the next attempt.
#[tokio::test]
async fn test_failed_create_keeps_markers() {
    let h = Harness::new();
    let path = h.config.obs_folder.join("rec.mkv");
    std::fs::write(&path, b"recording").unwrap();
    std::fs::write(&h.config.marker_file, "12.50\n196.10\n").unwrap();

    let (ingestor, _objects, videos) = build_ingestor(h.config.clone());
    *videos.fail_create.lock().unwrap() = true;

    assert!(ingestor.ingest_file(&path).await.is_err());
    assert_eq!(
        std::fs::read_to_string(&h.config.marker_file).unwrap(),
        "12.50\n196.10\n"
    );
    assert!(ingestor.in_flight().is_empty());

    *videos.fail_create.lock().unwrap() = false;
    assert!(matches!(
        ingestor.ingest_file(&path).await.unwrap(),
        IngestOutcome::Uploaded { markers: 2, .. }
    ));
    assert_eq!(videos.all()[0].markers, vec![12.5, 196.1]);
    assert_eq!(std::fs::read_to_string(&h.config.marker_file).unwrap(), "");
}

/// Test the last write event of a growing recording is not lost while an
/// earlier stability wait still holds the path.
#[tokio::test]
async fn test_events_during_stability_wait_extend_it() {
    let h = Harness::new();
    let config = WorkerConfig {
        stability: StabilityPolicy {
            debounce_window: Duration::from_millis(100),
            poll_interval: Duration::from_millis(10),
            required_consecutive: 3,
        },
        ..h.config.clone()
    };
    let path = config.obs_folder.join("rec.mkv");
    std::fs::write(&path, b"x").unwrap();

    let (ingestor, _objects, videos) = build_ingestor(config);
    let ingestor = Arc::new(ingestor);

    let first = tokio::spawn({
        let ingestor = Arc::clone(&ingestor);
        let path = path.clone();
        async move { ingestor.ingest_file(&path).await.unwrap() }
    });

    // Keep writing for longer than one stability window, signalling each
    // write the way the watch loop does
    tokio::time::sleep(Duration::from_millis(5)).await;
    for _ in 0..18 {
        let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&[0u8; 64]).unwrap();
        drop(file);
        ingestor.in_flight().mark_changed(&path);
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let final_size = std::fs::metadata(&path).unwrap().len();

    assert_eq!(
        ingestor.ingest_file(&path).await.unwrap(),
        IngestOutcome::Skipped(SkipReason::InFlight)
    );

    assert!(matches!(first.await.unwrap(), IngestOutcome::Uploaded { .. }));
    let records = videos.all();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].metadata.file_size, final_size);
    assert!(ingestor.in_flight().is_empty());
}
