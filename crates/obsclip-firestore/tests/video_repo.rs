//! Video repository tests against a mocked Firestore REST endpoint.

use std::time::Duration;

use serde_json::{json, Value as Json};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use obsclip_firestore::{
    FirestoreClient, FirestoreConfig, FirestoreError, RetryPolicy, TransitionOutcome,
    VideoRepository,
};
use obsclip_models::{Clip, Stage, StageResult, StorageLocator, VideoId, VideoRecord};

const DOCS: &str = "/v1/projects/test-project/databases/(default)/documents";
const NAME_PREFIX: &str = "projects/test-project/databases/(default)/documents/videos";

async fn repo(server: &MockServer) -> VideoRepository {
    let config = FirestoreConfig {
        project_id: "test-project".to_string(),
        database_id: "(default)".to_string(),
        emulator_host: Some(server.address().to_string()),
        timeout: Duration::from_secs(5),
        connect_timeout: Duration::from_secs(2),
        retry: RetryPolicy {
            max_retries: 1,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        },
    };
    VideoRepository::new(FirestoreClient::new(config).unwrap())
}

fn video_doc(id: &str, extracted: bool, update_time: &str) -> Json {
    let mut fields = json!({
        "videoId": { "stringValue": id },
        "fileName": { "stringValue": format!("{id}.mkv") },
        "gcsPath": { "stringValue": format!("storage://bucket/videos/{id}.mkv") },
        "uploadedAt": { "timestampValue": "2024-05-01T10:00:00Z" },
        "markers": { "arrayValue": { "values": [ { "doubleValue": 10.0 }, { "doubleValue": 50.0 } ] } },
        "hasMarkers": { "booleanValue": true },
        "clipsExtracted": { "booleanValue": extracted },
        "clipsCombined": { "booleanValue": false },
        "metadata": { "mapValue": { "fields": {
            "fileSize": { "integerValue": "1048576" },
            "uploadedBy": { "stringValue": "obs-watcher" }
        } } }
    });
    if extracted {
        fields["clips"] = json!({ "arrayValue": { "values": [ { "mapValue": { "fields": {
            "markerTime": { "doubleValue": 10.0 },
            "clipIndex": { "integerValue": "1" },
            "gcsPath": { "stringValue": format!("storage://bucket/clips/{id}/{id}_clip_1_10.0s.mp4") },
            "fileName": { "stringValue": format!("{id}_clip_1_10.0s.mp4") },
            "duration": { "doubleValue": 30.0 }
        } } } ] } });
        fields["clipsCount"] = json!({ "integerValue": "1" });
    }
    json!({
        "name": format!("{NAME_PREFIX}/{id}"),
        "fields": fields,
        "createTime": "2024-05-01T10:00:00Z",
        "updateTime": update_time
    })
}

fn clips(id: &str) -> Vec<Clip> {
    vec![Clip {
        marker_time: 10.0,
        clip_index: 1,
        gcs_path: format!("storage://bucket/clips/{id}/{id}_clip_1_10.0s.mp4"),
        file_name: format!("{id}_clip_1_10.0s.mp4"),
        duration: 30.0,
    }]
}

fn write_ok() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "writeResults": [ { "updateTime": "2024-05-01T10:05:00Z" } ],
        "status": [ {} ]
    }))
}

fn write_failed(code: i32, message: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "writeResults": [ {} ],
        "status": [ { "code": code, "message": message } ]
    }))
}

/// A clean transition writes once, guarded by the update time just read.
#[tokio::test]
async fn test_advance_stage_writes_with_update_time_precondition() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{DOCS}/videos/vid-1")))
        .respond_with(ResponseTemplate::new(200).set_body_json(video_doc("vid-1", false, "2024-05-01T10:00:00.000001Z")))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("{DOCS}:batchWrite")))
        .and(body_partial_json(json!({
            "writes": [ {
                "currentDocument": { "updateTime": "2024-05-01T10:00:00.000001Z" },
                "updateMask": { "fieldPaths": ["clipsExtracted", "clips", "clipsCount"] },
                "updateTransforms": [ { "fieldPath": "clipsExtractedAt", "setToServerValue": "REQUEST_TIME" } ]
            } ]
        })))
        .respond_with(write_ok())
        .expect(1)
        .mount(&server)
        .await;

    let outcome = repo(&server)
        .await
        .advance_stage(&VideoId::from("vid-1"), StageResult::ClipsExtracted { clips: clips("vid-1") })
        .await
        .unwrap();

    assert_eq!(outcome, TransitionOutcome::Advanced);
}

/// A flag that is already set is reported as a lost race and nothing is written.
#[tokio::test]
async fn test_advance_stage_on_finished_record_is_lost_race() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{DOCS}/videos/vid-2")))
        .respond_with(ResponseTemplate::new(200).set_body_json(video_doc("vid-2", true, "t1")))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("{DOCS}:batchWrite")))
        .respond_with(write_ok())
        .expect(0)
        .mount(&server)
        .await;

    let outcome = repo(&server)
        .await
        .advance_stage(&VideoId::from("vid-2"), StageResult::ClipsExtracted { clips: clips("vid-2") })
        .await
        .unwrap();

    assert_eq!(outcome, TransitionOutcome::LostRace);
}

/// Losing the conditional write to a run that set the flag yields `LostRace`.
#[tokio::test]
async fn test_advance_stage_precondition_failure_then_flag_set() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{DOCS}/videos/vid-3")))
        .respond_with(ResponseTemplate::new(200).set_body_json(video_doc("vid-3", false, "t1")))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{DOCS}/videos/vid-3")))
        .respond_with(ResponseTemplate::new(200).set_body_json(video_doc("vid-3", true, "t2")))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("{DOCS}:batchWrite")))
        .respond_with(write_failed(9, "FAILED_PRECONDITION: update time mismatch"))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = repo(&server)
        .await
        .advance_stage(&VideoId::from("vid-3"), StageResult::ClipsExtracted { clips: clips("vid-3") })
        .await
        .unwrap();

    assert_eq!(outcome, TransitionOutcome::LostRace);
}

/// Combining a record whose clips were never extracted is rejected before any write.
#[tokio::test]
async fn test_advance_combined_before_extracted_is_invalid() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{DOCS}/videos/vid-4")))
        .respond_with(ResponseTemplate::new(200).set_body_json(video_doc("vid-4", false, "t1")))
        .mount(&server)
        .await;

    let combined: StorageLocator = "storage://bucket/finals/vid-4/vid-4_highlights.mp4".parse().unwrap();
    let err = repo(&server)
        .await
        .advance_stage(&VideoId::from("vid-4"), StageResult::ClipsCombined { combined_video: combined })
        .await
        .unwrap_err();

    assert!(matches!(err, FirestoreError::InvalidTransition(_)));
}

/// Auto-selection for extraction is FIFO over the queried window.
#[tokio::test]
async fn test_find_next_eligible_for_extraction() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("{DOCS}:runQuery")))
        .and(body_partial_json(json!({
            "structuredQuery": {
                "from": [ { "collectionId": "videos" } ],
                "where": { "fieldFilter": { "field": { "fieldPath": "hasMarkers" }, "op": "EQUAL" } },
                "limit": 10
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "document": video_doc("done", true, "t"), "readTime": "2024-05-01T11:00:00Z" },
            { "document": video_doc("next", false, "t"), "readTime": "2024-05-01T11:00:00Z" },
            { "document": video_doc("later", false, "t"), "readTime": "2024-05-01T11:00:00Z" }
        ])))
        .mount(&server)
        .await;

    let picked = repo(&server)
        .await
        .find_next_eligible(Stage::ClipsExtracted, None)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(picked.video_id.as_str(), "next");
    assert_eq!(picked.markers, vec![10.0, 50.0]);
    assert_eq!(picked.metadata.file_size, 1_048_576);
}

/// An explicit id whose stage is already done is not selected.
#[tokio::test]
async fn test_find_next_eligible_explicit_already_done() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{DOCS}/videos/vid-5")))
        .respond_with(ResponseTemplate::new(200).set_body_json(video_doc("vid-5", true, "t")))
        .mount(&server)
        .await;

    let repo = repo(&server).await;
    let id = VideoId::from("vid-5");

    assert!(repo
        .find_next_eligible(Stage::ClipsExtracted, Some(&id))
        .await
        .unwrap()
        .is_none());

    let for_combine = repo
        .find_next_eligible(Stage::ClipsCombined, Some(&id))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(for_combine.clips.len(), 1);
}

/// Missing documents are "not found", not errors.
#[tokio::test]
async fn test_find_next_eligible_explicit_missing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{DOCS}/videos/ghost")))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "error": { "code": 404, "status": "NOT_FOUND" } })))
        .mount(&server)
        .await;

    let found = repo(&server)
        .await
        .find_next_eligible(Stage::ClipsExtracted, Some(&VideoId::from("ghost")))
        .await
        .unwrap();
    assert!(found.is_none());
}

/// Creation never overwrites: an existing id surfaces as `AlreadyExists`.
#[tokio::test]
async fn test_create_refuses_to_overwrite() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("{DOCS}:batchWrite")))
        .and(body_partial_json(json!({
            "writes": [ {
                "currentDocument": { "exists": false },
                "updateTransforms": [ { "fieldPath": "uploadedAt", "setToServerValue": "REQUEST_TIME" } ]
            } ]
        })))
        .respond_with(write_failed(6, "ALREADY_EXISTS"))
        .mount(&server)
        .await;

    let source: StorageLocator = "storage://bucket/videos/rec.mkv".parse().unwrap();
    let record = VideoRecord::uploaded(VideoId::from("dup"), "rec.mkv", &source, 10, vec![4.0]);
    let err = repo(&server).await.create(&record).await.unwrap_err();

    assert!(matches!(err, FirestoreError::AlreadyExists(_)));
}

/// Round trip against a real emulator.
#[tokio::test]
#[ignore = "requires FIRESTORE_EMULATOR_HOST"]
async fn test_emulator_create_and_advance() {
    dotenvy::dotenv().ok();

    let client = FirestoreClient::from_env().expect("Failed to create Firestore client");
    let repo = VideoRepository::new(client);

    let source: StorageLocator = "storage://bucket/videos/emulator.mkv".parse().unwrap();
    let video_id = VideoId::new();
    let record = VideoRecord::uploaded(video_id.clone(), "emulator.mkv", &source, 1, vec![12.0]);
    repo.create(&record).await.expect("Failed to create video");

    let outcome = repo
        .advance_stage(&video_id, StageResult::ClipsExtracted { clips: clips(video_id.as_str()) })
        .await
        .expect("Failed to advance");
    assert_eq!(outcome, TransitionOutcome::Advanced);

    let again = repo
        .advance_stage(&video_id, StageResult::ClipsExtracted { clips: clips(video_id.as_str()) })
        .await
        .expect("Failed to advance");
    assert_eq!(again, TransitionOutcome::LostRace);

    let fetched = repo.get(&video_id).await.unwrap().unwrap();
    assert!(fetched.uploaded_at.is_some());
    assert!(fetched.clips_extracted.completed_at.is_some());
}
