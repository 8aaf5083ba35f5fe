/// Integration tests for the LPR service HTTP API
use base64::Engine;
use common::plates::{FrameReport, PlateOutcome};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use lpr_service::artifacts::ArtifactWriter;
use lpr_service::state::ServiceStats;
use lpr_service::{api, CollaboratorSet, LprServiceState, PipelineConfig, PlatePipeline, RecordStore};
use serde_json::{json, Value};
use std::io::Cursor;
use tempfile::TempDir;

/// Helper function to create a test service backed by replay collaborators
async fn setup_test_service(dir: &TempDir, with_crops: bool) -> (axum_test::TestServer, LprServiceState) {
    let mut collaborators = CollaboratorSet::replay();
    collaborators
        .init_all(&Value::Null)
        .await
        .unwrap();

    let artifacts = with_crops.then(|| {
        ArtifactWriter::new(dir.path().join("vehicles"), dir.path().join("plates")).unwrap()
    });

    let state = LprServiceState::new(
        "test-node".to_string(),
        PlatePipeline::new(PipelineConfig::default()).unwrap(),
        collaborators,
        RecordStore::open(dir.path().join("results.csv")).unwrap(),
        artifacts,
    );
    let server = axum_test::TestServer::new(api::router(state.clone())).unwrap();

    (server, state)
}

fn frame_json(frame: u64) -> Value {
    json!({
        "frame": frame,
        "source_id": "gate-cam",
        "vehicles": [[0.0, 0.0, 100.0, 100.0, 1.0, 0.9, 2.0]],
        "plates": [[10.0, 10.0, 40.0, 30.0, 9.0, 0.8, 0.0]],
        "ocr": {
            "9": [{ "quad": [[0.0, 0.0], [20.0, 0.0], [20.0, 10.0], [0.0, 10.0]], "text": "abc123", "confidence": 0.9 }]
        }
    })
}

fn encoded_jpeg(width: u32, height: u32) -> String {
    let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([90, 120, 200])));
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Jpeg)
        .unwrap();
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

#[tokio::test]
async fn test_healthz() {
    let dir = TempDir::new().unwrap();
    let (server, _state) = setup_test_service(&dir, false).await;

    let response = server.get("/healthz").await;
    assert_eq!(response.status_code(), 200);
    let body: Value = response.json();
    assert_eq!(body["service"], "lpr-service");
}

#[tokio::test]
async fn test_readyz_reflects_collaborators() {
    let dir = TempDir::new().unwrap();
    let (server, state) = setup_test_service(&dir, false).await;

    let response = server.get("/readyz").await;
    assert_eq!(response.status_code(), 200);
    let body: Value = response.json();
    assert_eq!(body["collaborators"]["replay_ocr"], true);

    state.shutdown().await.unwrap();
    let response = server.get("/readyz").await;
    assert_eq!(response.status_code(), 503);
}

#[tokio::test]
async fn test_submit_frame_returns_report() {
    let dir = TempDir::new().unwrap();
    let (server, _state) = setup_test_service(&dir, false).await;

    let response = server.post("/v1/frames").json(&frame_json(7)).await;
    assert_eq!(response.status_code(), 200);

    let report: FrameReport = response.json();
    assert_eq!(report.frame, 7);
    assert_eq!(report.matched, 1);
    assert_eq!(report.records.len(), 1);
    assert_eq!(
        report.records[0].observation.outcome,
        PlateOutcome::Formatted("ABC-123".to_string())
    );
}

#[tokio::test]
async fn test_records_and_stats() {
    let dir = TempDir::new().unwrap();
    let (server, _state) = setup_test_service(&dir, false).await;

    for frame in 0..3 {
        server.post("/v1/frames").json(&frame_json(frame)).await;
    }

    let body: Value = server.get("/v1/records").await.json();
    assert_eq!(body["count"], 3);
    assert_eq!(body["records"][2]["key"], 2);
    assert_eq!(body["records"][0]["outcome"]["status"], "formatted");
    assert_eq!(body["records"][0]["outcome"]["text"], "ABC-123");

    let stats: ServiceStats = server.get("/v1/stats").await.json();
    assert_eq!(stats.node_id, "test-node");
    assert_eq!(stats.frames_processed, 3);
    assert_eq!(stats.records_written, 3);
    assert_eq!(stats.last_frame, Some(2));
}

#[tokio::test]
async fn test_bad_image_is_rejected() {
    let dir = TempDir::new().unwrap();
    let (server, state) = setup_test_service(&dir, false).await;

    let mut frame = frame_json(1);
    frame["image"] = json!("not-base64!");
    let response = server.post("/v1/frames").json(&frame).await;

    assert_eq!(response.status_code(), 400);
    let body: Value = response.json();
    assert!(body["error"].as_str().unwrap().contains("base64"));
    assert!(state.records().await.is_empty());
}

#[tokio::test]
async fn test_out_of_range_ocr_confidence_is_rejected() {
    let dir = TempDir::new().unwrap();
    let (server, state) = setup_test_service(&dir, false).await;

    let mut frame = frame_json(1);
    frame["ocr"]["9"][0]["confidence"] = json!(5.0);
    let response = server.post("/v1/frames").json(&frame).await;

    assert_eq!(response.status_code(), 400);
    let body: Value = response.json();
    assert!(body["error"].as_str().unwrap().contains("ocr confidence"));
    assert!(state.records().await.is_empty());
}

#[tokio::test]
async fn test_frame_image_produces_crops() {
    let dir = TempDir::new().unwrap();
    let (server, _state) = setup_test_service(&dir, true).await;

    let mut frame = frame_json(3);
    frame["image"] = json!(encoded_jpeg(160, 120));
    let response = server.post("/v1/frames").json(&frame).await;
    assert_eq!(response.status_code(), 200);

    let report: FrameReport = response.json();
    assert_eq!(report.records[0].observation.vehicle_image, "Car1_0.jpg");
    assert!(dir.path().join("vehicles").join("Car1_0.jpg").exists());
    assert!(dir.path().join("plates").join("9_0.jpg").exists());
}

#[tokio::test]
async fn test_metrics_exposes_pipeline_counters() {
    let dir = TempDir::new().unwrap();
    let (server, _state) = setup_test_service(&dir, false).await;
    server.post("/v1/frames").json(&frame_json(0)).await;

    let response = server.get("/metrics").await;
    assert_eq!(response.status_code(), 200);
    let text = response.text();
    assert!(text.contains("lpr_frames_processed_total"));
    assert!(text.contains("lpr_records_written_total"));
}
