//! Detect operation and backend session tests
//!
//! These go through `CommandHandler::handle` with the mock backend to check
//! the reader lifecycle (at most one load per language set), temp-file
//! cleanup and result formatting.

use ocrw_backend::mock::MockBackend;
use ocrw_backend::RawDetection;
use ocrw_core::{BackendSession, CommandHandler, Detection, Response};
use serde_json::{json, Value};
use tempfile::TempDir;

/// "hello" in base64
const HELLO_B64: &str = "aGVsbG8=";

/// Helper to build a handler that stages images in its own temp dir
fn handler_with_staging(backend: MockBackend) -> (CommandHandler<MockBackend>, TempDir) {
    let staging = TempDir::new().unwrap();
    let session = BackendSession::new(backend).with_staging_dir(staging.path());
    (CommandHandler::new(session), staging)
}

fn detect(languages: &[&str]) -> Value {
    json!({"command": "detect", "image_data": HELLO_B64, "languages": languages})
}

fn staging_is_empty(dir: &TempDir) -> bool {
    std::fs::read_dir(dir.path()).unwrap().next().is_none()
}

fn error_of(response: &Response) -> &str {
    match response {
        Response::Failure(error) => error,
        other => panic!("expected failure, got {:?}", other),
    }
}

fn sample_detections() -> Vec<RawDetection> {
    vec![
        RawDetection::new(
            vec![[10.0, 20.0], [90.0, 20.0], [90.0, 50.0], [10.0, 50.0]],
            "Hello",
            0.965,
        ),
        RawDetection::new(
            vec![[100.0, 20.0], [210.0, 20.0], [210.0, 50.0], [100.0, 50.0]],
            "world",
            0.91,
        ),
        RawDetection::new(vec![[0.0, 0.0]; 4], "odd", 1.7),
    ]
}

#[tokio::test]
async fn test_same_languages_load_once() {
    let backend = MockBackend::new();
    let (mut handler, _staging) = handler_with_staging(backend.clone());

    for _ in 0..3 {
        let response = handler.handle(detect(&["en"])).await;
        assert!(response.is_success(), "got {:?}", response);
    }

    assert_eq!(backend.load_count(), 1);
    assert_eq!(backend.reads().len(), 3);
}

#[tokio::test]
async fn test_default_languages_match_explicit_en() {
    let backend = MockBackend::new();
    let (mut handler, _staging) = handler_with_staging(backend.clone());

    handler
        .handle(json!({"command": "detect", "image_data": HELLO_B64}))
        .await;
    handler.handle(detect(&["en"])).await;

    assert_eq!(backend.loaded_languages(), vec![vec!["en".to_string()]]);
}

#[tokio::test]
async fn test_language_change_reloads_exactly_once() {
    let backend = MockBackend::new();
    let (mut handler, _staging) = handler_with_staging(backend.clone());

    handler.handle(detect(&["en"])).await;
    handler.handle(detect(&["en", "de"])).await;
    handler.handle(detect(&["en", "de"])).await;
    assert_eq!(backend.load_count(), 2);

    handler.handle(detect(&["en"])).await;
    assert_eq!(backend.load_count(), 3);
    assert_eq!(
        handler.session().loaded_languages(),
        Some(&["en".to_string()][..])
    );

    let reads = backend.reads();
    assert_eq!(reads[1].languages, vec!["en".to_string(), "de".to_string()]);
    assert_eq!(reads[3].languages, vec!["en".to_string()]);
}

#[tokio::test]
async fn test_language_order_matters() {
    let backend = MockBackend::new();
    let (mut handler, _staging) = handler_with_staging(backend.clone());

    handler.handle(detect(&["en", "fr"])).await;
    handler.handle(detect(&["fr", "en"])).await;

    assert_eq!(backend.load_count(), 2);
}

#[tokio::test]
async fn test_reader_is_loaded_without_gpu() {
    let backend = MockBackend::new();
    let (mut handler, _staging) = handler_with_staging(backend.clone());

    handler.handle(detect(&["ja"])).await;

    assert_eq!(backend.load_count(), 1);
    assert!(!backend.gpu_requested());
}

#[tokio::test]
async fn test_results_pass_through_unchanged() {
    let backend = MockBackend::new().with_detections(sample_detections());
    let (mut handler, _staging) = handler_with_staging(backend.clone());

    let response = handler.handle(detect(&["en"])).await;

    let Response::Detections(results) = response else {
        panic!("expected detections");
    };
    assert_eq!(results.len(), sample_detections().len());
    assert_eq!(
        results[0],
        Detection {
            text: "Hello".to_string(),
            confidence: 0.965,
            bbox: vec![[10.0, 20.0], [90.0, 20.0], [90.0, 50.0], [10.0, 50.0]],
        }
    );
    // Out of range confidence is not clamped
    assert_eq!(results[2].confidence, 1.7);
}

#[tokio::test]
async fn test_empty_detection_list() {
    let (mut handler, _staging) = handler_with_staging(MockBackend::new());

    let response = handler.handle(detect(&["en"])).await;

    assert_eq!(
        serde_json::to_value(&response).unwrap(),
        json!({"success": true, "results": []})
    );
}

#[tokio::test]
async fn test_backend_receives_decoded_bytes_and_file_is_removed() {
    let backend = MockBackend::new().with_detections(sample_detections());
    let (mut handler, staging) = handler_with_staging(backend.clone());

    let response = handler.handle(detect(&["en"])).await;
    assert!(response.is_success());

    let reads = backend.reads();
    assert_eq!(reads.len(), 1);
    assert!(reads[0].path.starts_with(staging.path()));
    assert_eq!(reads[0].contents.as_deref(), Some(&b"hello"[..]));
    assert!(!reads[0].path.exists());
    assert!(staging_is_empty(&staging));
}

#[tokio::test]
async fn test_each_call_gets_a_fresh_file() {
    let backend = MockBackend::new();
    let (mut handler, staging) = handler_with_staging(backend.clone());

    handler.handle(detect(&["en"])).await;
    handler.handle(detect(&["en"])).await;

    let reads = backend.reads();
    assert_eq!(reads.len(), 2);
    assert!(reads.iter().all(|r| r.contents.is_some()));
    assert!(staging_is_empty(&staging));
}

#[tokio::test]
async fn test_backend_failure_reports_and_cleans_up() {
    let backend = MockBackend::new().failing_read("not an image");
    let (mut handler, staging) = handler_with_staging(backend.clone());

    let response = handler.handle(detect(&["en"])).await;

    assert_eq!(error_of(&response), "OCR detection failed: not an image");
    let reads = backend.reads();
    assert_eq!(reads.len(), 1);
    assert!(!reads[0].path.exists());
    assert!(staging_is_empty(&staging));

    // The reader survives a failed detection
    handler.handle(detect(&["en"])).await;
    assert_eq!(backend.load_count(), 1);
}

#[tokio::test]
async fn test_staging_failure_reports_and_keeps_reader() {
    let backend = MockBackend::new();
    let missing = TempDir::new().unwrap().path().join("gone");
    let session = BackendSession::new(backend.clone()).with_staging_dir(missing);
    let mut handler = CommandHandler::new(session);

    let response = handler.handle(detect(&["en"])).await;

    let error = error_of(&response);
    assert!(error.starts_with("OCR detection failed: "), "got: {}", error);
    assert!(backend.reads().is_empty());
    assert_eq!(
        handler.session().loaded_languages(),
        Some(&["en".to_string()][..])
    );

    // Same languages again reuse the loaded reader
    handler.handle(detect(&["en"])).await;
    assert_eq!(backend.load_count(), 1);
}

#[tokio::test]
async fn test_invalid_base64_skips_backend_and_staging() {
    let backend = MockBackend::new();
    let (mut handler, staging) = handler_with_staging(backend.clone());

    let response = handler
        .handle(json!({"command": "detect", "image_data": "!!!not-base64!!!"}))
        .await;

    assert!(error_of(&response).starts_with("Invalid base64 image data: "));
    assert!(backend.reads().is_empty());
    assert!(staging_is_empty(&staging));
}

#[tokio::test]
async fn test_not_installed_on_detect() {
    let backend = MockBackend::new().not_installed();
    let (mut handler, _staging) = handler_with_staging(backend.clone());

    let response = handler.handle(detect(&["en"])).await;

    assert_eq!(
        error_of(&response),
        "MockOCR not installed. Install with: cargo add mock-ocr"
    );
    assert!(handler.session().loaded_languages().is_none());
    assert!(backend.reads().is_empty());
}

#[tokio::test]
async fn test_failed_load_leaves_no_session_and_retries() {
    let backend = MockBackend::new().failing_load("model download failed");
    let (mut handler, _staging) = handler_with_staging(backend.clone());

    let response = handler.handle(detect(&["en"])).await;
    assert_eq!(
        error_of(&response),
        "Failed to initialize OCR reader: model download failed"
    );
    assert!(handler.session().loaded_languages().is_none());

    // Same languages again: no cached failure, the load is attempted again
    backend.set_load_failure(None);
    let response = handler.handle(detect(&["en"])).await;
    assert!(response.is_success());
    assert_eq!(backend.load_count(), 2);
    assert_eq!(
        handler.session().loaded_languages(),
        Some(&["en".to_string()][..])
    );
}

#[tokio::test]
async fn test_failed_reload_drops_previous_reader() {
    let backend = MockBackend::new();
    let (mut handler, _staging) = handler_with_staging(backend.clone());

    handler.handle(detect(&["en"])).await;
    backend.set_load_failure(Some("no such language"));
    let response = handler.handle(detect(&["xx"])).await;

    assert!(!response.is_success());
    assert!(handler.session().loaded_languages().is_none());

    // Going back to the old set needs a fresh load
    backend.set_load_failure(None);
    handler.handle(detect(&["en"])).await;
    assert_eq!(backend.load_count(), 3);
}

#[tokio::test]
async fn test_empty_languages_are_passed_to_backend() {
    let backend = MockBackend::new();
    let (mut handler, _staging) = handler_with_staging(backend.clone());

    let response = handler.handle(detect(&[])).await;

    assert_eq!(
        error_of(&response),
        "Failed to initialize OCR reader: no languages requested"
    );
    assert_eq!(backend.loaded_languages(), vec![Vec::<String>::new()]);
}

#[tokio::test]
async fn test_malformed_detect_does_no_backend_work() {
    let backend = MockBackend::new();
    let (mut handler, _staging) = handler_with_staging(backend.clone());

    let response = handler.handle(json!({"command": "detect"})).await;
    assert!(error_of(&response).starts_with("Invalid detect command: "));

    let response = handler
        .handle(json!({"command": "detect", "image_data": HELLO_B64, "languages": "en"}))
        .await;
    assert!(error_of(&response).starts_with("Invalid detect command: "));

    assert_eq!(backend.load_count(), 0);
}

#[tokio::test]
async fn test_options_are_accepted_and_ignored() {
    let backend = MockBackend::new();
    let (mut handler, _staging) = handler_with_staging(backend.clone());

    let response = handler
        .handle(json!({
            "command": "detect",
            "image_data": HELLO_B64,
            "options": {"paragraph": true, "detail": 0}
        }))
        .await;

    assert!(response.is_success());
    assert_eq!(backend.load_count(), 1);
}

#[tokio::test]
async fn test_check_dependencies_never_loads() {
    let backend = MockBackend::new().with_version("3.1.4");
    let (mut handler, _staging) = handler_with_staging(backend.clone());

    for _ in 0..3 {
        let response = handler.handle(json!({"command": "check_dependencies"})).await;
        assert!(response.is_success());
    }

    assert_eq!(backend.probe_count(), 3);
    assert_eq!(backend.load_count(), 0);
    assert!(handler.session().loaded_languages().is_none());
}

#[tokio::test]
async fn test_check_dependencies_keeps_loaded_reader() {
    let backend = MockBackend::new();
    let (mut handler, _staging) = handler_with_staging(backend.clone());

    handler.handle(detect(&["en"])).await;
    handler.handle(json!({"command": "check_dependencies"})).await;
    handler.handle(detect(&["en"])).await;

    assert_eq!(backend.load_count(), 1);
}

#[tokio::test]
async fn test_check_dependencies_unknown_version() {
    let (mut handler, _staging) = handler_with_staging(MockBackend::new());

    let response = handler.handle(json!({"command": "check_dependencies"})).await;

    assert_eq!(
        serde_json::to_value(&response).unwrap(),
        json!({"success": true, "easyocr_version": "unknown", "available_languages": []})
    );
}

#[tokio::test]
async fn test_check_dependencies_not_installed() {
    let (mut handler, _staging) = handler_with_staging(MockBackend::new().not_installed());

    let response = handler.handle(json!({"command": "check_dependencies"})).await;

    assert_eq!(
        serde_json::to_value(&response).unwrap(),
        json!({"success": false, "error": "MockOCR not installed. Install with: cargo add mock-ocr"})
    );
}

#[tokio::test]
async fn test_check_dependencies_backend_fault() {
    let backend = MockBackend::new().failing_version_query("permission denied");
    let (mut handler, _staging) = handler_with_staging(backend.clone());

    let response = handler.handle(json!({"command": "check_dependencies"})).await;

    assert_eq!(
        serde_json::to_value(&response).unwrap(),
        json!({"success": false, "error": "OCR dependency check failed: permission denied"})
    );
    assert_eq!(backend.probe_count(), 1);
    assert_eq!(backend.load_count(), 0);
}
