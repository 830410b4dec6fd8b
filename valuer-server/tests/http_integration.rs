//! HTTP integration tests for the Valuer REST API
//!
//! Each test builds its own state over a throwaway SQLite file, then drives
//! the router through `oneshot` or calls the inner functions directly.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::json;
use std::sync::Arc;
use tower::ServiceExt;
use valuer_core::config::{HttpConfig, ModelConfig, ServiceConfig, StorageConfig};
use valuer_core::{StorageError, ValuerConfig, ValuerError};
use valuer_server::http::{build_router, health_inner, metrics_inner};
use valuer_server::state::AppState;

fn make_config(dir: &tempfile::TempDir) -> ValuerConfig {
    ValuerConfig {
        service: ServiceConfig {
            socket_path: dir.path().join("valuer.sock").to_string_lossy().into_owned(),
            log_level: "info".to_string(),
        },
        storage: StorageConfig {
            database_path: dir.path().join("valuer.db").to_string_lossy().into_owned(),
            max_connections: 2,
            feedback_path: Some(dir.path().join("feedback.json").to_string_lossy().into_owned()),
        },
        model: ModelConfig {
            iterations: 100,
            retry_delay_ms: 1,
            ..ModelConfig::default()
        },
        http: HttpConfig::default(),
    }
}

fn make_state(dir: &tempfile::TempDir) -> AppState {
    AppState::build(make_config(dir))
}

async fn send(
    state: &AppState,
    method: &str,
    uri: &str,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let app = build_router(Arc::new(state.clone()));
    let builder = Request::builder().method(method).uri(uri);
    let req = match body {
        Some(b) => builder
            .header("content-type", "application/json")
            .body(Body::from(b.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

fn sample_form() -> serde_json::Value {
    json!({
        "area": 2000,
        "bedrooms": 3,
        "bathrooms": 2,
        "location": "Suburban",
        "age": 10
    })
}

// ===========================================================================
// TEST 1: health via inner function: store and model status present
// ===========================================================================
#[tokio::test]
async fn test_health_reports_store_and_model() {
    let dir = tempfile::tempdir().unwrap();
    let state = make_state(&dir);

    let (status, body) = health_inner(&state).await;
    assert_eq!(status, StatusCode::OK, "Health check should return 200");
    assert_eq!(body["status"], "healthy");
    assert!(body["version"].is_string(), "version must be present");
    assert!(body["sqlite"].is_string(), "sqlite version must be present");
    assert!(body["socket"].is_string(), "socket path must be present");
    assert_eq!(body["schema_version"], 2);
}

// ===========================================================================
// TEST 2: GET /version via oneshot
// ===========================================================================
#[tokio::test]
async fn test_version_endpoint() {
    let dir = tempfile::tempdir().unwrap();
    let (status, body) = send(&make_state(&dir), "GET", "/version", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["version"].is_string());
    assert_eq!(body["protocol"], "valuer/1");
}

// ===========================================================================
// TEST 3: POST /predict: recorded, assessed, visible in history
// ===========================================================================
#[tokio::test]
async fn test_predict_records_history() {
    let dir = tempfile::tempdir().unwrap();
    let state = make_state(&dir);

    let (status, body) = send(&state, "POST", "/predict", Some(sample_form())).await;
    assert_eq!(status, StatusCode::OK, "predict failed: {:?}", body);
    let price = body["record"]["price"].as_i64().unwrap();
    assert!(price >= 50_000, "price {} below the floor", price);
    assert!(body["record"]["id"].is_number(), "record should be stored");
    assert!(body["assessment"]["isValid"].is_boolean());

    let (status, history) = send(&state, "GET", "/history?limit=5", None).await;
    assert_eq!(status, StatusCode::OK);
    let rows = history.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["price"], price);
}

// ===========================================================================
// TEST 4: POST /predict with missing fields: 400 with per-field messages
// ===========================================================================
#[tokio::test]
async fn test_predict_rejects_incomplete_form() {
    let dir = tempfile::tempdir().unwrap();
    let state = make_state(&dir);

    let (status, body) = send(
        &state,
        "POST",
        "/predict",
        Some(json!({"area": 20000, "bedrooms": 3, "bathrooms": 2})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "invalid");
    assert_eq!(body["fields"]["area"], "Area cannot exceed 10,000 sq ft");
    assert_eq!(body["fields"]["location"], "Location is required");
    assert_eq!(body["fields"]["age"], "Property age is required");

    let (_, history) = send(&state, "GET", "/history", None).await;
    assert!(history.as_array().unwrap().is_empty(), "nothing recorded");
}

// ===========================================================================
// TEST 5: saved model lifecycle: save, list, load, delete, delete again
// ===========================================================================
#[tokio::test]
async fn test_saved_model_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let state = make_state(&dir);

    let (status, body) = send(&state, "POST", "/models", Some(json!({"name": "Spring"}))).await;
    assert_eq!(status, StatusCode::OK, "save failed: {:?}", body);
    let id = body["id"].as_str().unwrap().to_string();
    assert!(id.starts_with("model-"));

    let (_, models) = send(&state, "GET", "/models", None).await;
    assert!(models
        .as_array()
        .unwrap()
        .iter()
        .any(|m| m["id"] == id.as_str() && m["name"] == "Spring"));

    let (status, body) = send(&state, "POST", &format!("/models/{}/load", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["loaded"], true);

    let (status, _) = send(&state, "DELETE", &format!("/models/{}", id), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&state, "DELETE", &format!("/models/{}", id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], "error");

    let (status, _) = send(&state, "POST", "/models/model-missing/load", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ===========================================================================
// TEST 6: metrics: 404 before any prediction, summary after
// ===========================================================================
#[tokio::test]
async fn test_metrics_for_model() {
    let dir = tempfile::tempdir().unwrap();
    let state = make_state(&dir);

    let (status, _) = metrics_inner(&state, "model-none".to_string()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, body) = send(&state, "POST", "/predict", Some(sample_form())).await;
    let model_id = body["record"]["modelId"].as_str().unwrap().to_string();

    let (status, metrics) =
        send(&state, "GET", &format!("/models/{}/metrics", model_id), None).await;
    assert_eq!(status, StatusCode::OK, "metrics failed: {:?}", metrics);
    assert_eq!(metrics["totalPredictions"], 1);
    assert_eq!(metrics["locationBreakdown"]["Suburban"]["count"], 1);
}

// ===========================================================================
// TEST 7: feedback: validation, auto-close, and stats
// ===========================================================================
#[tokio::test]
async fn test_feedback_flow() {
    let dir = tempfile::tempdir().unwrap();
    let state = make_state(&dir);

    let (status, body) = send(
        &state,
        "POST",
        "/feedback",
        Some(json!({"prediction": 400000, "rating": 2})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["fields"]["feedback"],
        "Please tell us why the prediction seems off to you"
    );

    let (status, body) = send(
        &state,
        "POST",
        "/feedback",
        Some(json!({"prediction": 400000, "rating": 5})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "feedback failed: {:?}", body);
    assert_eq!(body["auto_close"], true);
    assert_eq!(body["feedback"]["feedback"], "Excellent prediction!");

    let (status, stats) = send(&state, "GET", "/feedback/stats", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["totalFeedback"], 1);
    assert_eq!(stats["averageRating"], 5.0);
}

// ===========================================================================
// TEST 8: GET /importance: all seven features reported
// ===========================================================================
#[tokio::test]
async fn test_importance_endpoint() {
    let dir = tempfile::tempdir().unwrap();
    let state = make_state(&dir);

    for area in [1200, 2000, 3100] {
        let mut form = sample_form();
        form["area"] = json!(area);
        let (status, _) = send(&state, "POST", "/predict", Some(form)).await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = send(&state, "GET", "/importance?limit=10", None).await;
    assert_eq!(status, StatusCode::OK);
    let map = body.as_object().unwrap();
    assert!(map.contains_key("area"));
    assert!(map.values().all(|v| v.is_number()));
}

// ===========================================================================
// TEST 9: startup open: unreachable database surfaces as a storage error
// ===========================================================================
#[tokio::test]
async fn test_open_rejects_unreachable_database() {
    let dir = tempfile::tempdir().unwrap();

    let state = AppState::open(make_config(&dir)).await.unwrap();
    assert!(state.store.health_check().await.is_ok());

    let mut config = make_config(&dir);
    config.storage.database_path = "/nonexistent-dir/sub/valuer.db".to_string();
    let err = AppState::open(config).await.err().unwrap();
    assert!(matches!(err, ValuerError::Storage(StorageError::Unavailable(_))));
    assert!(err.to_string().starts_with("Storage error:"));
}
