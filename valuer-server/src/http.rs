//! Valuer HTTP REST API
//!
//! Axum-based HTTP server exposing the same operations as the Unix socket
//! IPC server, on port 8787 by default.
//!
//! Each endpoint has a thin axum handler that delegates to an inner
//! function returning `(StatusCode, serde_json::Value)`; the inner functions
//! go through the IPC router so both transports share one code path.
//!
//! Endpoints:
//! - GET    /health             : store and model status
//! - GET    /version            : server version info
//! - POST   /predict            : validate a property form and predict
//! - GET    /history?limit=N    : recent predictions, newest first
//! - GET    /models             : saved model metadata
//! - POST   /models             : save the current model under a name
//! - POST   /models/:id/load    : make a saved model current
//! - DELETE /models/:id         : delete a saved model
//! - GET    /models/:id/metrics : performance metrics for a model
//! - POST   /feedback           : submit a rating for a prediction
//! - GET    /feedback/stats     : rating summary
//! - GET    /importance?limit=N : feature importance over recent predictions

use std::sync::Arc;

use anyhow::Result;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use valuer_core::ipc::{ValuerRequest, ValuerResponse};
use valuer_core::validate::PropertyForm;
use valuer_core::FeedbackDraft;

use crate::router::handle_request;
use crate::state::AppState;

/// Build the Axum router with all endpoints
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        .route("/predict", post(predict_handler))
        .route("/history", get(history_handler))
        .route("/models", get(list_models_handler).post(save_model_handler))
        .route("/models/:id", delete(delete_model_handler))
        .route("/models/:id/load", post(load_model_handler))
        .route("/models/:id/metrics", get(metrics_handler))
        .route("/feedback", post(feedback_handler))
        .route("/feedback/stats", get(feedback_stats_handler))
        .route("/importance", get(importance_handler))
        .with_state(state)
}

/// Start the HTTP server on the configured address.
/// Gracefully shuts down when the broadcast shutdown signal fires.
pub async fn start_http_server(
    state: AppState,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let addr = format!("{}:{}", state.config.http.host, state.config.http.port);
    let app = build_router(Arc::new(state));
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Valuer HTTP API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("HTTP server shutting down...");
        })
        .await?;

    Ok(())
}

// ============================================================================
// Request / Response DTOs
// ============================================================================

#[derive(Debug, Deserialize, Default)]
pub struct LimitQuery {
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct SaveModelRequest {
    pub name: Option<String>,
}

/// Standard HTTP error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub status: String,
}

impl ErrorResponse {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            error: msg.into(),
            status: "error".to_string(),
        }
    }
}

fn not_found(msg: impl Into<String>) -> (StatusCode, serde_json::Value) {
    (
        StatusCode::NOT_FOUND,
        serde_json::json!(ErrorResponse::new(msg)),
    )
}

// ============================================================================
// Inner (directly testable) business logic functions
// ============================================================================

/// Route an IPC request and map the response onto an HTTP status.
pub async fn dispatch(state: &AppState, request: ValuerRequest) -> (StatusCode, serde_json::Value) {
    response_to_http(handle_request(request, state).await)
}

pub async fn health_inner(state: &AppState) -> (StatusCode, serde_json::Value) {
    let (status, mut body) = dispatch(state, ValuerRequest::Health).await;
    if status != StatusCode::OK {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            serde_json::json!({
                "status": "unhealthy",
                "error": body["error"].clone(),
            }),
        );
    }
    if let Some(obj) = body.as_object_mut() {
        obj.insert("version".to_string(), serde_json::json!(env!("CARGO_PKG_VERSION")));
        obj.insert(
            "socket".to_string(),
            serde_json::json!(state.config.service.socket_path),
        );
    }
    (status, body)
}

/// Version info (pure, no IO).
pub fn version_inner() -> serde_json::Value {
    serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "protocol": "valuer/1",
    })
}

pub async fn predict_inner(state: &AppState, form: PropertyForm) -> (StatusCode, serde_json::Value) {
    dispatch(state, ValuerRequest::Predict { form }).await
}

pub async fn save_model_inner(
    state: &AppState,
    req: SaveModelRequest,
) -> (StatusCode, serde_json::Value) {
    let name = req.name.unwrap_or_default();
    dispatch(state, ValuerRequest::SaveModel { name }).await
}

pub async fn load_model_inner(state: &AppState, id: String) -> (StatusCode, serde_json::Value) {
    let (status, body) = dispatch(state, ValuerRequest::LoadModel { id: id.clone() }).await;
    if status == StatusCode::OK && body["loaded"] == false {
        return not_found(format!("model {} not found", id));
    }
    (status, body)
}

pub async fn delete_model_inner(state: &AppState, id: String) -> (StatusCode, serde_json::Value) {
    let (status, body) = dispatch(state, ValuerRequest::DeleteModel { id: id.clone() }).await;
    if status == StatusCode::OK && body["deleted"] == false {
        return not_found(format!("model {} not found", id));
    }
    (status, body)
}

pub async fn metrics_inner(state: &AppState, model_id: String) -> (StatusCode, serde_json::Value) {
    let (status, body) = dispatch(
        state,
        ValuerRequest::Metrics {
            model_id: model_id.clone(),
        },
    )
    .await;
    if status == StatusCode::OK && body.is_null() {
        return not_found(format!("no predictions recorded for model {}", model_id));
    }
    (status, body)
}

// ============================================================================
// Axum handler wrappers, delegating to the inner functions
// ============================================================================

pub async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let (status, body) = health_inner(&state).await;
    (status, Json(body))
}

pub async fn version_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(version_inner()))
}

pub async fn predict_handler(
    State(state): State<Arc<AppState>>,
    Json(form): Json<PropertyForm>,
) -> impl IntoResponse {
    let (status, body) = predict_inner(&state, form).await;
    (status, Json(body))
}

pub async fn history_handler(
    State(state): State<Arc<AppState>>,
    Query(q): Query<LimitQuery>,
) -> impl IntoResponse {
    let (status, body) = dispatch(&state, ValuerRequest::History { limit: q.limit }).await;
    (status, Json(body))
}

pub async fn list_models_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let (status, body) = dispatch(&state, ValuerRequest::ListModels).await;
    (status, Json(body))
}

pub async fn save_model_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SaveModelRequest>,
) -> impl IntoResponse {
    let (status, body) = save_model_inner(&state, req).await;
    (status, Json(body))
}

pub async fn load_model_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let (status, body) = load_model_inner(&state, id).await;
    (status, Json(body))
}

pub async fn delete_model_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let (status, body) = delete_model_inner(&state, id).await;
    (status, Json(body))
}

pub async fn metrics_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let (status, body) = metrics_inner(&state, id).await;
    (status, Json(body))
}

pub async fn feedback_handler(
    State(state): State<Arc<AppState>>,
    Json(draft): Json<FeedbackDraft>,
) -> impl IntoResponse {
    let (status, body) = dispatch(&state, ValuerRequest::Feedback { draft }).await;
    (status, Json(body))
}

pub async fn feedback_stats_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let (status, body) = dispatch(&state, ValuerRequest::FeedbackStats).await;
    (status, Json(body))
}

pub async fn importance_handler(
    State(state): State<Arc<AppState>>,
    Query(q): Query<LimitQuery>,
) -> impl IntoResponse {
    let (status, body) =
        dispatch(&state, ValuerRequest::FeatureImportance { limit: q.limit }).await;
    (status, Json(body))
}

// ============================================================================
// Helpers
// ============================================================================

/// Convert an IPC `ValuerResponse` into an HTTP status and body.
/// Rejected input is a 400 carrying the per-field messages.
pub fn response_to_http(response: ValuerResponse) -> (StatusCode, serde_json::Value) {
    match response.status.as_str() {
        "ok" => (
            StatusCode::OK,
            response.data.unwrap_or(serde_json::json!({})),
        ),
        "invalid" => {
            let fields = response
                .data
                .and_then(|d| d.get("fields").cloned())
                .unwrap_or(serde_json::json!({}));
            (
                StatusCode::BAD_REQUEST,
                serde_json::json!({
                    "error": response.error.unwrap_or_else(|| "invalid input".to_string()),
                    "status": "invalid",
                    "fields": fields,
                }),
            )
        }
        _ => (
            StatusCode::INTERNAL_SERVER_ERROR,
            serde_json::json!(ErrorResponse::new(
                response.error.unwrap_or_else(|| "unknown error".to_string())
            )),
        ),
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use valuer_core::ValidationErrors;

    // ========================================================================
    // TEST 1: version_inner is pure and returns correct fields
    // ========================================================================
    #[test]
    fn test_version_inner_pure() {
        let v = version_inner();
        assert!(v["version"].is_string(), "version must be string");
        assert_eq!(v["protocol"], "valuer/1");
    }

    // ========================================================================
    // TEST 2: response_to_http: ok response extracts data
    // ========================================================================
    #[test]
    fn test_response_to_http_ok() {
        let resp = ValuerResponse::ok(serde_json::json!({"count": 0}));
        let (status, data) = response_to_http(resp);
        assert_eq!(status, StatusCode::OK);
        assert_eq!(data["count"], 0);
    }

    // ========================================================================
    // TEST 3: response_to_http: invalid input maps to 400 with fields
    // ========================================================================
    #[test]
    fn test_response_to_http_invalid() {
        let mut errors = ValidationErrors::new();
        errors.add("age", "Property age is required");
        let (status, body) = response_to_http(ValuerResponse::invalid(&errors));
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["fields"]["age"], "Property age is required");
    }

    // ========================================================================
    // TEST 4: response_to_http: error maps to 500
    // ========================================================================
    #[test]
    fn test_response_to_http_error() {
        let (status, body) = response_to_http(ValuerResponse::err("something went wrong"));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "something went wrong");
        assert_eq!(body["status"], "error");
    }

    // ========================================================================
    // TEST 5: response_to_http: error with no message returns fallback
    // ========================================================================
    #[test]
    fn test_response_to_http_error_no_message() {
        let mut resp = ValuerResponse::err("x");
        resp.error = None;
        let (_, body) = response_to_http(resp);
        assert_eq!(body["error"], "unknown error");
    }
}
