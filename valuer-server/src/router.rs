use serde::Serialize;
use valuer_core::ipc::{ValuerRequest, ValuerResponse};
use valuer_core::models::FeedbackRecord;
use valuer_core::ValidationErrors;

use crate::state::AppState;

#[derive(Debug, Serialize)]
struct FeedbackAck {
    feedback: FeedbackRecord,
    auto_close: bool,
}

fn ok_value<T: Serialize>(value: &T) -> ValuerResponse {
    match serde_json::to_value(value) {
        Ok(data) => ValuerResponse::ok(data),
        Err(e) => ValuerResponse::err(format!("Serialization error: {}", e)),
    }
}

pub async fn handle_request(request: ValuerRequest, state: &AppState) -> ValuerResponse {
    match request {
        ValuerRequest::Ping => ValuerResponse::pong(),
        ValuerRequest::Health => {
            let sqlite = match state.store.health_check().await {
                Ok(v) => v,
                Err(e) => return ValuerResponse::err(format!("DB Health Check failed: {}", e)),
            };
            let schema_version = state.store.schema_version().await.unwrap_or_default();
            ValuerResponse::ok(serde_json::json!({
                "sqlite": sqlite,
                "schema_version": schema_version,
                "model_status": state.engine.status(),
                "model": state.manager.current_model_info(),
                "status": "healthy"
            }))
        }
        ValuerRequest::Predict { form } => match state.service.predict_form(&form).await {
            Ok(outcome) => ok_value(&outcome),
            Err(errors) => ValuerResponse::invalid(&errors),
        },
        ValuerRequest::History { limit } => {
            ok_value(&state.manager.prediction_history(limit).await)
        }
        ValuerRequest::ListModels => ok_value(&state.manager.list_saved_models().await),
        ValuerRequest::SaveModel { name } => {
            let name = name.trim();
            if name.is_empty() {
                let mut errors = ValidationErrors::new();
                errors.add("name", "Model name is required");
                return ValuerResponse::invalid(&errors);
            }
            match state.manager.save_current_model(name).await {
                Ok(id) => ValuerResponse::ok(serde_json::json!({"saved": true, "id": id})),
                Err(e) => ValuerResponse::err(e.to_string()),
            }
        }
        ValuerRequest::LoadModel { id } => {
            let loaded = state.manager.load_saved_model(&id).await;
            ValuerResponse::ok(serde_json::json!({"loaded": loaded, "id": id}))
        }
        ValuerRequest::DeleteModel { id } => {
            let deleted = state.manager.delete_saved_model(&id).await;
            ValuerResponse::ok(serde_json::json!({"deleted": deleted, "id": id}))
        }
        ValuerRequest::Metrics { model_id } => {
            ok_value(&state.manager.get_model_performance_metrics(&model_id).await)
        }
        ValuerRequest::Feedback { draft } => match draft.submit() {
            Ok(submitted) => {
                let record = state.feedback.save_feedback(submitted.feedback).await;
                ok_value(&FeedbackAck {
                    feedback: record,
                    auto_close: submitted.auto_close,
                })
            }
            Err(errors) => ValuerResponse::invalid(&errors),
        },
        ValuerRequest::FeedbackStats => ok_value(&state.feedback.get_feedback_stats().await),
        ValuerRequest::FeatureImportance { limit } => {
            ok_value(&state.manager.feature_importance(limit).await)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use valuer_core::config::{HttpConfig, ModelConfig, ServiceConfig, StorageConfig};
    use valuer_core::validate::PropertyForm;
    use valuer_core::ValuerConfig;

    fn make_state(dir: &tempfile::TempDir) -> AppState {
        AppState::build(ValuerConfig {
            service: ServiceConfig {
                socket_path: dir.path().join("valuer.sock").to_string_lossy().into_owned(),
                log_level: "info".to_string(),
            },
            storage: StorageConfig {
                database_path: dir.path().join("valuer.db").to_string_lossy().into_owned(),
                max_connections: 2,
                feedback_path: None,
            },
            model: ModelConfig {
                iterations: 100,
                ..ModelConfig::default()
            },
            http: HttpConfig::default(),
        })
    }

    #[tokio::test]
    async fn test_ping() {
        let dir = tempfile::tempdir().unwrap();
        let resp = handle_request(ValuerRequest::Ping, &make_state(&dir)).await;
        assert!(resp.is_ok());
        assert_eq!(resp.data.unwrap()["pong"], true);
    }

    #[tokio::test]
    async fn test_health_reports_model_status() {
        let dir = tempfile::tempdir().unwrap();
        let resp = handle_request(ValuerRequest::Health, &make_state(&dir)).await;
        let data = resp.data.unwrap();
        assert_eq!(data["status"], "healthy");
        assert_eq!(data["schema_version"], 2);
        assert_eq!(data["model_status"], "fallback_ready");
        assert!(data["model"]["features"].is_array());
    }

    #[tokio::test]
    async fn test_predict_invalid_form() {
        let dir = tempfile::tempdir().unwrap();
        let resp = handle_request(
            ValuerRequest::Predict {
                form: PropertyForm::default(),
            },
            &make_state(&dir),
        )
        .await;
        assert_eq!(resp.status, "invalid");
        assert_eq!(resp.data.unwrap()["fields"]["location"], "Location is required");
    }

    #[tokio::test]
    async fn test_save_model_requires_name() {
        let dir = tempfile::tempdir().unwrap();
        let resp = handle_request(
            ValuerRequest::SaveModel {
                name: "  ".to_string(),
            },
            &make_state(&dir),
        )
        .await;
        assert_eq!(resp.status, "invalid");
    }

    #[tokio::test]
    async fn test_metrics_for_unknown_model_is_null() {
        let dir = tempfile::tempdir().unwrap();
        let resp = handle_request(
            ValuerRequest::Metrics {
                model_id: "model-0".to_string(),
            },
            &make_state(&dir),
        )
        .await;
        assert!(resp.is_ok());
        assert!(resp.data.unwrap().is_null());
    }
}
