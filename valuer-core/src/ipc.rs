use serde::{Deserialize, Serialize};

use crate::error::ValidationErrors;
use crate::feedback::FeedbackDraft;
use crate::validate::PropertyForm;

pub const PROTOCOL_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ValuerRequest {
    Ping,
    Health,
    Predict {
        form: PropertyForm,
    },
    History {
        limit: Option<u32>,
    },
    ListModels,
    SaveModel {
        name: String,
    },
    LoadModel {
        id: String,
    },
    DeleteModel {
        id: String,
    },
    Metrics {
        model_id: String,
    },
    Feedback {
        draft: FeedbackDraft,
    },
    FeedbackStats,
    FeatureImportance {
        limit: Option<u32>,
    },
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ValuerResponse {
    pub status: String,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub version: String,
}

impl ValuerResponse {
    pub fn ok(data: serde_json::Value) -> Self {
        Self {
            status: "ok".to_string(),
            data: Some(data),
            error: None,
            version: PROTOCOL_VERSION.to_string(),
        }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            data: None,
            error: Some(msg.into()),
            version: PROTOCOL_VERSION.to_string(),
        }
    }

    /// Rejected input; `data.fields` maps each bad field to its message.
    pub fn invalid(errors: &ValidationErrors) -> Self {
        Self {
            status: "invalid".to_string(),
            data: Some(serde_json::json!({ "fields": errors.fields })),
            error: Some(errors.to_string()),
            version: PROTOCOL_VERSION.to_string(),
        }
    }

    pub fn pong() -> Self {
        Self::ok(serde_json::json!({"pong": true}))
    }

    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_is_tagged_by_action() {
        let json = serde_json::to_value(ValuerRequest::Metrics {
            model_id: "default-model".to_string(),
        })
        .unwrap();
        assert_eq!(json["action"], "metrics");
        assert_eq!(json["model_id"], "default-model");

        let parsed: ValuerRequest =
            serde_json::from_str(r#"{"action": "history", "limit": 5}"#).unwrap();
        assert!(matches!(parsed, ValuerRequest::History { limit: Some(5) }));
    }

    #[test]
    fn test_invalid_response_carries_fields() {
        let mut errors = ValidationErrors::new();
        errors.add("area", "Area is required");
        let resp = ValuerResponse::invalid(&errors);

        assert!(!resp.is_ok());
        assert_eq!(resp.data.unwrap()["fields"]["area"], "Area is required");
        assert_eq!(resp.error.as_deref(), Some("area: Area is required"));
    }
}
