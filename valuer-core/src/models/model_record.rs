use serde::{Deserialize, Serialize};

/// Well-known id of the model restored on startup.
pub const DEFAULT_MODEL_ID: &str = "default-model";

/// Network input features, in input-neuron order.
pub const MODEL_FEATURES: [&str; 7] = [
    "area",
    "bedrooms",
    "bathrooms",
    "location_Downtown",
    "location_Suburban",
    "location_Rural",
    "age",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub id: String,
    pub name: String,
    /// Epoch milliseconds.
    pub timestamp: i64,
    pub features: Vec<String>,
}

impl ModelMetadata {
    pub fn default_model(timestamp: i64) -> Self {
        Self {
            id: DEFAULT_MODEL_ID.to_string(),
            name: "Default Model".to_string(),
            timestamp,
            features: MODEL_FEATURES.iter().map(|f| f.to_string()).collect(),
        }
    }

    /// Metadata for a user-named snapshot: `model-<timestamp>`.
    pub fn named(&self, name: &str, timestamp: i64) -> Self {
        Self {
            id: format!("model-{timestamp}"),
            name: name.to_string(),
            timestamp,
            features: self.features.clone(),
        }
    }
}

/// A persisted model snapshot. `model_data` is the network's own JSON form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelRecord {
    pub metadata: ModelMetadata,
    pub model_data: serde_json::Value,
}
