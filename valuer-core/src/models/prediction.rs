use serde::{Deserialize, Serialize};

use super::property::PropertyInput;

/// A prediction attempt before the store has assigned its id and timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPrediction {
    pub input: PropertyInput,
    pub price: i64,
    pub model_id: String,
    pub model_name: String,
    pub is_fallback: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionRecord {
    /// `None` when the attempt could not be written to the store.
    pub id: Option<i64>,
    pub input: PropertyInput,
    pub price: i64,
    pub model_id: String,
    pub model_name: String,
    pub is_fallback: bool,
    /// Epoch milliseconds.
    pub timestamp: i64,
    pub error: Option<String>,
}

impl PredictionRecord {
    pub fn from_new(new: NewPrediction, id: Option<i64>, timestamp: i64) -> Self {
        Self {
            id,
            input: new.input,
            price: new.price,
            model_id: new.model_id,
            model_name: new.model_name,
            is_fallback: new.is_fallback,
            timestamp,
            error: new.error,
        }
    }
}
