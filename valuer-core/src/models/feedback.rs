use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::property::{Location, PropertyInput};

/// The subset of a property description echoed back with feedback.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedbackInput {
    pub area: Option<f64>,
    pub bedrooms: Option<u32>,
    pub bathrooms: Option<f64>,
    pub location: Option<Location>,
    pub age: Option<u32>,
}

impl From<&PropertyInput> for FeedbackInput {
    fn from(input: &PropertyInput) -> Self {
        Self {
            area: Some(input.area()),
            bedrooms: Some(input.bedrooms()),
            bathrooms: Some(input.bathrooms()),
            location: Some(input.location()),
            age: Some(input.age()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewFeedback {
    pub prediction: f64,
    #[serde(default)]
    pub input_data: FeedbackInput,
    pub rating: u8,
    #[serde(default)]
    pub feedback: String,
    /// ISO-8601; stamped on save when absent.
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackRecord {
    pub id: u64,
    pub prediction: f64,
    #[serde(default)]
    pub input_data: FeedbackInput,
    pub rating: u8,
    #[serde(default)]
    pub feedback: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackStats {
    pub total_feedback: usize,
    pub average_rating: f64,
    pub rating_counts: BTreeMap<u8, usize>,
}
