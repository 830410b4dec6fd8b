//! Training data for the price model
//!
//! The seed set is a fixed handful of already-normalized examples covering
//! all three locations; it is what the engine trains on at construction.
//! Full training merges it with an optional JSON dataset, accepting both
//! plain field names and the spreadsheet column headers of the exported
//! listings file.

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

use crate::config::ModelConfig;
use crate::engine::{encode_features, normalize_price};
use crate::models::{Location, PropertyInput};
use crate::network::TrainingSample;

#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("failed to read dataset: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse dataset: {0}")]
    Parse(#[from] serde_json::Error),
}

/// `(area, bedrooms, bathrooms, location, age) -> price`, all normalized.
const SEED: [(f64, f64, f64, Location, f64, f64); 7] = [
    (0.15, 0.2, 0.2, Location::Downtown, 0.1, 0.65),
    (0.3, 0.4, 0.3, Location::Downtown, 0.3, 0.8),
    (0.5, 0.6, 0.4, Location::Downtown, 0.2, 0.9),
    (0.4, 0.4, 0.3, Location::Suburban, 0.1, 0.55),
    (0.7, 0.6, 0.4, Location::Suburban, 0.3, 0.65),
    (0.5, 0.4, 0.2, Location::Rural, 0.2, 0.3),
    (0.8, 0.5, 0.3, Location::Rural, 0.1, 0.4),
];

pub fn seed_samples() -> Vec<TrainingSample> {
    SEED.iter()
        .map(|&(area, bedrooms, bathrooms, location, age, price)| TrainingSample {
            input: vec![
                area,
                bedrooms,
                bathrooms,
                f64::from(u8::from(location == Location::Downtown)),
                f64::from(u8::from(location == Location::Suburban)),
                f64::from(u8::from(location == Location::Rural)),
                age,
            ],
            output: vec![price],
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct DatasetRecord {
    #[serde(alias = "Area (sq ft)")]
    area: f64,
    #[serde(alias = "Bedrooms")]
    bedrooms: f64,
    #[serde(alias = "Bathrooms")]
    bathrooms: f64,
    #[serde(alias = "Location")]
    location: String,
    #[serde(alias = "Age of Property (years)")]
    age: f64,
    #[serde(default)]
    price: Option<f64>,
    #[serde(default, rename = "Price (in $1000)")]
    price_thousands: Option<f64>,
}

impl DatasetRecord {
    fn into_sample(self) -> Option<TrainingSample> {
        let location: Location = self.location.parse().ok()?;
        let price = self
            .price
            .or(self.price_thousands.map(|p| p * 1000.0))?;
        if self.bedrooms < 1.0 || self.age < 0.0 {
            return None;
        }
        let input = PropertyInput::new(
            self.area,
            self.bedrooms.round() as u32,
            self.bathrooms,
            location,
            self.age.round() as u32,
        )
        .ok()?;

        Some(TrainingSample {
            input: encode_features(&input).to_vec(),
            output: vec![normalize_price(price as i64)],
        })
    }
}

/// Load a JSON array of listings. Unusable records are skipped.
pub async fn load_dataset(path: &Path) -> Result<Vec<TrainingSample>, DatasetError> {
    let raw = tokio::fs::read_to_string(path).await?;
    let rows: Vec<serde_json::Value> = serde_json::from_str(&raw)?;
    let total = rows.len();

    // Rows are converted one at a time so a malformed row only costs itself.
    let samples: Vec<TrainingSample> = rows
        .into_iter()
        .filter_map(|row| serde_json::from_value::<DatasetRecord>(row).ok())
        .filter_map(DatasetRecord::into_sample)
        .collect();

    if samples.len() < total {
        tracing::warn!(
            skipped = total - samples.len(),
            kept = samples.len(),
            path = %path.display(),
            "Skipped malformed dataset records"
        );
    }
    Ok(samples)
}

/// Seed examples plus the configured dataset, if any.
pub async fn assemble_training_set(config: &ModelConfig) -> Vec<TrainingSample> {
    let mut samples = seed_samples();

    if let Some(path) = &config.dataset_path {
        match load_dataset(Path::new(path)).await {
            Ok(extra) => {
                tracing::info!(records = extra.len(), path = %path, "Loaded training dataset");
                samples.extend(extra);
            }
            Err(e) => {
                tracing::warn!(error = %e, path = %path, "Dataset unavailable, training on seed examples only");
            }
        }
    }

    samples
}
