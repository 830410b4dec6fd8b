//! Model manager: saved-model commands and read-side analytics over the
//! prediction history.
//!
//! Everything here degrades instead of failing: storage errors are logged
//! and turned into an empty list, `None` or `false`.

use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::engine::{EngineStatus, ModelEngine};
use crate::error::ModelError;
use crate::models::{Location, ModelMetadata, PredictionRecord};
use crate::store::PersistentStore;

pub const DEFAULT_IMPORTANCE_LIMIT: u32 = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocationStats {
    pub count: usize,
    pub sum: f64,
    pub average: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelPerformance {
    pub total_predictions: usize,
    pub avg_price: f64,
    pub location_breakdown: BTreeMap<Location, LocationStats>,
    pub first_prediction_date: DateTime<Utc>,
    pub last_prediction_date: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentModelInfo {
    pub status: EngineStatus,
    /// A full training run is in progress; the current network still serves.
    pub training: bool,
    #[serde(flatten)]
    pub metadata: ModelMetadata,
}

pub struct ModelManager {
    store: Arc<PersistentStore>,
    engine: Arc<ModelEngine>,
}

impl ModelManager {
    pub fn new(store: Arc<PersistentStore>, engine: Arc<ModelEngine>) -> Self {
        Self { store, engine }
    }

    pub async fn list_saved_models(&self) -> Vec<ModelMetadata> {
        self.store.list_models().await.unwrap_or_else(|e| {
            tracing::error!(error = %e, "Failed to list models");
            Vec::new()
        })
    }

    pub async fn get_model_performance_metrics(&self, model_id: &str) -> Option<ModelPerformance> {
        match self
            .store
            .get_predictions_for_model(model_id, Some(u32::MAX))
            .await
        {
            Ok(predictions) => performance_metrics(&predictions),
            Err(e) => {
                tracing::error!(error = %e, model_id, "Error getting model metrics");
                None
            }
        }
    }

    pub async fn save_current_model(&self, name: &str) -> Result<String, ModelError> {
        self.engine.save_as(name).await
    }

    pub async fn load_saved_model(&self, model_id: &str) -> bool {
        self.engine.load_saved(model_id).await.unwrap_or_else(|e| {
            tracing::error!(error = %e, model_id, "Failed to load model");
            false
        })
    }

    pub async fn delete_saved_model(&self, model_id: &str) -> bool {
        self.store.delete_model(model_id).await.unwrap_or_else(|e| {
            tracing::error!(error = %e, model_id, "Failed to delete model");
            false
        })
    }

    pub fn current_model_info(&self) -> CurrentModelInfo {
        CurrentModelInfo {
            status: self.engine.status(),
            training: self.engine.is_training(),
            metadata: self.engine.current_metadata(),
        }
    }

    pub async fn prediction_history(&self, limit: Option<u32>) -> Vec<PredictionRecord> {
        self.store
            .get_prediction_history(limit)
            .await
            .unwrap_or_else(|e| {
                tracing::error!(error = %e, "Failed to read prediction history");
                Vec::new()
            })
    }

    /// Importance percentages over the most recent predictions.
    pub async fn feature_importance(&self, limit: Option<u32>) -> BTreeMap<String, f64> {
        let history = self
            .prediction_history(Some(limit.unwrap_or(DEFAULT_IMPORTANCE_LIMIT)))
            .await;
        feature_importance(&history)
    }
}

/// `None` for an empty slice.
pub fn performance_metrics(predictions: &[PredictionRecord]) -> Option<ModelPerformance> {
    let first = predictions.iter().map(|p| p.timestamp).min()?;
    let last = predictions.iter().map(|p| p.timestamp).max()?;

    let total = predictions.len();
    let avg_price = predictions.iter().map(|p| p.price as f64).sum::<f64>() / total as f64;

    let mut location_breakdown: BTreeMap<Location, LocationStats> = BTreeMap::new();
    for p in predictions {
        let entry = location_breakdown
            .entry(p.input.location())
            .or_insert(LocationStats {
                count: 0,
                sum: 0.0,
                average: 0.0,
            });
        entry.count += 1;
        entry.sum += p.price as f64;
    }
    for stats in location_breakdown.values_mut() {
        stats.average = stats.sum / stats.count as f64;
    }

    Some(ModelPerformance {
        total_predictions: total,
        avg_price,
        location_breakdown,
        first_prediction_date: millis_to_datetime(first),
        last_prediction_date: millis_to_datetime(last),
    })
}

fn millis_to_datetime(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

fn pearson(xs: &[f64], ys: &[f64]) -> f64 {
    let n = xs.len() as f64;
    let mean_x = xs.iter().sum::<f64>() / n;
    let mean_y = ys.iter().sum::<f64>() / n;

    let (mut num, mut den_x, mut den_y) = (0.0, 0.0, 0.0);
    for (x, y) in xs.iter().zip(ys) {
        let dx = x - mean_x;
        let dy = y - mean_y;
        num += dx * dy;
        den_x += dx * dx;
        den_y += dy * dy;
    }

    if den_x > 0.0 && den_y > 0.0 {
        num / (den_x * den_y).sqrt()
    } else {
        0.0
    }
}

/// Relative influence of each input on price, as percentages.
///
/// Numeric features score the absolute correlation with price (an even
/// 0.25 each below three records); each location scores how far its
/// average price sits from the overall average. Empty input gives an
/// empty map.
pub fn feature_importance(predictions: &[PredictionRecord]) -> BTreeMap<String, f64> {
    let mut importance = BTreeMap::new();
    if predictions.is_empty() {
        return importance;
    }

    let prices: Vec<f64> = predictions.iter().map(|p| p.price as f64).collect();
    let avg_price = prices.iter().sum::<f64>() / prices.len() as f64;

    let numeric: [(&str, fn(&PredictionRecord) -> f64); 4] = [
        ("area", |p| p.input.area()),
        ("bedrooms", |p| f64::from(p.input.bedrooms())),
        ("bathrooms", |p| p.input.bathrooms()),
        ("age", |p| f64::from(p.input.age())),
    ];
    for (name, value) in numeric {
        let score = if predictions.len() < 3 {
            0.25
        } else {
            let values: Vec<f64> = predictions.iter().map(value).collect();
            pearson(&values, &prices).abs()
        };
        importance.insert(name.to_string(), score);
    }

    for location in Location::ALL {
        let at: Vec<f64> = predictions
            .iter()
            .filter(|p| p.input.location() == location)
            .map(|p| p.price as f64)
            .collect();
        let score = if at.is_empty() || avg_price <= 0.0 {
            0.0
        } else {
            let loc_avg = at.iter().sum::<f64>() / at.len() as f64;
            (loc_avg - avg_price).abs() / avg_price
        };
        importance.insert(format!("location_{location}"), score);
    }

    let total: f64 = importance.values().sum();
    if total > 0.0 {
        for score in importance.values_mut() {
            *score = *score / total * 100.0;
        }
    }
    importance
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageConfig;
    use crate::engine::tests::fast_config;
    use crate::models::{NewPrediction, PropertyInput};

    fn record(location: Location, price: i64, area: f64, timestamp: i64) -> PredictionRecord {
        PredictionRecord {
            id: Some(timestamp),
            input: PropertyInput::new(area, 3, 2.0, location, 10).unwrap(),
            price,
            model_id: "default-model".to_string(),
            model_name: "Default Model".to_string(),
            is_fallback: false,
            timestamp,
            error: None,
        }
    }

    #[test]
    fn test_performance_metrics_breakdown() {
        let predictions = vec![
            record(Location::Downtown, 300_000, 1500.0, 1_000),
            record(Location::Downtown, 400_000, 1500.0, 3_000),
            record(Location::Rural, 500_000, 1500.0, 2_000),
        ];
        let metrics = performance_metrics(&predictions).unwrap();

        assert_eq!(metrics.total_predictions, 3);
        assert_eq!(metrics.avg_price, 400_000.0);
        let downtown = &metrics.location_breakdown[&Location::Downtown];
        assert_eq!(downtown.count, 2);
        assert_eq!(downtown.average, 350_000.0);
        assert!(!metrics.location_breakdown.contains_key(&Location::Suburban));
        assert_eq!(metrics.first_prediction_date.timestamp_millis(), 1_000);
        assert_eq!(metrics.last_prediction_date.timestamp_millis(), 3_000);
    }

    #[test]
    fn test_performance_metrics_empty_is_none() {
        assert!(performance_metrics(&[]).is_none());
    }

    #[test]
    fn test_importance_with_few_records_is_even_for_numeric() {
        let importance = feature_importance(&[
            record(Location::Downtown, 300_000, 1500.0, 1),
            record(Location::Downtown, 300_000, 1500.0, 2),
        ]);
        assert_eq!(importance.len(), 7);
        assert_eq!(importance["area"], importance["age"]);
        assert_eq!(importance["location_Rural"], 0.0);
        let total: f64 = importance.values().sum();
        assert!((total - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_importance_tracks_correlated_feature() {
        let importance = feature_importance(&[
            record(Location::Suburban, 200_000, 1000.0, 1),
            record(Location::Suburban, 400_000, 2000.0, 2),
            record(Location::Suburban, 600_000, 3000.0, 3),
        ]);
        // Area is perfectly correlated; the constant features score zero.
        assert!((importance["area"] - 100.0).abs() < 1e-9);
        assert_eq!(importance["bedrooms"], 0.0);
        assert!(feature_importance(&[]).is_empty());
    }

    #[tokio::test]
    async fn test_manager_over_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(PersistentStore::new(StorageConfig {
            database_path: dir.path().join("valuer.db").to_string_lossy().into_owned(),
            max_connections: 2,
            feedback_path: None,
        }));
        let engine = Arc::new(ModelEngine::new(store.clone(), fast_config()));
        let manager = ModelManager::new(store.clone(), engine);

        assert!(manager.list_saved_models().await.is_empty());
        assert!(manager.get_model_performance_metrics("default-model").await.is_none());

        for (location, price) in [
            (Location::Downtown, 300_000),
            (Location::Downtown, 400_000),
            (Location::Rural, 500_000),
        ] {
            store
                .save_prediction(&NewPrediction {
                    input: PropertyInput::new(1500.0, 3, 2.0, location, 10).unwrap(),
                    price,
                    model_id: "default-model".to_string(),
                    model_name: "Default Model".to_string(),
                    is_fallback: false,
                    error: None,
                })
                .await
                .unwrap();
        }
        let metrics = manager
            .get_model_performance_metrics("default-model")
            .await
            .unwrap();
        assert_eq!(metrics.avg_price, 400_000.0);
        assert_eq!(metrics.location_breakdown[&Location::Downtown].average, 350_000.0);

        let id = manager.save_current_model("Snapshot").await.unwrap();
        assert_eq!(manager.list_saved_models().await.len(), 1);
        assert_eq!(manager.current_model_info().metadata.id, id);
        assert!(manager.load_saved_model(&id).await);
        assert_eq!(manager.current_model_info().status, EngineStatus::Ready);
        assert!(!manager.current_model_info().training);

        assert!(manager.delete_saved_model(&id).await);
        assert!(store.load_model(&id).await.unwrap().is_none());
        assert!(!manager.load_saved_model(&id).await);

        assert_eq!(manager.prediction_history(None).await.len(), 3);
        assert_eq!(manager.feature_importance(None).await.len(), 7);
    }
}
