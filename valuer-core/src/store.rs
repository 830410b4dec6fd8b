//! Persistent store for model snapshots, prediction history and settings
//!
//! A lazily opened SQLite pool. The first operation creates the database
//! file and runs the schema upgrade; every later call reuses the pool.
//! Absence is always `Ok(None)` / `Ok(false)`; only genuine I/O or
//! decoding failures become a [`StorageError`].

use async_trait::async_trait;
use sqlx::SqlitePool;
use tokio::sync::OnceCell;

use crate::config::StorageConfig;
use crate::db;
use crate::error::StorageError;
use crate::models::{
    Location, ModelMetadata, ModelRecord, NewPrediction, PredictionRecord, PropertyInput,
};

pub const DEFAULT_HISTORY_LIMIT: u32 = 20;
pub const DEFAULT_MODEL_PREDICTIONS_LIMIT: u32 = 50;

// ============================================================================
// Repository seams
// ============================================================================

/// Model snapshot persistence as seen by the engine.
#[async_trait]
pub trait ModelRepository: Send + Sync {
    async fn load_model(&self, id: &str) -> Result<Option<ModelRecord>, StorageError>;
    async fn save_model(&self, record: &ModelRecord) -> Result<bool, StorageError>;
    async fn delete_model(&self, id: &str) -> Result<bool, StorageError>;
}

/// Append-only prediction history as seen by the prediction service.
#[async_trait]
pub trait PredictionLog: Send + Sync {
    /// Append and return the stored record, id and timestamp filled in.
    async fn save_prediction(&self, new: &NewPrediction)
        -> Result<PredictionRecord, StorageError>;
}

// ============================================================================
// Row types
// ============================================================================

#[derive(sqlx::FromRow)]
struct ModelRow {
    id: String,
    name: String,
    timestamp: i64,
    features: String,
    model_data: String,
}

#[derive(sqlx::FromRow)]
struct MetadataRow {
    id: String,
    name: String,
    timestamp: i64,
    features: String,
}

#[derive(sqlx::FromRow)]
struct PredictionRow {
    id: i64,
    area: f64,
    bedrooms: i64,
    bathrooms: f64,
    location: String,
    age: i64,
    price: i64,
    model_id: String,
    model_name: String,
    is_fallback: bool,
    timestamp: i64,
    error: Option<String>,
}

fn decode_features(raw: &str) -> Result<Vec<String>, StorageError> {
    serde_json::from_str(raw).map_err(|e| StorageError::Read(format!("bad features column: {e}")))
}

impl TryFrom<MetadataRow> for ModelMetadata {
    type Error = StorageError;

    fn try_from(row: MetadataRow) -> Result<Self, Self::Error> {
        Ok(ModelMetadata {
            features: decode_features(&row.features)?,
            id: row.id,
            name: row.name,
            timestamp: row.timestamp,
        })
    }
}

impl TryFrom<ModelRow> for ModelRecord {
    type Error = StorageError;

    fn try_from(row: ModelRow) -> Result<Self, Self::Error> {
        let model_data = serde_json::from_str(&row.model_data)
            .map_err(|e| StorageError::Read(format!("bad model_data for {}: {e}", row.id)))?;
        Ok(ModelRecord {
            metadata: ModelMetadata {
                features: decode_features(&row.features)?,
                id: row.id,
                name: row.name,
                timestamp: row.timestamp,
            },
            model_data,
        })
    }
}

impl TryFrom<PredictionRow> for PredictionRecord {
    type Error = StorageError;

    fn try_from(row: PredictionRow) -> Result<Self, Self::Error> {
        let location: Location = row
            .location
            .parse()
            .map_err(|e: String| StorageError::Read(format!("prediction {}: {e}", row.id)))?;
        let bedrooms = u32::try_from(row.bedrooms)
            .map_err(|_| StorageError::Read(format!("prediction {}: bad bedrooms", row.id)))?;
        let age = u32::try_from(row.age)
            .map_err(|_| StorageError::Read(format!("prediction {}: bad age", row.id)))?;
        let input = PropertyInput::new(row.area, bedrooms, row.bathrooms, location, age)
            .map_err(|e| StorageError::Read(format!("prediction {}: {e}", row.id)))?;

        Ok(PredictionRecord {
            id: Some(row.id),
            input,
            price: row.price,
            model_id: row.model_id,
            model_name: row.model_name,
            is_fallback: row.is_fallback,
            timestamp: row.timestamp,
            error: row.error,
        })
    }
}

fn read_err(e: sqlx::Error) -> StorageError {
    StorageError::Read(e.to_string())
}

fn write_err(e: sqlx::Error) -> StorageError {
    StorageError::Write(e.to_string())
}

// ============================================================================
// PersistentStore
// ============================================================================

pub struct PersistentStore {
    config: StorageConfig,
    pool: OnceCell<SqlitePool>,
}

impl PersistentStore {
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            pool: OnceCell::new(),
        }
    }

    /// Open (creating and upgrading if needed) and return the pool.
    /// Idempotent: later calls return the same pool.
    pub async fn open(&self) -> Result<&SqlitePool, StorageError> {
        self.pool
            .get_or_try_init(|| async {
                let pool = db::create_pool(&self.config)
                    .await
                    .map_err(|e| StorageError::Unavailable(e.to_string()))?;
                db::upgrade(&pool)
                    .await
                    .map_err(|e| StorageError::Unavailable(e.to_string()))?;
                tracing::info!(path = %self.config.database_path, "Opened store");
                Ok::<_, StorageError>(pool)
            })
            .await
    }

    pub async fn health_check(&self) -> Result<String, StorageError> {
        let pool = self.open().await?;
        db::health_check(pool).await.map_err(read_err)
    }

    pub async fn schema_version(&self) -> Result<i64, StorageError> {
        let pool = self.open().await?;
        db::schema_version(pool).await.map_err(read_err)
    }

    // ------------------------------------------------------------------------
    // Models
    // ------------------------------------------------------------------------

    /// Insert or overwrite by `metadata.id`.
    pub async fn save_model(&self, record: &ModelRecord) -> Result<bool, StorageError> {
        let pool = self.open().await?;
        let features = serde_json::to_string(&record.metadata.features)
            .map_err(|e| StorageError::Write(e.to_string()))?;
        let model_data = serde_json::to_string(&record.model_data)
            .map_err(|e| StorageError::Write(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO models (id, name, timestamp, features, model_data)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                timestamp = excluded.timestamp,
                features = excluded.features,
                model_data = excluded.model_data
            "#,
        )
        .bind(&record.metadata.id)
        .bind(&record.metadata.name)
        .bind(record.metadata.timestamp)
        .bind(features)
        .bind(model_data)
        .execute(pool)
        .await
        .map_err(write_err)?;

        tracing::debug!(model_id = %record.metadata.id, "Saved model");
        Ok(true)
    }

    pub async fn load_model(&self, id: &str) -> Result<Option<ModelRecord>, StorageError> {
        let pool = self.open().await?;
        let row: Option<ModelRow> = sqlx::query_as(
            "SELECT id, name, timestamp, features, model_data FROM models WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(read_err)?;

        row.map(ModelRecord::try_from).transpose()
    }

    /// `Ok(true)` when a model was removed, `Ok(false)` when none had that id.
    pub async fn delete_model(&self, id: &str) -> Result<bool, StorageError> {
        let pool = self.open().await?;
        let result = sqlx::query("DELETE FROM models WHERE id = ?1")
            .bind(id)
            .execute(pool)
            .await
            .map_err(write_err)?;
        Ok(result.rows_affected() > 0)
    }

    /// Metadata of every saved model, newest first.
    pub async fn list_models(&self) -> Result<Vec<ModelMetadata>, StorageError> {
        let pool = self.open().await?;
        let rows: Vec<MetadataRow> = sqlx::query_as(
            "SELECT id, name, timestamp, features FROM models ORDER BY timestamp DESC, id DESC",
        )
        .fetch_all(pool)
        .await
        .map_err(read_err)?;

        rows.into_iter().map(ModelMetadata::try_from).collect()
    }

    // ------------------------------------------------------------------------
    // Predictions
    // ------------------------------------------------------------------------

    /// Append a prediction, stamped with the current time.
    pub async fn save_prediction(
        &self,
        new: &NewPrediction,
    ) -> Result<PredictionRecord, StorageError> {
        let pool = self.open().await?;
        let timestamp = chrono::Utc::now().timestamp_millis();
        let input = &new.input;

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO predictions
                (area, bedrooms, bathrooms, location, age, price,
                 model_id, model_name, is_fallback, timestamp, error)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            RETURNING id
            "#,
        )
        .bind(input.area())
        .bind(i64::from(input.bedrooms()))
        .bind(input.bathrooms())
        .bind(input.location().as_str())
        .bind(i64::from(input.age()))
        .bind(new.price)
        .bind(&new.model_id)
        .bind(&new.model_name)
        .bind(new.is_fallback)
        .bind(timestamp)
        .bind(&new.error)
        .fetch_one(pool)
        .await
        .map_err(write_err)?;

        Ok(PredictionRecord::from_new(new.clone(), Some(id), timestamp))
    }

    /// Most recent first. `None` uses [`DEFAULT_HISTORY_LIMIT`].
    pub async fn get_prediction_history(
        &self,
        limit: Option<u32>,
    ) -> Result<Vec<PredictionRecord>, StorageError> {
        let pool = self.open().await?;
        let limit = limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
        let rows: Vec<PredictionRow> = sqlx::query_as(
            r#"
            SELECT id, area, bedrooms, bathrooms, location, age, price,
                   model_id, model_name, is_fallback, timestamp, error
            FROM predictions
            ORDER BY timestamp DESC, id DESC
            LIMIT ?1
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(pool)
        .await
        .map_err(read_err)?;

        rows.into_iter().map(PredictionRecord::try_from).collect()
    }

    /// Predictions made by one model, oldest first. `None` uses
    /// [`DEFAULT_MODEL_PREDICTIONS_LIMIT`].
    pub async fn get_predictions_for_model(
        &self,
        model_id: &str,
        limit: Option<u32>,
    ) -> Result<Vec<PredictionRecord>, StorageError> {
        let pool = self.open().await?;
        let limit = limit.unwrap_or(DEFAULT_MODEL_PREDICTIONS_LIMIT);
        let rows: Vec<PredictionRow> = sqlx::query_as(
            r#"
            SELECT id, area, bedrooms, bathrooms, location, age, price,
                   model_id, model_name, is_fallback, timestamp, error
            FROM predictions
            WHERE model_id = ?1
            ORDER BY id ASC
            LIMIT ?2
            "#,
        )
        .bind(model_id)
        .bind(i64::from(limit))
        .fetch_all(pool)
        .await
        .map_err(read_err)?;

        rows.into_iter().map(PredictionRecord::try_from).collect()
    }

    pub async fn clear_predictions(&self) -> Result<u64, StorageError> {
        let pool = self.open().await?;
        let result = sqlx::query("DELETE FROM predictions")
            .execute(pool)
            .await
            .map_err(write_err)?;
        Ok(result.rows_affected())
    }

    // ------------------------------------------------------------------------
    // Settings
    // ------------------------------------------------------------------------

    /// Never fails: a missing key, an unreadable store or an undecodable
    /// value all yield `default`.
    pub async fn get_setting(&self, key: &str, default: serde_json::Value) -> serde_json::Value {
        let pool = match self.open().await {
            Ok(pool) => pool,
            Err(e) => {
                tracing::warn!(error = %e, key, "Setting read failed, using default");
                return default;
            }
        };

        let row: Result<Option<(String,)>, sqlx::Error> =
            sqlx::query_as("SELECT value FROM settings WHERE key = ?1")
                .bind(key)
                .fetch_optional(pool)
                .await;

        match row {
            Ok(Some((raw,))) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                tracing::warn!(error = %e, key, "Undecodable setting, using default");
                default
            }),
            Ok(None) => default,
            Err(e) => {
                tracing::warn!(error = %e, key, "Setting read failed, using default");
                default
            }
        }
    }

    pub async fn save_setting(
        &self,
        key: &str,
        value: &serde_json::Value,
    ) -> Result<bool, StorageError> {
        let pool = self.open().await?;
        sqlx::query(
            r#"
            INSERT INTO settings (key, value) VALUES (?1, ?2)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(key)
        .bind(value.to_string())
        .execute(pool)
        .await
        .map_err(write_err)?;
        Ok(true)
    }
}

#[async_trait]
impl ModelRepository for PersistentStore {
    async fn load_model(&self, id: &str) -> Result<Option<ModelRecord>, StorageError> {
        PersistentStore::load_model(self, id).await
    }

    async fn save_model(&self, record: &ModelRecord) -> Result<bool, StorageError> {
        PersistentStore::save_model(self, record).await
    }

    async fn delete_model(&self, id: &str) -> Result<bool, StorageError> {
        PersistentStore::delete_model(self, id).await
    }
}

#[async_trait]
impl PredictionLog for PersistentStore {
    async fn save_prediction(
        &self,
        new: &NewPrediction,
    ) -> Result<PredictionRecord, StorageError> {
        PersistentStore::save_prediction(self, new).await
    }
}
