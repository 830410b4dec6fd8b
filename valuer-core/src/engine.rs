//! Model engine: one in-memory price network and its lifecycle
//!
//! The engine is usable the moment it is constructed: `new` trains a small
//! seed network synchronously and reports `FallbackReady`. `initialize`
//! then tries to restore the persisted default model, or trains a fresh one
//! on the full training set, and reports `Ready`. Training works on a
//! separate network, so the current one keeps answering until the new one
//! is swapped in. Whatever happens the engine ends up with a network to
//! run, and when it has none at all the caller can still fall back to
//! [`formula_price`].

use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio_retry::strategy::FixedInterval;
use tokio_retry::Retry;

use crate::config::ModelConfig;
use crate::dataset;
use crate::error::ModelError;
use crate::models::{
    Location, ModelMetadata, ModelRecord, PropertyInput, DEFAULT_MODEL_ID, MODEL_FEATURES,
};
use crate::network::{NetworkConfig, NeuralNetwork, TrainingOptions, TrainingSample};
use crate::store::ModelRepository;

// ============================================================================
// Normalization
// ============================================================================

pub const AREA_MAX: f64 = 6000.0;
pub const BEDROOMS_MAX: f64 = 5.0;
pub const BATHROOMS_MAX: f64 = 5.0;
pub const AGE_MAX: f64 = 100.0;
pub const PRICE_CEILING: f64 = 1_000_000.0;

const OUTPUT_LOOKUP: [&str; 1] = ["price"];

/// Network input vector in [`MODEL_FEATURES`] order, every value in [0, 1].
pub fn encode_features(input: &PropertyInput) -> [f64; 7] {
    let location = input.location();
    [
        (input.area() / AREA_MAX).clamp(0.0, 1.0),
        (f64::from(input.bedrooms()) / BEDROOMS_MAX).clamp(0.0, 1.0),
        (input.bathrooms() / BATHROOMS_MAX).clamp(0.0, 1.0),
        f64::from(u8::from(location == Location::Downtown)),
        f64::from(u8::from(location == Location::Suburban)),
        f64::from(u8::from(location == Location::Rural)),
        (f64::from(input.age()) / AGE_MAX).clamp(0.0, 1.0),
    ]
}

pub fn normalize_price(price: i64) -> f64 {
    (price as f64 / PRICE_CEILING).clamp(0.0, 1.0)
}

pub fn denormalize_price(output: f64) -> i64 {
    (output.clamp(0.0, 1.0) * PRICE_CEILING).round() as i64
}

// ============================================================================
// Formula fallback
// ============================================================================

const BASE_PRICE: f64 = 100_000.0;
const AREA_RATE: f64 = 200.0;
const BEDROOM_RATE: f64 = 25_000.0;
const BATHROOM_RATE: f64 = 15_000.0;
const AGE_RATE: f64 = 1_000.0;
const MIN_PRICE: i64 = 50_000;

fn location_multiplier(location: Location) -> f64 {
    match location {
        Location::Downtown => 1.5,
        Location::Suburban => 1.2,
        Location::Rural => 0.8,
    }
}

/// Closed-form estimate with no learned parameters, floored at `MIN_PRICE`.
pub fn formula_price(input: &PropertyInput) -> i64 {
    let raw = (BASE_PRICE + input.area() * AREA_RATE
        + f64::from(input.bedrooms()) * BEDROOM_RATE
        + input.bathrooms() * BATHROOM_RATE
        - f64::from(input.age()) * AGE_RATE)
        * location_multiplier(input.location());
    (raw.round() as i64).max(MIN_PRICE)
}

// ============================================================================
// Engine types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineStatus {
    Uninitialized,
    Training,
    Ready,
    FallbackReady,
}

impl EngineStatus {
    pub fn can_predict(self) -> bool {
        matches!(self, EngineStatus::Ready | EngineStatus::FallbackReady)
    }
}

/// A network-produced price and the model that produced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Estimate {
    pub price: i64,
    pub input: PropertyInput,
    pub model_id: String,
    pub model_name: String,
}

struct EngineState {
    status: EngineStatus,
    network: Option<NeuralNetwork>,
    metadata: ModelMetadata,
}

pub struct ModelEngine {
    repo: Arc<dyn ModelRepository>,
    config: ModelConfig,
    state: RwLock<EngineState>,
    attempts: AtomicU32,
    training: AtomicBool,
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn price_network(hidden_layers: Vec<usize>, seed: u64) -> Result<NeuralNetwork, ModelError> {
    let config = NetworkConfig::new(MODEL_FEATURES.len(), hidden_layers, 1);
    Ok(NeuralNetwork::new(config, seed)?.with_lookups(&MODEL_FEATURES, &OUTPUT_LOOKUP))
}

fn train_seed(
    hidden_layers: Vec<usize>,
    iterations: usize,
    seed: u64,
) -> Result<NeuralNetwork, ModelError> {
    let mut net = price_network(hidden_layers, seed)?;
    let opts = TrainingOptions {
        iterations,
        error_thresh: 0.01,
        learning_rate: 0.1,
        ..TrainingOptions::default()
    };
    let stats = net.train(&dataset::seed_samples(), &opts)?;
    tracing::debug!(iterations = stats.iterations, error = stats.error, "Seed network trained");
    Ok(net)
}

/// The seed network, or the minimal one if that fails.
fn fallback_network(seed: u64) -> Option<NeuralNetwork> {
    match train_seed(vec![8, 8], 2000, seed) {
        Ok(net) => Some(net),
        Err(e) => {
            tracing::warn!(error = %e, "Seed training failed, trying minimal network");
            match train_seed(vec![3], 500, seed) {
                Ok(net) => Some(net),
                Err(e) => {
                    tracing::error!(error = %e, "Minimal network training failed");
                    None
                }
            }
        }
    }
}

impl ModelEngine {
    pub fn new(repo: Arc<dyn ModelRepository>, config: ModelConfig) -> Self {
        let network = fallback_network(config.seed);
        let status = if network.is_some() {
            EngineStatus::FallbackReady
        } else {
            EngineStatus::Uninitialized
        };
        tracing::info!(status = ?status, "Model engine constructed");

        Self {
            repo,
            config,
            state: RwLock::new(EngineState {
                status,
                network,
                metadata: ModelMetadata::default_model(now_millis()),
            }),
            attempts: AtomicU32::new(0),
            training: AtomicBool::new(false),
        }
    }

    fn read_state(&self) -> RwLockReadGuard<'_, EngineState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, EngineState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn status(&self) -> EngineStatus {
        self.read_state().status
    }

    pub fn is_ready(&self) -> bool {
        self.status().can_predict()
    }

    pub fn current_metadata(&self) -> ModelMetadata {
        self.read_state().metadata.clone()
    }

    /// Whether `initialize` is running. The status only reports `Training`
    /// when there is no network to serve in the meantime.
    pub fn is_training(&self) -> bool {
        self.training.load(Ordering::SeqCst)
    }

    /// Initialization attempts made so far, across all `initialize` calls.
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    // ------------------------------------------------------------------------
    // Initialization
    // ------------------------------------------------------------------------

    /// Restore or train the full model, retrying up to `max_init_attempts`
    /// times. On exhaustion the engine is left `FallbackReady`.
    pub async fn initialize(&self) -> Result<(), ModelError> {
        self.training.store(true, Ordering::SeqCst);
        {
            let mut state = self.write_state();
            if state.network.is_none() {
                state.status = EngineStatus::Training;
            }
        }

        let result = self.initialize_with_retries().await;
        self.training.store(false, Ordering::SeqCst);
        result
    }

    async fn initialize_with_retries(&self) -> Result<(), ModelError> {
        let max_attempts = self.config.max_init_attempts.max(1);
        let strategy = FixedInterval::new(Duration::from_millis(self.config.retry_delay_ms))
            .take(max_attempts as usize - 1);

        match Retry::spawn(strategy, || self.initialize_once()).await {
            Ok(()) => {
                let metadata = self.current_metadata();
                tracing::info!(model_id = %metadata.id, "Model ready");
                Ok(())
            }
            Err(e) => {
                tracing::error!(
                    attempts = max_attempts,
                    error = %e,
                    "Model initialization failed, using fallback model"
                );
                self.settle_on_fallback();
                Err(ModelError::InitializationFailed {
                    attempts: max_attempts,
                })
            }
        }
    }

    fn settle_on_fallback(&self) {
        let has_network = self.read_state().network.is_some();
        let network = if has_network {
            None
        } else {
            fallback_network(self.config.seed)
        };

        let mut state = self.write_state();
        if let Some(net) = network {
            state.network = Some(net);
        }
        state.status = if state.network.is_some() {
            EngineStatus::FallbackReady
        } else {
            EngineStatus::Uninitialized
        };
    }

    async fn initialize_once(&self) -> Result<(), ModelError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::info!(attempt, "Initializing model");

        match self.repo.load_model(DEFAULT_MODEL_ID).await {
            Ok(Some(record)) => match self.deserialize(&record) {
                Ok(()) => {
                    tracing::info!("Restored saved default model");
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Discarding corrupt default model snapshot");
                    if let Err(e) = self.repo.delete_model(DEFAULT_MODEL_ID).await {
                        tracing::warn!(error = %e, "Failed to delete corrupt snapshot");
                    }
                }
            },
            Ok(None) => tracing::info!("No saved model found, training new model"),
            Err(e) => tracing::warn!(error = %e, "Failed to read saved model, training new model"),
        }

        let samples = dataset::assemble_training_set(&self.config).await;
        let network = self.train_full(samples).await?;
        let record = ModelRecord {
            metadata: ModelMetadata::default_model(now_millis()),
            model_data: network
                .to_json()
                .map_err(|e| ModelError::InvalidModelData(e.to_string()))?,
        };

        if let Err(e) = self.repo.save_model(&record).await {
            tracing::warn!(error = %e, "Failed to persist trained model");
        }

        let mut state = self.write_state();
        state.network = Some(network);
        state.metadata = record.metadata;
        state.status = EngineStatus::Ready;
        Ok(())
    }

    async fn train_full(&self, samples: Vec<TrainingSample>) -> Result<NeuralNetwork, ModelError> {
        let hidden_layers = self.config.hidden_layers.clone();
        let seed = self.config.seed;
        let opts = TrainingOptions {
            iterations: self.config.iterations,
            error_thresh: self.config.error_thresh,
            learning_rate: self.config.learning_rate,
            momentum: self.config.momentum,
            log_period: 100,
        };
        tracing::info!(samples = samples.len(), "Training model");

        let result = tokio::task::spawn_blocking(move || {
            let mut net = price_network(hidden_layers, seed)?;
            let stats = net.train(&samples, &opts)?;
            Ok::<_, ModelError>((net, stats))
        })
        .await
        .map_err(|e| ModelError::TaskFailed(format!("spawn_blocking join error: {e}")))?;

        let (net, stats) = result?;
        tracing::info!(
            iterations = stats.iterations,
            error = stats.error,
            "Model training complete"
        );
        Ok(net)
    }

    // ------------------------------------------------------------------------
    // Prediction
    // ------------------------------------------------------------------------

    pub fn predict(&self, input: &PropertyInput) -> Result<Estimate, ModelError> {
        let state = self.read_state();
        let network = state.network.as_ref().ok_or(ModelError::NotReady)?;

        let output = network
            .run(&encode_features(input))
            .map_err(|e| ModelError::PredictionExecution(e.to_string()))?;
        let value = output
            .first()
            .copied()
            .filter(|v| v.is_finite())
            .ok_or_else(|| ModelError::PredictionExecution("no finite output".to_string()))?;

        Ok(Estimate {
            price: denormalize_price(value),
            input: input.clone(),
            model_id: state.metadata.id.clone(),
            model_name: state.metadata.name.clone(),
        })
    }

    // ------------------------------------------------------------------------
    // Snapshots
    // ------------------------------------------------------------------------

    pub fn serialize(&self) -> Result<ModelRecord, ModelError> {
        let state = self.read_state();
        let network = state.network.as_ref().ok_or(ModelError::NotReady)?;
        Ok(ModelRecord {
            metadata: state.metadata.clone(),
            model_data: network
                .to_json()
                .map_err(|e| ModelError::InvalidModelData(e.to_string()))?,
        })
    }

    /// Replace the current network with a snapshot. The engine reports
    /// `Ready` afterwards.
    pub fn deserialize(&self, record: &ModelRecord) -> Result<(), ModelError> {
        let network = NeuralNetwork::from_json(&record.model_data)
            .map_err(|e| ModelError::InvalidModelData(e.to_string()))?;
        let config = network.config();
        if config.input_size != MODEL_FEATURES.len() || config.output_size != 1 {
            return Err(ModelError::InvalidModelData(format!(
                "expected {} inputs and 1 output, got {} and {}",
                MODEL_FEATURES.len(),
                config.input_size,
                config.output_size
            )));
        }

        let mut state = self.write_state();
        state.network = Some(network);
        state.metadata = record.metadata.clone();
        state.status = EngineStatus::Ready;
        Ok(())
    }

    /// Persist the current network under a fresh `model-<timestamp>` id and
    /// make that the current metadata. Returns the new id.
    pub async fn save_as(&self, name: &str) -> Result<String, ModelError> {
        if !self.is_ready() {
            return Err(ModelError::NotReady);
        }
        let mut record = self.serialize()?;
        record.metadata = record.metadata.named(name, now_millis());

        self.repo.save_model(&record).await?;
        let id = record.metadata.id.clone();
        self.write_state().metadata = record.metadata;
        tracing::info!(model_id = %id, name, "Saved model");
        Ok(id)
    }

    /// Load a saved model by id. `Ok(false)` when no such model exists.
    pub async fn load_saved(&self, id: &str) -> Result<bool, ModelError> {
        match self.repo.load_model(id).await? {
            Some(record) => {
                self.deserialize(&record)?;
                tracing::info!(model_id = %id, "Loaded saved model");
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
