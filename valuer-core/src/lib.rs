pub mod config;
pub mod dataset;
pub mod db;
pub mod engine;
pub mod error;
pub mod feedback;
pub mod ipc;
pub mod manager;
pub mod models;
pub mod network;
pub mod service;
pub mod store;
pub mod validate;

pub use config::ValuerConfig;
pub use engine::{EngineStatus, Estimate, ModelEngine};
pub use error::{ModelError, StorageError, ValidationErrors, ValuerError};
pub use feedback::{FeedbackDraft, FeedbackStore};
pub use manager::ModelManager;
pub use service::{PredictionOutcome, PredictionService};
pub use store::{ModelRepository, PersistentStore, PredictionLog};
pub use validate::{assess_prediction, Assessment, PropertyForm};
