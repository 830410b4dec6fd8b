use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

/// Failures surfaced to the binaries: config loading, opening the store,
/// and the IPC transport.
#[derive(Error, Debug)]
pub enum ValuerError {
    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("IPC error: {0}")]
    Ipc(String),
}

/// Failures of the embedded store. "Not found" is never one of these.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("storage read failed: {0}")]
    Read(String),

    #[error("storage write failed: {0}")]
    Write(String),
}

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Model not initialized")]
    NotReady,

    #[error("Failed to execute prediction model: {0}")]
    PredictionExecution(String),

    #[error("Invalid serialized model data: {0}")]
    InvalidModelData(String),

    #[error("Failed to train model: {0}")]
    Training(#[from] crate::network::NetworkError),

    #[error("Training task failed: {0}")]
    TaskFailed(String),

    #[error("Model storage failed: {0}")]
    Storage(#[from] StorageError),

    #[error("Model initialization failed after {attempts} attempts")]
    InitializationFailed { attempts: u32 },
}

/// Field-level validation failures, keyed by form field name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    pub fields: BTreeMap<String, String>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.fields.insert(field.to_string(), message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .fields
            .iter()
            .map(|(field, msg)| format!("{field}: {msg}"))
            .collect();
        write!(f, "{}", parts.join("; "))
    }
}

impl std::error::Error for ValidationErrors {}
