use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::ValuerError;

#[derive(Debug, Deserialize, Clone)]
pub struct ValuerConfig {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    pub socket_path: String,
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// SQLite database file; created on first open.
    pub database_path: String,
    pub max_connections: u32,
    /// Flat JSON mirror for user feedback. `None` keeps feedback in memory only.
    pub feedback_path: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    pub hidden_layers: Vec<usize>,
    pub iterations: usize,
    pub error_thresh: f64,
    pub learning_rate: f64,
    pub momentum: f64,
    pub max_init_attempts: u32,
    pub retry_delay_ms: u64,
    /// Optional JSON dataset merged with the seed examples for full training.
    pub dataset_path: Option<String>,
    pub seed: u64,
    /// Cosmetic pause before a formula-based estimate is returned.
    pub fallback_delay_ms: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            hidden_layers: vec![8, 8],
            iterations: 1000,
            error_thresh: 0.01,
            learning_rate: 0.1,
            momentum: 0.1,
            max_init_attempts: 3,
            retry_delay_ms: 250,
            dataset_path: None,
            seed: 42,
            fallback_delay_ms: 0,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "127.0.0.1".to_string(),
            port: 8787,
        }
    }
}

impl ValuerConfig {
    pub fn load(path: &str) -> Result<Self, ValuerError> {
        let s = Config::builder()
            .add_source(File::with_name(path))
            .add_source(Environment::with_prefix("VALUER").separator("__"))
            .build()?;
        Ok(s.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_applies_section_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[service]
socket_path = "/tmp/valuer.sock"
log_level = "info"

[storage]
database_path = "valuer.db"
max_connections = 2
"#
        )
        .unwrap();

        let config = ValuerConfig::load(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.storage.max_connections, 2);
        assert!(config.storage.feedback_path.is_none());
        assert_eq!(config.model.hidden_layers, vec![8, 8]);
        assert_eq!(config.model.max_init_attempts, 3);
        assert!(config.http.enabled);
        assert_eq!(config.http.port, 8787);
    }

    #[test]
    fn test_load_missing_file_is_error() {
        assert!(matches!(
            ValuerConfig::load("/nonexistent/valuer-config"),
            Err(ValuerError::Config(_))
        ));
    }
}
