use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use valuer_core::{
    FeedbackStore, ModelEngine, ModelManager, PersistentStore, PredictionService, ValuerConfig,
    ValuerError,
};

/// Everything a request handler can reach. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<PersistentStore>,
    pub engine: Arc<ModelEngine>,
    pub service: Arc<PredictionService>,
    pub manager: Arc<ModelManager>,
    pub feedback: Arc<FeedbackStore>,
    pub config: ValuerConfig,
}

impl AppState {
    /// Wire up the services. The engine trains its seed network here, so
    /// the returned state can serve predictions immediately; the store is
    /// opened lazily on first use.
    pub fn build(config: ValuerConfig) -> Self {
        let store = Arc::new(PersistentStore::new(config.storage.clone()));
        let engine = Arc::new(ModelEngine::new(store.clone(), config.model.clone()));
        let service = Arc::new(
            PredictionService::new(engine.clone(), store.clone())
                .with_fallback_delay(Duration::from_millis(config.model.fallback_delay_ms)),
        );
        let manager = Arc::new(ModelManager::new(store.clone(), engine.clone()));
        let feedback = Arc::new(FeedbackStore::new(
            config.storage.feedback_path.as_ref().map(PathBuf::from),
        ));

        Self {
            store,
            engine,
            service,
            manager,
            feedback,
            config,
        }
    }

    /// Build and open the store eagerly, so a bad database path fails at
    /// startup instead of on the first request.
    pub async fn open(config: ValuerConfig) -> Result<Self, ValuerError> {
        let state = Self::build(config);
        state.store.open().await?;
        Ok(state)
    }
}
