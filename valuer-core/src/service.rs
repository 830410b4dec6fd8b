//! Prediction service
//!
//! `predict` never fails: when the engine cannot produce a price the
//! formula estimate is used instead and the record is flagged as a
//! fallback. Every attempt is recorded; a failed write only costs the
//! record its id.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::engine::{formula_price, ModelEngine};
use crate::error::ValidationErrors;
use crate::models::{NewPrediction, PredictionRecord, PropertyInput};
use crate::store::PredictionLog;
use crate::validate::{assess_prediction, Assessment, PropertyForm};

pub const FALLBACK_MODEL_NAME: &str = "Formula Estimate";

/// A recorded prediction plus its plausibility check.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionOutcome {
    pub record: PredictionRecord,
    pub assessment: Assessment,
}

pub struct PredictionService {
    engine: Arc<ModelEngine>,
    log: Arc<dyn PredictionLog>,
    fallback_delay: Duration,
}

impl PredictionService {
    pub fn new(engine: Arc<ModelEngine>, log: Arc<dyn PredictionLog>) -> Self {
        Self {
            engine,
            log,
            fallback_delay: Duration::ZERO,
        }
    }

    /// Pause before returning formula results.
    pub fn with_fallback_delay(mut self, delay: Duration) -> Self {
        self.fallback_delay = delay;
        self
    }

    pub fn engine(&self) -> &Arc<ModelEngine> {
        &self.engine
    }

    pub async fn predict(&self, input: PropertyInput) -> PredictionRecord {
        let new = match self.engine.predict(&input) {
            Ok(estimate) => NewPrediction {
                input,
                price: estimate.price,
                model_id: estimate.model_id,
                model_name: estimate.model_name,
                is_fallback: false,
                error: None,
            },
            Err(e) => {
                tracing::warn!(error = %e, "Model prediction failed, using formula estimate");
                if !self.fallback_delay.is_zero() {
                    tokio::time::sleep(self.fallback_delay).await;
                }
                let metadata = self.engine.current_metadata();
                NewPrediction {
                    price: formula_price(&input),
                    input,
                    model_id: metadata.id,
                    model_name: FALLBACK_MODEL_NAME.to_string(),
                    is_fallback: true,
                    error: Some(e.to_string()),
                }
            }
        };

        match self.log.save_prediction(&new).await {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to record prediction");
                PredictionRecord::from_new(new, None, chrono::Utc::now().timestamp_millis())
            }
        }
    }

    /// Validate raw form values, then predict and assess the result.
    pub async fn predict_form(
        &self,
        form: &PropertyForm,
    ) -> Result<PredictionOutcome, ValidationErrors> {
        let input = form.validate()?;
        let record = self.predict(input).await;
        let assessment = assess_prediction(record.price, &record.input);
        if !assessment.is_valid {
            tracing::info!(price = record.price, message = %assessment.message, "Prediction flagged");
        }
        Ok(PredictionOutcome { record, assessment })
    }
}
