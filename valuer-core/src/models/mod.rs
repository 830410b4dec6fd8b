pub mod feedback;
pub mod model_record;
pub mod prediction;
pub mod property;

pub use feedback::{FeedbackInput, FeedbackRecord, FeedbackStats, NewFeedback};
pub use model_record::{ModelMetadata, ModelRecord, DEFAULT_MODEL_ID, MODEL_FEATURES};
pub use prediction::{NewPrediction, PredictionRecord};
pub use property::{Location, PropertyInput};
