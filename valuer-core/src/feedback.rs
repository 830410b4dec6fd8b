//! User feedback on predictions
//!
//! Feedback always lands in the in-process cache. When a blob path is
//! configured the whole list is also mirrored to a flat JSON file; mirror
//! failures are logged and otherwise ignored, so saving feedback never
//! fails. On read the blob, when present and parseable, wins over the cache.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use crate::error::ValidationErrors;
use crate::models::{FeedbackInput, FeedbackRecord, FeedbackStats, NewFeedback};

pub const MIN_RATING: u8 = 1;
pub const MAX_RATING: u8 = 5;
pub const AUTO_SUBMIT_COMMENT: &str = "Excellent prediction!";

#[derive(Debug, Default)]
struct FeedbackCache {
    records: Vec<FeedbackRecord>,
    next_id: u64,
}

impl FeedbackCache {
    fn resync(&mut self, records: Vec<FeedbackRecord>) {
        self.next_id = records.iter().map(|r| r.id).max().unwrap_or(0) + 1;
        self.records = records;
    }
}

pub struct FeedbackStore {
    blob_path: Option<PathBuf>,
    cache: Mutex<FeedbackCache>,
}

impl FeedbackStore {
    pub fn new(blob_path: Option<PathBuf>) -> Self {
        Self {
            blob_path,
            cache: Mutex::new(FeedbackCache {
                records: Vec::new(),
                next_id: 1,
            }),
        }
    }

    /// Memory-only store, no durable mirror.
    pub fn in_memory() -> Self {
        Self::new(None)
    }

    /// Assign an id and timestamp, append, and mirror to the blob. The blob
    /// is read first so ids keep counting from what earlier runs stored.
    pub async fn save_feedback(&self, new: NewFeedback) -> FeedbackRecord {
        let mut cache = self.cache.lock().await;

        let mirror = match &self.blob_path {
            Some(path) => match read_blob(path).await {
                Ok(Some(records)) => {
                    cache.resync(records);
                    Some(path)
                }
                Ok(None) => Some(path),
                Err(e) => {
                    tracing::warn!(error = %e, path = %path.display(), "Could not read feedback blob, not mirroring");
                    None
                }
            },
            None => None,
        };

        let record = FeedbackRecord {
            id: cache.next_id,
            prediction: new.prediction,
            input_data: new.input_data,
            rating: new.rating,
            feedback: new.feedback,
            timestamp: new
                .timestamp
                .unwrap_or_else(|| chrono::Utc::now().to_rfc3339()),
        };
        cache.next_id += 1;
        cache.records.push(record.clone());

        if let Some(path) = mirror {
            if let Err(e) = write_blob(path, &cache.records).await {
                tracing::warn!(error = %e, path = %path.display(), "Could not mirror feedback to blob");
            }
        }

        tracing::info!(id = record.id, rating = record.rating, "Feedback saved");
        record
    }

    pub async fn get_all_feedback(&self) -> Vec<FeedbackRecord> {
        let mut cache = self.cache.lock().await;

        if let Some(path) = &self.blob_path {
            match read_blob(path).await {
                Ok(Some(records)) => {
                    cache.resync(records.clone());
                    return records;
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(error = %e, path = %path.display(), "Could not read feedback blob");
                }
            }
        }

        cache.records.clone()
    }

    pub async fn get_feedback_stats(&self) -> FeedbackStats {
        summarize(&self.get_all_feedback().await)
    }
}

/// Count, mean rating and a 1..=5 histogram. Out-of-range ratings count
/// toward the total and mean only.
pub fn summarize(records: &[FeedbackRecord]) -> FeedbackStats {
    let mut rating_counts: BTreeMap<u8, usize> =
        (MIN_RATING..=MAX_RATING).map(|r| (r, 0)).collect();
    for record in records {
        if let Some(count) = rating_counts.get_mut(&record.rating) {
            *count += 1;
        }
    }

    let average_rating = if records.is_empty() {
        0.0
    } else {
        records.iter().map(|r| f64::from(r.rating)).sum::<f64>() / records.len() as f64
    };

    FeedbackStats {
        total_feedback: records.len(),
        average_rating,
        rating_counts,
    }
}

#[derive(Debug, thiserror::Error)]
enum BlobError {
    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Json(#[from] serde_json::Error),
}

/// `Ok(None)` when the blob does not exist yet.
async fn read_blob(path: &Path) -> Result<Option<Vec<FeedbackRecord>>, BlobError> {
    match tokio::fs::read_to_string(path).await {
        Ok(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn write_blob(path: &Path, records: &[FeedbackRecord]) -> Result<(), BlobError> {
    tokio::fs::write(path, serde_json::to_vec(records)?).await?;
    Ok(())
}

// ============================================================================
// Draft validation
// ============================================================================

/// Feedback as the rating dialog collects it, before submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackDraft {
    pub prediction: f64,
    #[serde(default)]
    pub input_data: FeedbackInput,
    pub rating: u8,
    #[serde(default)]
    pub comment: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubmittedFeedback {
    pub feedback: NewFeedback,
    /// Top rating: the dialog closes itself without asking for a comment.
    pub auto_close: bool,
}

impl FeedbackDraft {
    pub fn submit(self) -> Result<SubmittedFeedback, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if !(MIN_RATING..=MAX_RATING).contains(&self.rating) {
            errors.add("rating", "Rating must be between 1 and 5");
            return Err(errors);
        }

        let comment = self.comment.trim();
        if self.rating < 3 && comment.is_empty() {
            errors.add(
                "feedback",
                "Please tell us why the prediction seems off to you",
            );
            return Err(errors);
        }

        let auto_close = self.rating == MAX_RATING;
        let feedback = if auto_close && comment.is_empty() {
            AUTO_SUBMIT_COMMENT.to_string()
        } else {
            comment.to_string()
        };

        Ok(SubmittedFeedback {
            feedback: NewFeedback {
                prediction: self.prediction,
                input_data: self.input_data,
                rating: self.rating,
                feedback,
                timestamp: None,
            },
            auto_close,
        })
    }
}
