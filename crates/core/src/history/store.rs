//! History storage trait and types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for history operations.
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("History record not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(String),
}

/// Persisted summary of one selected candidate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryRecord {
    /// Unique identifier (UUID).
    pub id: String,
    /// The request this selection belongs to.
    pub request_id: String,
    /// Source the candidate came from.
    pub source: String,
    /// Candidate name as listed by the source.
    pub candidate_title: String,
    /// Size in bytes as reported at selection time.
    pub size_bytes: u64,
    /// Final ranking score of the winning candidate.
    pub quality_score: f32,
    /// Whether this candidate was the pass winner.
    pub selected: bool,
    /// Download client transfer id, once the download started.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// Last known download status string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_status: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Fields needed to record a selection.
#[derive(Debug, Clone)]
pub struct CreateHistoryRecord {
    pub request_id: String,
    pub source: String,
    pub candidate_title: String,
    pub size_bytes: u64,
    pub quality_score: f32,
    pub selected: bool,
}

/// Trait for history storage backends.
pub trait HistoryStore: Send + Sync {
    /// Record a selection.
    fn create(&self, record: CreateHistoryRecord) -> Result<HistoryRecord, HistoryError>;

    /// Get a record by ID.
    fn get(&self, id: &str) -> Result<Option<HistoryRecord>, HistoryError>;

    /// List records for a request, newest first.
    fn list_for_request(&self, request_id: &str) -> Result<Vec<HistoryRecord>, HistoryError>;

    /// Attach the download client transfer id.
    fn set_client_id(&self, id: &str, client_id: &str) -> Result<(), HistoryError>;

    /// Update the last known download status.
    fn set_download_status(&self, id: &str, status: &str) -> Result<(), HistoryError>;
}
