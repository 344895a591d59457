use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{EventLevel, PipelineEvent};

/// Error type for event storage operations.
#[derive(Debug, Error)]
pub enum EventError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Failed to encode event: {0}")]
    Serialization(String),
}

/// A persisted event row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    /// Row id, assigned by the store.
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub level: EventLevel,
    pub event_type: String,
    /// The request this event concerns, when there is one.
    pub request_id: Option<String>,
    /// The full structured event.
    pub data: PipelineEvent,
}

/// Trait for event log storage backends.
///
/// Write failures are the caller's to swallow; the pipeline never reads
/// this log.
pub trait EventStore: Send + Sync {
    /// Append a record, returning its row id.
    fn insert(&self, record: &EventRecord) -> Result<i64, EventError>;

    /// Most recent records, newest first. Operator tooling only.
    fn recent(&self, limit: i64) -> Result<Vec<EventRecord>, EventError>;
}
