//! Job queue trait and error type.

use std::time::Duration;

use thiserror::Error;

use super::{Job, JobPayload, JobStatus, JobType};

/// Error type for queue operations.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Job not found: {0}")]
    NotFound(String),

    #[error("Cannot {operation} job {job_id}: status is {status}")]
    InvalidState {
        job_id: String,
        status: String,
        operation: String,
    },

    #[error("Failed to encode job data: {0}")]
    Serialization(String),

    #[error("Database error: {0}")]
    Database(String),
}

/// Trait for durable job queue backends.
///
/// The queue is the single source of truth for job state across workers;
/// every transition is an atomic update on one row. `claim_next` is the only
/// way to hand a job to a worker: it is a compare-and-set, never a
/// read-then-write pair, so concurrent claimers cannot take the same job.
pub trait JobQueue: Send + Sync {
    /// Enqueue a job, runnable immediately.
    fn enqueue(&self, payload: JobPayload, max_attempts: u32) -> Result<Job, QueueError>;

    /// Enqueue a job that becomes runnable after `delay`.
    fn enqueue_after(
        &self,
        payload: JobPayload,
        max_attempts: u32,
        delay: Duration,
    ) -> Result<Job, QueueError>;

    /// Atomically claim one queued, runnable job (optionally of a given
    /// type), transitioning it to running. Returns `None` when nothing is
    /// runnable.
    fn claim_next(&self, job_type: Option<JobType>) -> Result<Option<Job>, QueueError>;

    /// Mark a running job completed, storing its structured result.
    fn complete(&self, id: &str, result: serde_json::Value) -> Result<Job, QueueError>;

    /// Record a failed run. Below `max_attempts` the job is re-queued with
    /// backoff; at the cap it becomes permanently failed and is never
    /// re-queued automatically.
    fn fail(&self, id: &str, error: &str) -> Result<Job, QueueError>;

    /// Read-only lookup for status polling.
    fn get(&self, id: &str) -> Result<Option<Job>, QueueError>;

    /// Count jobs in the given status.
    fn count_by_status(&self, status: JobStatus) -> Result<i64, QueueError>;
}
