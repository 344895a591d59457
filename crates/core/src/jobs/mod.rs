//! Durable job queue.
//!
//! Jobs are the unit of asynchronous work in the pipeline: typed payloads,
//! bounded retries, and an atomic claim so two workers never run the same
//! job. Jobs are kept forever for audit.

mod queue;
mod sqlite_queue;
mod types;

pub use queue::{JobQueue, QueueError};
pub use sqlite_queue::SqliteJobQueue;
pub use types::{Job, JobPayload, JobStatus, JobType, SearchTarget};
