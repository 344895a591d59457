//! Acquisition pipeline orchestration.
//!
//! One processor per job type drives requests through the state machine;
//! a worker pool claims jobs from the queue and routes failures into the
//! retry ladder. A sweeper re-schedules searches for requests parked in
//! awaiting-search.

mod processors;
mod types;
mod worker;

pub use processors::Processors;
pub use types::{PipelineRuntime, ProcessorError, SearchOutcome};
pub use worker::{WorkerPool, WorkerPoolStatus};
