//! Acquisition requests and their state machine.

mod sqlite_store;
mod store;
mod types;

pub use sqlite_store::SqliteRequestStore;
pub use store::{CreateRequest, RequestError, RequestFilter, RequestStore};
pub use types::{AcquisitionRequest, RequestKind, RequestStatus};
