//! Download history.
//!
//! Persists the summary of each ranking winner and tracks the resulting
//! transfer. Full ranking breakdowns are transient; this is what survives.

mod sqlite;
mod store;

pub use sqlite::SqliteHistoryStore;
pub use store::{CreateHistoryRecord, HistoryError, HistoryRecord, HistoryStore};
