//! External search indexer client.
//!
//! The pipeline talks to an aggregator (Jackett-style) that fans a query out
//! to the configured sources and returns unified results.

mod torznab;
mod types;

pub use torznab::TorznabIndexer;
pub use types::{
    CandidateResult, IndexerError, SearchCategory, SearchIndexer, SearchQuery, SearchReport,
    SourceStatus,
};
