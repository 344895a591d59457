//! Direct-fetch client for companion e-book sources.
//!
//! Unlike the indexer (one query, many listings), a direct-fetch source is
//! asked for a specific work and answers with at most one content handle.

mod http;
mod types;

pub use http::HttpFetcher;
pub use types::{ContentHandle, DirectFetcher, FetchError, MatchMethod};
