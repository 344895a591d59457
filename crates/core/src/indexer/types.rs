//! Types for the search indexer system.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Query parameters for a candidate search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchQuery {
    /// Free-text search query.
    pub query: String,
    /// Optional: limit to a content category.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<SearchCategory>,
    /// Minimum availability (seeders) a result must report.
    #[serde(default)]
    pub min_availability: u32,
    /// Maximum results to return across all sources.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_results: Option<u32>,
    /// Optional: limit to specific sources.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<String>>,
}

impl SearchQuery {
    /// Create a query with defaults for the given text.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            category: None,
            min_availability: 0,
            max_results: None,
            sources: None,
        }
    }
}

/// Content category for filtering search results.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SearchCategory {
    Audiobooks,
    Ebooks,
    Other,
}

/// A single search hit from one source.
///
/// Candidates are transient: they live for one ranking pass and only the
/// winner's summary is persisted to download history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateResult {
    /// Listing title as reported by the source.
    pub title: String,
    /// Size in bytes.
    pub size_bytes: u64,
    /// Availability count (seeders or equivalent).
    pub seeders: u32,
    /// Which source returned this result.
    pub source: String,
    /// Known download locations, in preference order.
    pub download_urls: Vec<String>,
    /// Container/codec hint when the source reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format_hint: Option<String>,
    /// When the listing was published.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publish_date: Option<DateTime<Utc>>,
}

/// Search result with per-source error detail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchReport {
    /// The query that was executed.
    pub query: SearchQuery,
    /// Results across all sources, in source order.
    pub candidates: Vec<CandidateResult>,
    /// How long the search took in milliseconds.
    pub duration_ms: u64,
    /// Any sources that failed (name -> error message).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub source_errors: HashMap<String, String>,
}

/// Status of a single source behind the aggregator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceStatus {
    /// Source name/ID.
    pub name: String,
    /// Whether this source is configured/enabled.
    pub enabled: bool,
}

/// Errors that can occur during search operations.
#[derive(Debug, Error)]
pub enum IndexerError {
    #[error("Indexer connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Indexer API error: {0}")]
    ApiError(String),

    #[error("Request timeout")]
    Timeout,

    #[error("Response exceeded size cap ({0} bytes)")]
    ResponseTooLarge(u64),

    #[error("All sources failed")]
    AllSourcesFailed(HashMap<String, String>),

    #[error("No sources enabled")]
    NoSourcesEnabled,

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Trait for search indexer backends.
#[async_trait]
pub trait SearchIndexer: Send + Sync {
    /// Backend name for logging/events.
    fn name(&self) -> &str;

    /// Execute a search across configured sources.
    async fn search(&self, query: &SearchQuery) -> Result<SearchReport, IndexerError>;

    /// Get status of all configured sources.
    async fn source_status(&self) -> Vec<SourceStatus>;
}
