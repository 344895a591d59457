//! Types for direct-fetch e-book sources.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A content handle returned by a direct-fetch source.
///
/// The handle identifies one downloadable edition of a work; download
/// locations are resolved separately so the fallback chain stays explicit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContentHandle {
    /// Source-scoped identifier.
    pub id: String,
    /// Edition title as reported by the source.
    pub title: String,
    /// File format of this edition (e.g., "epub").
    pub format: String,
    /// Size in bytes, when the source reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    /// Source this handle belongs to.
    pub source: String,
}

/// How a handle was matched to the target work.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MatchMethod {
    /// Matched by the work's external catalog id.
    ExternalId,
    /// Matched by title/author search.
    TitleAuthor,
}

impl std::fmt::Display for MatchMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchMethod::ExternalId => write!(f, "external_id"),
            MatchMethod::TitleAuthor => write!(f, "title_author"),
        }
    }
}

/// Errors from direct-fetch operations.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Fetch source connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Fetch source API error: {0}")]
    ApiError(String),

    #[error("Request timeout")]
    Timeout,

    #[error("Response exceeded size cap ({0} bytes)")]
    ResponseTooLarge(u64),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Trait for direct-fetch e-book sources.
///
/// Lookups return `Ok(None)` when the source has no matching edition; only
/// transport and protocol problems are errors.
#[async_trait]
pub trait DirectFetcher: Send + Sync {
    /// Source name for logging/events.
    fn name(&self) -> &str;

    /// Look up a work by its external catalog id.
    async fn search_by_external_id(
        &self,
        external_id: &str,
        format: &str,
    ) -> Result<Option<ContentHandle>, FetchError>;

    /// Look up a work by title and author.
    async fn search_by_title_author(
        &self,
        title: &str,
        author: &str,
        format: &str,
    ) -> Result<Option<ContentHandle>, FetchError>;

    /// Resolve the ordered download locations for a handle.
    async fn download_locations(&self, handle: &ContentHandle) -> Result<Vec<String>, FetchError>;
}
