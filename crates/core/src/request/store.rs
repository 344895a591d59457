//! Request storage trait and types.

use std::fmt;

use chrono::{DateTime, Utc};

use super::{AcquisitionRequest, RequestKind, RequestStatus};

/// Error type for request operations.
#[derive(Debug)]
pub enum RequestError {
    /// Request not found.
    NotFound(String),
    /// Request was soft-deleted and cannot be mutated.
    Deleted(String),
    /// The requested status change is not in the transition graph.
    InvalidTransition {
        request_id: String,
        from: RequestStatus,
        to: RequestStatus,
    },
    /// A sidecar request's parent is missing or not completed.
    InvalidParent(String),
    /// Database error.
    Database(String),
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestError::NotFound(id) => write!(f, "Request not found: {}", id),
            RequestError::Deleted(id) => write!(f, "Request was deleted: {}", id),
            RequestError::InvalidTransition {
                request_id,
                from,
                to,
            } => write!(
                f,
                "Cannot move request {} from {} to {}",
                request_id, from, to
            ),
            RequestError::InvalidParent(msg) => write!(f, "Invalid parent request: {}", msg),
            RequestError::Database(msg) => write!(f, "Database error: {}", msg),
        }
    }
}

impl std::error::Error for RequestError {}

/// Request to create a new acquisition request.
#[derive(Debug, Clone)]
pub struct CreateRequest {
    pub kind: RequestKind,
    pub parent_request_id: Option<String>,
    pub sidecar_source: Option<String>,
    pub title: String,
    pub author: Option<String>,
    pub external_id: Option<String>,
    pub preferred_format: Option<String>,
    pub duration_minutes: Option<u32>,
}

impl CreateRequest {
    /// A primary request for the given work.
    pub fn primary(title: impl Into<String>) -> Self {
        Self {
            kind: RequestKind::Primary,
            parent_request_id: None,
            sidecar_source: None,
            title: title.into(),
            author: None,
            external_id: None,
            preferred_format: None,
            duration_minutes: None,
        }
    }

    /// A sidecar request spawned from a completed parent.
    pub fn sidecar(
        parent_request_id: impl Into<String>,
        source: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        Self {
            kind: RequestKind::Sidecar,
            parent_request_id: Some(parent_request_id.into()),
            sidecar_source: Some(source.into()),
            title: title.into(),
            author: None,
            external_id: None,
            preferred_format: None,
            duration_minutes: None,
        }
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn with_external_id(mut self, external_id: impl Into<String>) -> Self {
        self.external_id = Some(external_id.into());
        self
    }

    pub fn with_preferred_format(mut self, format: impl Into<String>) -> Self {
        self.preferred_format = Some(format.into());
        self
    }

    pub fn with_duration_minutes(mut self, minutes: u32) -> Self {
        self.duration_minutes = Some(minutes);
        self
    }
}

/// Filter for querying requests.
#[derive(Debug, Clone)]
pub struct RequestFilter {
    /// Filter by status.
    pub status: Option<RequestStatus>,
    /// Filter by kind.
    pub kind: Option<RequestKind>,
    /// Only requests whose last search started before this time (or that
    /// never searched). Used by the re-search sweeper.
    pub last_search_before: Option<DateTime<Utc>>,
    /// Include soft-deleted requests.
    pub include_deleted: bool,
    /// Maximum number of results.
    pub limit: i64,
    /// Offset for pagination.
    pub offset: i64,
}

impl Default for RequestFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestFilter {
    pub fn new() -> Self {
        Self {
            status: None,
            kind: None,
            last_search_before: None,
            include_deleted: false,
            limit: 100,
            offset: 0,
        }
    }

    pub fn with_status(mut self, status: RequestStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_kind(mut self, kind: RequestKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn with_last_search_before(mut self, cutoff: DateTime<Utc>) -> Self {
        self.last_search_before = Some(cutoff);
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }
}

/// Trait for request storage backends.
///
/// Every mutation is an atomic update scoped to one row; the store is the
/// single source of truth across workers.
pub trait RequestStore: Send + Sync {
    /// Create a new request. A sidecar's parent must exist and be completed.
    fn create(&self, request: CreateRequest) -> Result<AcquisitionRequest, RequestError>;

    /// Get a request by ID (including soft-deleted ones).
    fn get(&self, id: &str) -> Result<Option<AcquisitionRequest>, RequestError>;

    /// List requests matching the filter.
    fn list(&self, filter: &RequestFilter) -> Result<Vec<AcquisitionRequest>, RequestError>;

    /// Count requests matching the filter.
    fn count(&self, filter: &RequestFilter) -> Result<i64, RequestError>;

    /// Move a request to a new status, validating the transition graph.
    /// Entering `searching` increments `search_attempts` and stamps
    /// `last_search_at`. The error message replaces any previous one.
    fn update_status(
        &self,
        id: &str,
        status: RequestStatus,
        error_message: Option<String>,
    ) -> Result<AcquisitionRequest, RequestError>;

    /// Update download progress (0-100).
    fn set_progress(&self, id: &str, progress: f32) -> Result<(), RequestError>;

    /// Find the sidecar request spawned from `parent_id` against `source`.
    fn find_sidecar(
        &self,
        parent_id: &str,
        source: &str,
    ) -> Result<Option<AcquisitionRequest>, RequestError>;

    /// Reset a failed request (or an awaiting-search sidecar) back to
    /// pending with zero progress and a cleared error.
    fn reset_for_retry(&self, id: &str) -> Result<AcquisitionRequest, RequestError>;

    /// Soft-delete a request. Jobs for it will exit early.
    fn soft_delete(&self, id: &str) -> Result<AcquisitionRequest, RequestError>;
}
