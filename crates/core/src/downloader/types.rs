//! Types for the download client integration.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Request to start a transfer on the download client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartDownloadRequest {
    /// Location to download from.
    pub url: String,
    /// Display name shown in the client.
    pub display_name: String,
    /// Client-side category tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Expected size, when known (lets the client pre-allocate).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_size_bytes: Option<u64>,
}

/// Handle to a transfer tracked by the download client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DownloadHandle {
    /// Client-assigned transfer id.
    pub client_id: String,
}

/// Coarse transfer state as reported by the client.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DownloadState {
    Queued,
    Active,
    Complete,
    Failed,
}

/// Transfer status snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadStatus {
    /// Client-assigned transfer id.
    pub client_id: String,
    /// Coarse state.
    pub state: DownloadState,
    /// Progress as a fraction (0.0-1.0).
    pub progress: f32,
    /// Bytes transferred so far.
    pub bytes_done: u64,
    /// Total bytes, when the client knows it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_bytes: Option<u64>,
    /// Where the client stored (or is storing) the files, in the client's
    /// own filesystem view.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub save_path: Option<String>,
    /// Failure detail when `state` is `Failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Errors from download client operations.
#[derive(Debug, Error)]
pub enum DownloadClientError {
    #[error("Download client connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Download client API error: {0}")]
    ApiError(String),

    #[error("Request timeout")]
    Timeout,

    #[error("Transfer not found: {0}")]
    NotFound(String),

    #[error("Location rejected by client: {0}")]
    Rejected(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Trait for download client backends.
#[async_trait]
pub trait DownloadClient: Send + Sync {
    /// Backend name for logging/events.
    fn name(&self) -> &str;

    /// Start a new transfer.
    async fn start(
        &self,
        request: StartDownloadRequest,
    ) -> Result<DownloadHandle, DownloadClientError>;

    /// Get the status of a transfer.
    async fn status(&self, client_id: &str) -> Result<DownloadStatus, DownloadClientError>;

    /// Remove a transfer, optionally deleting its files.
    async fn remove(&self, client_id: &str, delete_files: bool)
        -> Result<(), DownloadClientError>;
}
