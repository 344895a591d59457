//! Mock download client for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::downloader::{
    DownloadClient, DownloadClientError, DownloadHandle, DownloadState, DownloadStatus,
    StartDownloadRequest,
};

/// Mock implementation of the [`DownloadClient`] trait.
///
/// Transfers get deterministic ids (`dl-1`, `dl-2`, ...). URLs can be
/// scripted to be rejected, and per-transfer status is settable so tests can
/// walk a download through its states.
pub struct MockDownloadClient {
    counter: AtomicUsize,
    started: Arc<RwLock<Vec<StartDownloadRequest>>>,
    rejected_urls: Arc<RwLock<Vec<String>>>,
    statuses: Arc<RwLock<HashMap<String, DownloadStatus>>>,
    removed: Arc<RwLock<Vec<String>>>,
}

impl Default for MockDownloadClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDownloadClient {
    pub fn new() -> Self {
        Self {
            counter: AtomicUsize::new(0),
            started: Arc::new(RwLock::new(Vec::new())),
            rejected_urls: Arc::new(RwLock::new(Vec::new())),
            statuses: Arc::new(RwLock::new(HashMap::new())),
            removed: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Script a URL the client will reject.
    pub async fn reject_url(&self, url: impl Into<String>) {
        self.rejected_urls.write().await.push(url.into());
    }

    /// Set the status snapshot returned for a transfer.
    pub async fn set_status(&self, client_id: &str, status: DownloadStatus) {
        self.statuses
            .write()
            .await
            .insert(client_id.to_string(), status);
    }

    /// Convenience: mark a transfer complete at the given path.
    pub async fn complete_transfer(&self, client_id: &str, save_path: &str, bytes: u64) {
        self.set_status(
            client_id,
            DownloadStatus {
                client_id: client_id.to_string(),
                state: DownloadState::Complete,
                progress: 1.0,
                bytes_done: bytes,
                total_bytes: Some(bytes),
                save_path: Some(save_path.to_string()),
                message: None,
            },
        )
        .await;
    }

    /// Start requests recorded so far.
    pub async fn recorded_starts(&self) -> Vec<StartDownloadRequest> {
        self.started.read().await.clone()
    }

    /// Transfers removed so far.
    pub async fn recorded_removals(&self) -> Vec<String> {
        self.removed.read().await.clone()
    }
}

#[async_trait]
impl DownloadClient for MockDownloadClient {
    fn name(&self) -> &str {
        "mock"
    }

    async fn start(
        &self,
        request: StartDownloadRequest,
    ) -> Result<DownloadHandle, DownloadClientError> {
        self.started.write().await.push(request.clone());

        if self.rejected_urls.read().await.contains(&request.url) {
            return Err(DownloadClientError::Rejected(format!(
                "scripted rejection of {}",
                request.url
            )));
        }

        let id = format!("dl-{}", self.counter.fetch_add(1, Ordering::SeqCst) + 1);
        self.statuses.write().await.insert(
            id.clone(),
            DownloadStatus {
                client_id: id.clone(),
                state: DownloadState::Active,
                progress: 0.0,
                bytes_done: 0,
                total_bytes: request.expected_size_bytes,
                save_path: None,
                message: None,
            },
        );

        Ok(DownloadHandle { client_id: id })
    }

    async fn status(&self, client_id: &str) -> Result<DownloadStatus, DownloadClientError> {
        self.statuses
            .read()
            .await
            .get(client_id)
            .cloned()
            .ok_or_else(|| DownloadClientError::NotFound(client_id.to_string()))
    }

    async fn remove(
        &self,
        client_id: &str,
        _delete_files: bool,
    ) -> Result<(), DownloadClientError> {
        self.removed.write().await.push(client_id.to_string());
        self.statuses.write().await.remove(client_id);
        Ok(())
    }
}
