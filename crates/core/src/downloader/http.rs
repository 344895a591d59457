//! HTTP download client backend.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::config::DownloadClientConfig;

use super::{
    DownloadClient, DownloadClientError, DownloadHandle, DownloadState, DownloadStatus,
    StartDownloadRequest,
};

/// Download client speaking a JSON-over-HTTP daemon API.
pub struct HttpDownloadClient {
    client: Client,
    config: DownloadClientConfig,
}

impl HttpDownloadClient {
    /// Create a new download client with the given configuration.
    pub fn new(config: DownloadClientConfig) -> Result<Self, DownloadClientError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs as u64))
            .build()
            .map_err(|e| {
                DownloadClientError::Internal(format!("failed to build HTTP client: {}", e))
            })?;

        Ok(Self { client, config })
    }

    fn base_url(&self) -> &str {
        self.config.url.trim_end_matches('/')
    }

    fn map_transport_error(e: reqwest::Error) -> DownloadClientError {
        if e.is_timeout() {
            DownloadClientError::Timeout
        } else if e.is_connect() {
            DownloadClientError::ConnectionFailed(e.to_string())
        } else {
            DownloadClientError::ApiError(e.to_string())
        }
    }
}

#[async_trait]
impl DownloadClient for HttpDownloadClient {
    fn name(&self) -> &str {
        "http"
    }

    async fn start(
        &self,
        request: StartDownloadRequest,
    ) -> Result<DownloadHandle, DownloadClientError> {
        let url = format!("{}/api/v1/downloads", self.base_url());
        debug!(name = %request.display_name, "Starting download");

        let body = AddDownloadBody {
            url: request.url,
            name: request.display_name,
            category: request
                .category
                .unwrap_or_else(|| self.config.category.clone()),
            expected_size_bytes: request.expected_size_bytes,
        };

        let response = self
            .client
            .post(&url)
            .header("X-Api-Key", &self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(Self::map_transport_error)?;

        let status = response.status();
        if status == reqwest::StatusCode::UNPROCESSABLE_ENTITY
            || status == reqwest::StatusCode::BAD_REQUEST
        {
            let detail = response.text().await.unwrap_or_default();
            return Err(DownloadClientError::Rejected(
                detail.chars().take(200).collect(),
            ));
        }
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(DownloadClientError::ApiError(format!(
                "HTTP {}: {}",
                status,
                detail.chars().take(200).collect::<String>()
            )));
        }

        let added: AddDownloadResponse = response
            .json()
            .await
            .map_err(|e| DownloadClientError::ApiError(format!("Failed to parse response: {}", e)))?;

        Ok(DownloadHandle {
            client_id: added.id,
        })
    }

    async fn status(&self, client_id: &str) -> Result<DownloadStatus, DownloadClientError> {
        let url = format!(
            "{}/api/v1/downloads/{}",
            self.base_url(),
            urlencoding::encode(client_id)
        );

        let response = self
            .client
            .get(&url)
            .header("X-Api-Key", &self.config.api_key)
            .send()
            .await
            .map_err(Self::map_transport_error)?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(DownloadClientError::NotFound(client_id.to_string()));
        }
        if !response.status().is_success() {
            return Err(DownloadClientError::ApiError(format!(
                "HTTP {}",
                response.status()
            )));
        }

        let status: StatusResponse = response
            .json()
            .await
            .map_err(|e| DownloadClientError::ApiError(format!("Failed to parse response: {}", e)))?;

        Ok(DownloadStatus {
            client_id: client_id.to_string(),
            state: status.state,
            progress: status.progress,
            bytes_done: status.bytes_done,
            total_bytes: status.total_bytes,
            save_path: status.save_path,
            message: status.message,
        })
    }

    async fn remove(
        &self,
        client_id: &str,
        delete_files: bool,
    ) -> Result<(), DownloadClientError> {
        let url = format!(
            "{}/api/v1/downloads/{}?delete_files={}",
            self.base_url(),
            urlencoding::encode(client_id),
            delete_files
        );

        let response = self
            .client
            .delete(&url)
            .header("X-Api-Key", &self.config.api_key)
            .send()
            .await
            .map_err(Self::map_transport_error)?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(DownloadClientError::NotFound(client_id.to_string()));
        }
        if !response.status().is_success() {
            return Err(DownloadClientError::ApiError(format!(
                "HTTP {}",
                response.status()
            )));
        }

        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct AddDownloadBody {
    url: String,
    name: String,
    category: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    expected_size_bytes: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct AddDownloadResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    state: DownloadState,
    #[serde(default)]
    progress: f32,
    #[serde(default)]
    bytes_done: u64,
    #[serde(default)]
    total_bytes: Option<u64>,
    #[serde(default)]
    save_path: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> DownloadClientConfig {
        DownloadClientConfig {
            url: "http://localhost:8080/".to_string(),
            api_key: "k".to_string(),
            timeout_secs: 30,
            category: "shelfhound".to_string(),
        }
    }

    #[test]
    fn test_base_url_trims_trailing_slash() {
        let client = HttpDownloadClient::new(test_config()).unwrap();
        assert_eq!(client.base_url(), "http://localhost:8080");
    }

    #[test]
    fn test_parse_status_response() {
        let json = r#"{
            "state": "active",
            "progress": 0.42,
            "bytes_done": 42000000,
            "total_bytes": 100000000,
            "save_path": "/downloads/the-wild-robot"
        }"#;
        let parsed: StatusResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.state, DownloadState::Active);
        assert!((parsed.progress - 0.42).abs() < f32::EPSILON);
        assert_eq!(parsed.total_bytes, Some(100_000_000));
        assert!(parsed.message.is_none());
    }

    #[test]
    fn test_parse_minimal_status_response() {
        let parsed: StatusResponse = serde_json::from_str(r#"{"state": "queued"}"#).unwrap();
        assert_eq!(parsed.state, DownloadState::Queued);
        assert_eq!(parsed.progress, 0.0);
        assert_eq!(parsed.bytes_done, 0);
    }

    #[test]
    fn test_add_body_uses_config_category_fallback() {
        let body = AddDownloadBody {
            url: "http://x/dl".to_string(),
            name: "n".to_string(),
            category: "shelfhound".to_string(),
            expected_size_bytes: None,
        };
        let json = serde_json::to_string(&body).unwrap();
        assert!(json.contains("shelfhound"));
        assert!(!json.contains("expected_size_bytes"));
    }
}
