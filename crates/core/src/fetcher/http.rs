//! HTTP direct-fetch source implementation.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::config::SidecarSourceConfig;

use super::{ContentHandle, DirectFetcher, FetchError};

/// Direct-fetch client for one configured sidecar source.
pub struct HttpFetcher {
    client: Client,
    config: SidecarSourceConfig,
    max_response_bytes: u64,
}

impl HttpFetcher {
    /// Create a fetcher for one source.
    pub fn new(
        config: SidecarSourceConfig,
        timeout_secs: u32,
        max_response_bytes: u64,
    ) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs as u64))
            .build()
            .map_err(|e| FetchError::Internal(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config,
            max_response_bytes,
        })
    }

    fn base_url(&self) -> &str {
        self.config.url.trim_end_matches('/')
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, FetchError> {
        let mut request = self.client.get(url);
        if let Some(ref key) = self.config.api_key {
            request = request.header("X-Api-Key", key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout
            } else if e.is_connect() {
                FetchError::ConnectionFailed(e.to_string())
            } else {
                FetchError::ApiError(e.to_string())
            }
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::ApiError(format!(
                "HTTP {}: {}",
                status,
                body.chars().take(200).collect::<String>()
            )));
        }

        if let Some(len) = response.content_length() {
            if len > self.max_response_bytes {
                return Err(FetchError::ResponseTooLarge(len));
            }
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError::ApiError(format!("Failed to read response: {}", e)))?;

        if bytes.len() as u64 > self.max_response_bytes {
            return Err(FetchError::ResponseTooLarge(bytes.len() as u64));
        }

        serde_json::from_slice(&bytes)
            .map_err(|e| FetchError::ApiError(format!("Failed to parse response: {}", e)))
    }

    fn to_handle(&self, edition: EditionResponse) -> ContentHandle {
        ContentHandle {
            id: edition.id,
            title: edition.title,
            format: edition.format,
            size_bytes: edition.size_bytes,
            source: self.config.name.clone(),
        }
    }
}

#[async_trait]
impl DirectFetcher for HttpFetcher {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn search_by_external_id(
        &self,
        external_id: &str,
        format: &str,
    ) -> Result<Option<ContentHandle>, FetchError> {
        let url = format!(
            "{}/api/editions?external_id={}&format={}",
            self.base_url(),
            urlencoding::encode(external_id),
            urlencoding::encode(format)
        );
        debug!(source = %self.config.name, external_id, "Direct fetch by external id");

        let results: Vec<EditionResponse> = self.get_json(&url).await?;
        Ok(results.into_iter().next().map(|e| self.to_handle(e)))
    }

    async fn search_by_title_author(
        &self,
        title: &str,
        author: &str,
        format: &str,
    ) -> Result<Option<ContentHandle>, FetchError> {
        let url = format!(
            "{}/api/editions?title={}&author={}&format={}",
            self.base_url(),
            urlencoding::encode(title),
            urlencoding::encode(author),
            urlencoding::encode(format)
        );
        debug!(source = %self.config.name, title, "Direct fetch by title/author");

        let results: Vec<EditionResponse> = self.get_json(&url).await?;
        Ok(results.into_iter().next().map(|e| self.to_handle(e)))
    }

    async fn download_locations(&self, handle: &ContentHandle) -> Result<Vec<String>, FetchError> {
        let url = format!(
            "{}/api/editions/{}/locations",
            self.base_url(),
            urlencoding::encode(&handle.id)
        );

        let response: LocationsResponse = self.get_json(&url).await?;
        Ok(response.urls)
    }
}

/// Wire format for an edition listing.
#[derive(Debug, Deserialize)]
struct EditionResponse {
    id: String,
    title: String,
    format: String,
    #[serde(default)]
    size_bytes: Option<u64>,
}

/// Wire format for the location list of an edition.
#[derive(Debug, Deserialize)]
struct LocationsResponse {
    #[serde(default)]
    urls: Vec<String>,
}
