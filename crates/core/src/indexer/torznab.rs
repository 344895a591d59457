//! Torznab-style aggregator search backend.
//!
//! Queries each enabled source through a Jackett-compatible aggregator API
//! and merges results. Every request carries a bounded timeout and a
//! response-size cap.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::config::IndexerConfig;

use super::{
    CandidateResult, IndexerError, SearchCategory, SearchIndexer, SearchQuery, SearchReport,
    SourceStatus,
};

/// Aggregator search backend implementation.
pub struct TorznabIndexer {
    client: Client,
    config: IndexerConfig,
}

impl TorznabIndexer {
    /// Create a new indexer client with the given configuration.
    pub fn new(config: IndexerConfig) -> Result<Self, IndexerError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs as u64))
            .build()
            .map_err(|e| IndexerError::Internal(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    /// Build the aggregator API URL for a search against one source.
    fn build_search_url(&self, query: &SearchQuery, source: &str) -> String {
        let mut url = format!(
            "{}/api/v2.0/indexers/{}/results?apikey={}&Query={}",
            self.config.url.trim_end_matches('/'),
            urlencoding::encode(source),
            urlencoding::encode(&self.config.api_key),
            urlencoding::encode(&query.query)
        );

        if let Some(category) = query.category {
            for cat_id in category_ids(category) {
                url.push_str(&format!("&Category[]={}", cat_id));
            }
        }

        url
    }

    /// Search a single source.
    async fn search_source(
        &self,
        query: &SearchQuery,
        source: &str,
    ) -> Result<Vec<CandidateResult>, IndexerError> {
        let url = self.build_search_url(query, source);
        debug!(source = source, "Searching indexer");

        let response = self.client.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                IndexerError::Timeout
            } else if e.is_connect() {
                IndexerError::ConnectionFailed(e.to_string())
            } else {
                IndexerError::ApiError(e.to_string())
            }
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(IndexerError::ApiError(format!(
                "HTTP {}: {}",
                status,
                body.chars().take(200).collect::<String>()
            )));
        }

        if let Some(len) = response.content_length() {
            if len > self.config.max_response_bytes {
                return Err(IndexerError::ResponseTooLarge(len));
            }
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| IndexerError::ApiError(format!("Failed to read response: {}", e)))?;

        if bytes.len() as u64 > self.config.max_response_bytes {
            return Err(IndexerError::ResponseTooLarge(bytes.len() as u64));
        }

        let parsed: AggregatorResponse = serde_json::from_slice(&bytes)
            .map_err(|e| IndexerError::ApiError(format!("Failed to parse response: {}", e)))?;

        debug!(
            source = source,
            results = parsed.Results.len(),
            "Indexer search complete"
        );

        Ok(parsed
            .Results
            .into_iter()
            .map(|r| {
                let mut download_urls = Vec::new();
                if let Some(magnet) = r.MagnetUri {
                    download_urls.push(magnet);
                }
                if let Some(link) = r.Link {
                    download_urls.push(link);
                }
                CandidateResult {
                    title: r.Title,
                    size_bytes: r.Size.unwrap_or(0),
                    seeders: r.Seeders.unwrap_or(0),
                    source: source.to_string(),
                    download_urls,
                    format_hint: r.CategoryDesc,
                    publish_date: r
                        .PublishDate
                        .and_then(|d| DateTime::parse_from_rfc3339(&d).ok())
                        .map(|d| d.with_timezone(&Utc)),
                }
            })
            .collect())
    }

    /// Sources to query for the given request, honoring the query override.
    fn sources_for(&self, query: &SearchQuery) -> Vec<String> {
        match &query.sources {
            Some(requested) => self
                .config
                .sources
                .iter()
                .filter(|s| s.enabled && requested.contains(&s.name))
                .map(|s| s.name.clone())
                .collect(),
            None => self
                .config
                .sources
                .iter()
                .filter(|s| s.enabled)
                .map(|s| s.name.clone())
                .collect(),
        }
    }
}

#[async_trait]
impl SearchIndexer for TorznabIndexer {
    fn name(&self) -> &str {
        "torznab"
    }

    async fn search(&self, query: &SearchQuery) -> Result<SearchReport, IndexerError> {
        let sources = self.sources_for(query);
        if sources.is_empty() {
            return Err(IndexerError::NoSourcesEnabled);
        }

        let started = Instant::now();

        let searches = sources.iter().map(|s| {
            let source = s.clone();
            async move { (source.clone(), self.search_source(query, &source).await) }
        });

        let mut candidates = Vec::new();
        let mut source_errors = HashMap::new();

        for (source, result) in join_all(searches).await {
            match result {
                Ok(results) => candidates.extend(results),
                Err(e) => {
                    warn!(source = %source, error = %e, "Source search failed");
                    source_errors.insert(source, e.to_string());
                }
            }
        }

        if candidates.is_empty() && source_errors.len() == sources.len() {
            return Err(IndexerError::AllSourcesFailed(source_errors));
        }

        let min_availability = query.min_availability.max(self.config.min_availability);
        candidates.retain(|c| c.seeders >= min_availability);

        let cap = query.max_results.unwrap_or(self.config.max_results) as usize;
        candidates.truncate(cap);

        Ok(SearchReport {
            query: query.clone(),
            candidates,
            duration_ms: started.elapsed().as_millis() as u64,
            source_errors,
        })
    }

    async fn source_status(&self) -> Vec<SourceStatus> {
        self.config
            .sources
            .iter()
            .map(|s| SourceStatus {
                name: s.name.clone(),
                enabled: s.enabled,
            })
            .collect()
    }
}

/// Category IDs in the aggregator's Newznab-derived numbering.
fn category_ids(category: SearchCategory) -> &'static [u32] {
    match category {
        SearchCategory::Audiobooks => &[3030],
        SearchCategory::Ebooks => &[7020, 8010],
        SearchCategory::Other => &[8000],
    }
}

/// Aggregator API response shapes (field names follow the wire format).
#[allow(non_snake_case)]
#[derive(Debug, Deserialize)]
struct AggregatorResponse {
    #[serde(default)]
    Results: Vec<AggregatorResult>,
}

#[allow(non_snake_case)]
#[derive(Debug, Deserialize)]
struct AggregatorResult {
    Title: String,
    #[serde(default)]
    Link: Option<String>,
    #[serde(default)]
    MagnetUri: Option<String>,
    #[serde(default)]
    Size: Option<u64>,
    #[serde(default)]
    Seeders: Option<u32>,
    #[serde(default)]
    CategoryDesc: Option<String>,
    #[serde(default)]
    PublishDate: Option<String>,
}
