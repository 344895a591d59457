//! Mock search indexer for testing.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::indexer::{
    CandidateResult, IndexerError, SearchIndexer, SearchQuery, SearchReport, SourceStatus,
};

/// Mock implementation of the [`SearchIndexer`] trait.
///
/// Scriptable results and errors, plus recorded queries for assertions.
pub struct MockIndexer {
    results: Arc<RwLock<Vec<CandidateResult>>>,
    searches: Arc<RwLock<Vec<SearchQuery>>>,
    next_error: Arc<RwLock<Option<IndexerError>>>,
}

impl Default for MockIndexer {
    fn default() -> Self {
        Self::new()
    }
}

impl MockIndexer {
    /// Create a new mock indexer with empty results.
    pub fn new() -> Self {
        Self {
            results: Arc::new(RwLock::new(Vec::new())),
            searches: Arc::new(RwLock::new(Vec::new())),
            next_error: Arc::new(RwLock::new(None)),
        }
    }

    /// Set the candidates every search returns.
    pub async fn set_results(&self, results: Vec<CandidateResult>) {
        *self.results.write().await = results;
    }

    /// Make the next search fail with the given error.
    pub async fn set_next_error(&self, error: IndexerError) {
        *self.next_error.write().await = Some(error);
    }

    /// Queries recorded so far.
    pub async fn recorded_searches(&self) -> Vec<SearchQuery> {
        self.searches.read().await.clone()
    }
}

#[async_trait]
impl SearchIndexer for MockIndexer {
    fn name(&self) -> &str {
        "mock"
    }

    async fn search(&self, query: &SearchQuery) -> Result<SearchReport, IndexerError> {
        self.searches.write().await.push(query.clone());

        if let Some(error) = self.next_error.write().await.take() {
            return Err(error);
        }

        Ok(SearchReport {
            query: query.clone(),
            candidates: self.results.read().await.clone(),
            duration_ms: 1,
            source_errors: Default::default(),
        })
    }

    async fn source_status(&self) -> Vec<SourceStatus> {
        vec![SourceStatus {
            name: "mock-source".to_string(),
            enabled: true,
        }]
    }
}
