//! Mock direct-fetch source for testing.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::fetcher::{ContentHandle, DirectFetcher, FetchError};

/// Mock implementation of the [`DirectFetcher`] trait.
pub struct MockFetcher {
    name: String,
    by_external_id: Arc<RwLock<Option<ContentHandle>>>,
    by_title_author: Arc<RwLock<Option<ContentHandle>>>,
    locations: Arc<RwLock<Vec<String>>>,
    next_error: Arc<RwLock<Option<FetchError>>>,
    lookups: Arc<RwLock<Vec<String>>>,
}

impl MockFetcher {
    /// Create a mock fetcher identifying as `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            by_external_id: Arc::new(RwLock::new(None)),
            by_title_author: Arc::new(RwLock::new(None)),
            locations: Arc::new(RwLock::new(Vec::new())),
            next_error: Arc::new(RwLock::new(None)),
            lookups: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Script the handle returned for external-id lookups.
    pub async fn set_external_id_result(&self, handle: Option<ContentHandle>) {
        *self.by_external_id.write().await = handle;
    }

    /// Script the handle returned for title/author lookups.
    pub async fn set_title_author_result(&self, handle: Option<ContentHandle>) {
        *self.by_title_author.write().await = handle;
    }

    /// Script the download locations returned for any handle.
    pub async fn set_locations(&self, locations: Vec<String>) {
        *self.locations.write().await = locations;
    }

    /// Make the next lookup fail.
    pub async fn set_next_error(&self, error: FetchError) {
        *self.next_error.write().await = Some(error);
    }

    /// Lookup descriptions recorded so far.
    pub async fn recorded_lookups(&self) -> Vec<String> {
        self.lookups.read().await.clone()
    }

    async fn take_error(&self) -> Option<FetchError> {
        self.next_error.write().await.take()
    }
}

#[async_trait]
impl DirectFetcher for MockFetcher {
    fn name(&self) -> &str {
        &self.name
    }

    async fn search_by_external_id(
        &self,
        external_id: &str,
        format: &str,
    ) -> Result<Option<ContentHandle>, FetchError> {
        self.lookups
            .write()
            .await
            .push(format!("external_id:{}:{}", external_id, format));
        if let Some(error) = self.take_error().await {
            return Err(error);
        }
        Ok(self.by_external_id.read().await.clone())
    }

    async fn search_by_title_author(
        &self,
        title: &str,
        author: &str,
        format: &str,
    ) -> Result<Option<ContentHandle>, FetchError> {
        self.lookups
            .write()
            .await
            .push(format!("title_author:{}:{}:{}", title, author, format));
        if let Some(error) = self.take_error().await {
            return Err(error);
        }
        Ok(self.by_title_author.read().await.clone())
    }

    async fn download_locations(&self, _handle: &ContentHandle) -> Result<Vec<String>, FetchError> {
        if let Some(error) = self.take_error().await {
            return Err(error);
        }
        Ok(self.locations.read().await.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures;

    #[tokio::test]
    async fn test_scripted_lookups() {
        let fetcher = MockFetcher::new("openbooks");
        fetcher
            .set_title_author_result(Some(fixtures::ebook_handle("ed-1", "Title", "openbooks")))
            .await;
        fetcher.set_locations(vec!["http://a/1".to_string()]).await;

        assert!(fetcher
            .search_by_external_id("x", "epub")
            .await
            .unwrap()
            .is_none());
        let handle = fetcher
            .search_by_title_author("Title", "Author", "epub")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(handle.id, "ed-1");

        let locations = fetcher.download_locations(&handle).await.unwrap();
        assert_eq!(locations.len(), 1);

        let lookups = fetcher.recorded_lookups().await;
        assert_eq!(lookups.len(), 2);
        assert!(lookups[0].starts_with("external_id:"));
    }
}
