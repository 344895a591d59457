//! Testing utilities and mock implementations for E2E tests.
//!
//! Mock implementations of all external service traits, allowing full
//! pipeline testing without real infrastructure.

mod mock_download_client;
mod mock_fetcher;
mod mock_indexer;

pub use mock_download_client::MockDownloadClient;
pub use mock_fetcher::MockFetcher;
pub use mock_indexer::MockIndexer;

/// Test fixtures and helper functions.
pub mod fixtures {
    use crate::fetcher::ContentHandle;
    use crate::indexer::CandidateResult;

    /// Create a test audiobook candidate with reasonable defaults.
    pub fn audiobook_candidate(title: &str, seeders: u32) -> CandidateResult {
        CandidateResult {
            title: title.to_string(),
            size_bytes: 450_000_000,
            seeders,
            source: "mock-source".to_string(),
            download_urls: vec![format!(
                "http://mock/dl/{}",
                title.to_lowercase().replace(' ', "-")
            )],
            format_hint: None,
            publish_date: None,
        }
    }

    /// Create a test e-book edition handle.
    pub fn ebook_handle(id: &str, title: &str, source: &str) -> ContentHandle {
        ContentHandle {
            id: id.to_string(),
            title: title.to_string(),
            format: "epub".to_string(),
            size_bytes: Some(2_400_000),
            source: source.to_string(),
        }
    }
}
