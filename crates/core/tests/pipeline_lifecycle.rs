//! End-to-end pipeline lifecycle tests over in-memory stores and mocks.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use shelfhound_core::config::{PathMapConfig, SidecarSourceConfig};
use shelfhound_core::downloader::DownloadClient;
use shelfhound_core::history::{HistoryStore, SqliteHistoryStore};
use shelfhound_core::indexer::{CandidateResult, IndexerError};
use shelfhound_core::jobs::{Job, JobQueue, JobStatus, JobType, SqliteJobQueue};
use shelfhound_core::pipeline::{PipelineRuntime, Processors};
use shelfhound_core::ranking::{FlagRule, RankingOptions};
use shelfhound_core::request::{
    CreateRequest, RequestFilter, RequestKind, RequestStatus, RequestStore, SqliteRequestStore,
};
use shelfhound_core::testing::{fixtures, MockDownloadClient, MockFetcher, MockIndexer};

struct TestPipeline {
    requests: Arc<SqliteRequestStore>,
    queue: Arc<SqliteJobQueue>,
    history: Arc<SqliteHistoryStore>,
    indexer: Arc<MockIndexer>,
    fetcher: Arc<MockFetcher>,
    client: Arc<MockDownloadClient>,
    processors: Processors,
    _temp: tempfile::TempDir,
    library_root: PathBuf,
    download_dir: PathBuf,
}

impl TestPipeline {
    fn new() -> Self {
        Self::with_library(true)
    }

    fn with_library(library: bool) -> Self {
        let temp = tempfile::tempdir().unwrap();
        let library_root = temp.path().join("library");
        let download_dir = temp.path().join("downloads");
        std::fs::create_dir_all(&download_dir).unwrap();

        let requests = Arc::new(SqliteRequestStore::in_memory().unwrap());
        let queue = Arc::new(
            SqliteJobQueue::in_memory()
                .unwrap()
                .with_retry_backoff(Duration::from_millis(0)),
        );
        let history = Arc::new(SqliteHistoryStore::in_memory().unwrap());
        let indexer = Arc::new(MockIndexer::new());
        let fetcher = Arc::new(MockFetcher::new("openbooks"));
        let client = Arc::new(MockDownloadClient::new());

        let runtime = PipelineRuntime {
            default_max_attempts: 3,
            monitor_poll: Duration::from_millis(0),
            ranking: RankingOptions {
                source_priorities: HashMap::new(),
                flag_rules: vec![FlagRule {
                    name: "abridged".to_string(),
                    pattern: "abridged".to_string(),
                    points: -40,
                }],
            },
            sidecar_trust: HashMap::from([("openbooks".to_string(), 20u8)]),
            sidecar_sources: vec![SidecarSourceConfig {
                name: "openbooks".to_string(),
                url: "http://mock".to_string(),
                api_key: None,
                enabled: true,
                trust: 20,
                preferred_format: "epub".to_string(),
            }],
            library_root: library.then(|| library_root.clone()),
            dest_template: "{author}/{title}".to_string(),
            path_map: PathMapConfig::default(),
        };

        let processors = Processors::new(
            runtime,
            requests.clone() as Arc<dyn RequestStore>,
            queue.clone() as Arc<dyn JobQueue>,
            history.clone() as Arc<dyn HistoryStore>,
            Some(indexer.clone() as Arc<dyn shelfhound_core::indexer::SearchIndexer>),
            vec![fetcher.clone() as Arc<dyn shelfhound_core::fetcher::DirectFetcher>],
            Some(client.clone() as Arc<dyn DownloadClient>),
            None,
        );

        Self {
            requests,
            queue,
            history,
            indexer,
            fetcher,
            client,
            processors,
            _temp: temp,
            library_root,
            download_dir,
        }
    }

    /// Claim and process one job, mirroring the worker's outcome handling.
    async fn step(&self) -> Option<Job> {
        let job = self.queue.claim_next(None).ok().flatten()?;
        match self.processors.dispatch(&job).await {
            Ok(result) => {
                self.queue.complete(&job.id, result).unwrap();
            }
            Err(e) => {
                let failed = self.queue.fail(&job.id, &e.to_string()).unwrap();
                if failed.status == JobStatus::Failed {
                    let message = format!(
                        "{} failed after {} attempts: {}",
                        failed.job_type, failed.attempts, e
                    );
                    let _ = self.requests.update_status(
                        failed.payload.request_id(),
                        RequestStatus::Failed,
                        Some(message),
                    );
                }
            }
        }
        self.queue.get(&job.id).unwrap()
    }

    /// Process up to `max` runnable jobs.
    async fn drive(&self, max: usize) -> usize {
        let mut processed = 0;
        while processed < max && self.step().await.is_some() {
            processed += 1;
        }
        processed
    }

    fn create_primary(&self) -> shelfhound_core::request::AcquisitionRequest {
        let request = self
            .requests
            .create(
                CreateRequest::primary("The Wild Robot on the Island")
                    .with_author("Peter Brown")
                    .with_duration_minutes(250)
                    .with_external_id("ol-123"),
            )
            .unwrap();
        self.processors.enqueue_search(&request).unwrap();
        request
    }

    fn request_status(&self, id: &str) -> RequestStatus {
        self.requests.get(id).unwrap().unwrap().status
    }

    /// Put a fake completed download on disk and mark the transfer done.
    async fn finish_transfer(&self, client_id: &str, name: &str) -> PathBuf {
        let source = self.download_dir.join(name);
        std::fs::create_dir_all(&source).unwrap();
        std::fs::write(source.join("book.m4b"), b"audio data").unwrap();
        self.client
            .complete_transfer(client_id, source.to_str().unwrap(), 10)
            .await;
        source
    }
}

fn good_candidate() -> CandidateResult {
    let mut candidate = fixtures::audiobook_candidate("The Wild Robot on the Island [M4B]", 30);
    candidate.download_urls = vec!["http://mock/dl/good".to_string()];
    candidate
}

#[tokio::test]
async fn test_search_selects_and_starts_download() {
    let pipeline = TestPipeline::new();
    pipeline
        .indexer
        .set_results(vec![
            fixtures::audiobook_candidate("The Wild Robot", 500),
            good_candidate(),
        ])
        .await;

    let request = pipeline.create_primary();
    pipeline.drive(10).await;

    // The partial-title candidate is gated out; the full match wins
    assert_eq!(
        pipeline.request_status(&request.id),
        RequestStatus::Downloading
    );

    let records = pipeline.history.list_for_request(&request.id).unwrap();
    assert_eq!(records.len(), 1);
    assert!(records[0].selected);
    assert!(records[0].candidate_title.contains("[M4B]"));
    assert_eq!(records[0].client_id, Some("dl-1".to_string()));

    let starts = pipeline.client.recorded_starts().await;
    assert_eq!(starts.len(), 1);

    let fetched = pipeline.requests.get(&request.id).unwrap().unwrap();
    assert_eq!(fetched.search_attempts, 1);
}

#[tokio::test]
async fn test_no_qualifying_candidate_parks_request_without_job_failure() {
    let pipeline = TestPipeline::new();
    // Coverage gate rejects the only candidate (2 of 3 significant words)
    pipeline
        .indexer
        .set_results(vec![fixtures::audiobook_candidate("The Wild Robot", 500)])
        .await;

    let request = pipeline.create_primary();
    let job = pipeline.step().await.unwrap();

    assert_eq!(job.status, JobStatus::Completed, "not a job failure");
    assert_eq!(
        pipeline.request_status(&request.id),
        RequestStatus::AwaitingSearch
    );

    let fetched = pipeline.requests.get(&request.id).unwrap().unwrap();
    assert!(fetched.error_message.is_some());

    // Nothing was selected or started
    assert!(pipeline
        .history
        .list_for_request(&request.id)
        .unwrap()
        .is_empty());
    assert!(pipeline.client.recorded_starts().await.is_empty());
}

#[tokio::test]
async fn test_negative_bonus_disqualifies_via_flag_rule() {
    let pipeline = TestPipeline::new();
    let mut candidate =
        fixtures::audiobook_candidate("The Wild Robot on the Island [M4B] ABRIDGED", 30);
    candidate.download_urls = vec!["http://mock/dl/abridged".to_string()];
    pipeline.indexer.set_results(vec![candidate]).await;

    let request = pipeline.create_primary();
    pipeline.step().await;

    assert_eq!(
        pipeline.request_status(&request.id),
        RequestStatus::AwaitingSearch
    );
}

#[tokio::test]
async fn test_transient_search_error_rides_job_retries() {
    let pipeline = TestPipeline::new();
    pipeline.indexer.set_next_error(IndexerError::Timeout).await;
    pipeline.indexer.set_results(vec![good_candidate()]).await;

    let request = pipeline.create_primary();

    let job = pipeline.step().await.unwrap();
    assert_eq!(job.status, JobStatus::Queued, "requeued for retry");
    assert_eq!(job.attempts, 1);
    // The request is not failed by a retryable error
    assert_eq!(
        pipeline.request_status(&request.id),
        RequestStatus::Searching
    );

    // Next attempt succeeds
    pipeline.drive(10).await;
    assert_eq!(
        pipeline.request_status(&request.id),
        RequestStatus::Downloading
    );
}

#[tokio::test]
async fn test_exhausted_search_retries_fail_the_request() {
    let pipeline = TestPipeline::new();
    let request = pipeline.create_primary();

    for _ in 0..3 {
        pipeline.indexer.set_next_error(IndexerError::Timeout).await;
        pipeline.step().await;
    }

    let job_count = pipeline.queue.count_by_status(JobStatus::Failed).unwrap();
    assert_eq!(job_count, 1);

    let fetched = pipeline.requests.get(&request.id).unwrap().unwrap();
    assert_eq!(fetched.status, RequestStatus::Failed);
    let message = fetched.error_message.unwrap();
    assert!(message.contains("after 3 attempts"), "{}", message);
}

#[tokio::test]
async fn test_download_fallback_chain_uses_next_location() {
    let pipeline = TestPipeline::new();
    let mut candidate = good_candidate();
    candidate.download_urls = vec![
        "http://mock/dl/bad".to_string(),
        "http://mock/dl/backup".to_string(),
    ];
    pipeline.indexer.set_results(vec![candidate]).await;
    pipeline.client.reject_url("http://mock/dl/bad").await;

    let request = pipeline.create_primary();
    pipeline.drive(10).await;

    assert_eq!(
        pipeline.request_status(&request.id),
        RequestStatus::Downloading
    );

    let starts = pipeline.client.recorded_starts().await;
    assert_eq!(starts.len(), 2, "first location failed, second tried");
    assert_eq!(starts[1].url, "http://mock/dl/backup");
}

#[tokio::test]
async fn test_all_locations_exhausted_fails_request() {
    let pipeline = TestPipeline::new();
    let mut candidate = good_candidate();
    candidate.download_urls = vec![
        "http://mock/dl/bad1".to_string(),
        "http://mock/dl/bad2".to_string(),
    ];
    pipeline.indexer.set_results(vec![candidate]).await;
    pipeline.client.reject_url("http://mock/dl/bad1").await;
    pipeline.client.reject_url("http://mock/dl/bad2").await;

    let request = pipeline.create_primary();
    pipeline.drive(10).await;

    let fetched = pipeline.requests.get(&request.id).unwrap().unwrap();
    assert_eq!(fetched.status, RequestStatus::Failed);
    assert!(fetched
        .error_message
        .unwrap()
        .contains("all 2 download locations failed"));

    let records = pipeline.history.list_for_request(&request.id).unwrap();
    assert_eq!(records[0].download_status, Some("failed".to_string()));
}

#[tokio::test]
async fn test_full_lifecycle_to_available_with_sidecar() {
    let pipeline = TestPipeline::new();
    pipeline.indexer.set_results(vec![good_candidate()]).await;
    pipeline
        .fetcher
        .set_external_id_result(Some(fixtures::ebook_handle(
            "ed-1",
            "The Wild Robot on the Island",
            "openbooks",
        )))
        .await;
    pipeline
        .fetcher
        .set_locations(vec!["http://mock/ebook/1".to_string()])
        .await;

    let request = pipeline.create_primary();

    // Search + start-download
    pipeline.drive(10).await;
    assert_eq!(
        pipeline.request_status(&request.id),
        RequestStatus::Downloading
    );

    // Finish the transfer and let monitor + organize run
    pipeline.finish_transfer("dl-1", "the-wild-robot").await;
    pipeline.drive(10).await;

    let fetched = pipeline.requests.get(&request.id).unwrap().unwrap();
    assert_eq!(fetched.status, RequestStatus::Available);
    assert_eq!(fetched.progress, 100.0);

    // Files landed under the rendered library template
    let placed = pipeline
        .library_root
        .join("Peter Brown")
        .join("The Wild Robot on the Island")
        .join("book.m4b");
    assert!(placed.exists(), "expected {}", placed.display());

    // Exactly one sidecar request was spawned for the enabled source
    let sidecars = pipeline
        .requests
        .list(&RequestFilter::new().with_kind(RequestKind::Sidecar))
        .unwrap();
    assert_eq!(sidecars.len(), 1);
    assert_eq!(sidecars[0].parent_request_id, Some(request.id.clone()));
    assert_eq!(sidecars[0].sidecar_source, Some("openbooks".to_string()));

    // The sidecar search matched by external id and started its download
    assert_eq!(
        pipeline.request_status(&sidecars[0].id),
        RequestStatus::Downloading
    );
    let lookups = pipeline.fetcher.recorded_lookups().await;
    assert!(lookups[0].starts_with("external_id:ol-123"));
}

#[tokio::test]
async fn test_lifecycle_without_library_finishes_as_downloaded() {
    let pipeline = TestPipeline::with_library(false);
    pipeline.indexer.set_results(vec![good_candidate()]).await;

    let request = pipeline.create_primary();
    pipeline.drive(10).await;

    pipeline.finish_transfer("dl-1", "the-wild-robot").await;
    pipeline.drive(10).await;

    // No library root configured: files stay put
    assert_eq!(
        pipeline.request_status(&request.id),
        RequestStatus::Downloaded
    );
    assert!(pipeline
        .download_dir
        .join("the-wild-robot")
        .join("book.m4b")
        .exists());
}

#[tokio::test]
async fn test_sidecar_retrigger_resets_failed_request_instead_of_duplicating() {
    let pipeline = TestPipeline::new();
    pipeline.indexer.set_results(vec![good_candidate()]).await;
    pipeline
        .fetcher
        .set_locations(vec!["http://mock/ebook/1".to_string()])
        .await;
    // No fetcher results: the sidecar search parks in awaiting_search

    let request = pipeline.create_primary();
    pipeline.drive(10).await;
    pipeline.finish_transfer("dl-1", "the-wild-robot").await;
    pipeline.drive(10).await;

    let sidecars = pipeline
        .requests
        .list(&RequestFilter::new().with_kind(RequestKind::Sidecar))
        .unwrap();
    assert_eq!(sidecars.len(), 1);
    let sidecar_id = sidecars[0].id.clone();
    assert_eq!(
        pipeline.request_status(&sidecar_id),
        RequestStatus::AwaitingSearch
    );

    // Mark it failed, then re-trigger
    pipeline
        .requests
        .update_status(&sidecar_id, RequestStatus::Failed, Some("gone".to_string()))
        .unwrap();

    let spawned = pipeline
        .processors
        .trigger_sidecars(&request.id)
        .await
        .unwrap();
    assert_eq!(spawned, 1);

    // Same request, reset rather than duplicated
    let sidecars = pipeline
        .requests
        .list(&RequestFilter::new().with_kind(RequestKind::Sidecar))
        .unwrap();
    assert_eq!(sidecars.len(), 1);
    assert_eq!(sidecars[0].id, sidecar_id);
    assert_eq!(sidecars[0].status, RequestStatus::Pending);
    assert_eq!(sidecars[0].progress, 0.0);
    assert!(sidecars[0].error_message.is_none());

    // And a fresh search job was enqueued for it
    let job = pipeline
        .queue
        .claim_next(Some(JobType::SearchSidecar))
        .unwrap();
    assert!(job.is_some());
}

#[tokio::test]
async fn test_soft_deleted_request_is_skipped_without_side_effects() {
    let pipeline = TestPipeline::new();
    pipeline.indexer.set_results(vec![good_candidate()]).await;

    let request = pipeline.create_primary();
    pipeline.requests.soft_delete(&request.id).unwrap();

    let job = pipeline.step().await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);

    // No search ran, nothing was selected
    assert!(pipeline.indexer.recorded_searches().await.is_empty());
    assert!(pipeline
        .history
        .list_for_request(&request.id)
        .unwrap()
        .is_empty());

    let fetched = pipeline.requests.get(&request.id).unwrap().unwrap();
    assert_eq!(fetched.status, RequestStatus::Pending);
    assert!(fetched.is_deleted());
}

#[tokio::test]
async fn test_monitor_updates_progress_and_repolls() {
    let pipeline = TestPipeline::new();
    pipeline.indexer.set_results(vec![good_candidate()]).await;

    let request = pipeline.create_primary();
    // search + start-download
    pipeline.drive(2).await;

    // First monitor poll sees 40% progress
    pipeline
        .client
        .set_status(
            "dl-1",
            shelfhound_core::downloader::DownloadStatus {
                client_id: "dl-1".to_string(),
                state: shelfhound_core::downloader::DownloadState::Active,
                progress: 0.4,
                bytes_done: 180_000_000,
                total_bytes: Some(450_000_000),
                save_path: None,
                message: None,
            },
        )
        .await;

    let job = pipeline.step().await.unwrap();
    assert_eq!(job.job_type, JobType::MonitorDownload);
    assert_eq!(job.status, JobStatus::Completed);

    let fetched = pipeline.requests.get(&request.id).unwrap().unwrap();
    assert!((fetched.progress - 40.0).abs() < 0.01);
    assert_eq!(fetched.status, RequestStatus::Downloading);

    // A follow-up monitor job was enqueued
    let next = pipeline
        .queue
        .claim_next(Some(JobType::MonitorDownload))
        .unwrap();
    assert!(next.is_some());
}

#[tokio::test]
async fn test_client_reported_failure_fails_request() {
    let pipeline = TestPipeline::new();
    pipeline.indexer.set_results(vec![good_candidate()]).await;

    let request = pipeline.create_primary();
    pipeline.drive(2).await;

    pipeline
        .client
        .set_status(
            "dl-1",
            shelfhound_core::downloader::DownloadStatus {
                client_id: "dl-1".to_string(),
                state: shelfhound_core::downloader::DownloadState::Failed,
                progress: 0.1,
                bytes_done: 0,
                total_bytes: None,
                save_path: None,
                message: Some("disk full".to_string()),
            },
        )
        .await;

    let job = pipeline.step().await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);

    let fetched = pipeline.requests.get(&request.id).unwrap().unwrap();
    assert_eq!(fetched.status, RequestStatus::Failed);
    assert_eq!(fetched.error_message, Some("disk full".to_string()));
}
