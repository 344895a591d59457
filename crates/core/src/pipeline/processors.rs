//! Job processors: one handler per job type.
//!
//! Each processor reads the request, performs its step, updates the request,
//! enqueues the follow-on job, and returns a structured result stored on the
//! job. Expected domain failures are recorded on the request with a
//! human-readable message; only unexpected errors propagate to the queue's
//! retry handling.

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::json;
use tracing::{debug, info, warn};

use crate::downloader::{DownloadClient, DownloadClientError, DownloadState, StartDownloadRequest};
use crate::events::{EventHandle, PipelineEvent};
use crate::fetcher::{ContentHandle, DirectFetcher, MatchMethod};
use crate::history::{CreateHistoryRecord, HistoryStore};
use crate::indexer::{IndexerError, SearchCategory, SearchIndexer, SearchQuery};
use crate::jobs::{Job, JobPayload, JobQueue, SearchTarget};
use crate::metrics;
use crate::organizer::{transform, FsOrganizer};
use crate::ranking::{rank, rank_sidecar, select, TargetMetadata};
use crate::request::{
    AcquisitionRequest, CreateRequest, RequestError, RequestKind, RequestStatus, RequestStore,
};

use super::types::{PipelineRuntime, ProcessorError, SearchOutcome};

/// The set of job processors, with every collaborator injected.
pub struct Processors {
    runtime: PipelineRuntime,
    requests: Arc<dyn RequestStore>,
    queue: Arc<dyn JobQueue>,
    history: Arc<dyn HistoryStore>,
    indexer: Option<Arc<dyn SearchIndexer>>,
    fetchers: Vec<Arc<dyn DirectFetcher>>,
    download_client: Option<Arc<dyn DownloadClient>>,
    organizer: FsOrganizer,
    events: Option<EventHandle>,
}

impl Processors {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        runtime: PipelineRuntime,
        requests: Arc<dyn RequestStore>,
        queue: Arc<dyn JobQueue>,
        history: Arc<dyn HistoryStore>,
        indexer: Option<Arc<dyn SearchIndexer>>,
        fetchers: Vec<Arc<dyn DirectFetcher>>,
        download_client: Option<Arc<dyn DownloadClient>>,
        events: Option<EventHandle>,
    ) -> Self {
        Self {
            runtime,
            requests,
            queue,
            history,
            indexer,
            fetchers,
            download_client,
            organizer: FsOrganizer::new(),
            events,
        }
    }

    /// Route a claimed job to its processor.
    pub async fn dispatch(&self, job: &Job) -> Result<serde_json::Value, ProcessorError> {
        match job.payload.clone() {
            JobPayload::SearchMedia { request_id, target } => {
                self.process_search_media(&request_id, &target).await
            }
            JobPayload::SearchSidecar {
                request_id,
                source,
                target,
            } => self.process_search_sidecar(&request_id, &source, &target).await,
            JobPayload::StartDownload {
                request_id,
                history_id,
                download_urls,
                display_name,
                size_bytes,
            } => {
                self.process_start_download(
                    &request_id,
                    &history_id,
                    &download_urls,
                    &display_name,
                    size_bytes,
                )
                .await
            }
            JobPayload::MonitorDownload {
                request_id,
                client_id,
            } => self.process_monitor_download(&request_id, &client_id).await,
            JobPayload::OrganizeFiles {
                request_id,
                source_path,
                dest_template,
            } => {
                self.process_organize(&request_id, &source_path, &dest_template)
                    .await
            }
        }
    }

    /// Build the search payload appropriate to a request's kind.
    /// Returns `None` for a sidecar request without a source.
    pub fn search_payload_for(request: &AcquisitionRequest) -> Option<JobPayload> {
        let target = SearchTarget {
            title: request.title.clone(),
            author: request.author.clone(),
            external_id: request.external_id.clone(),
            preferred_format: request.preferred_format.clone(),
        };

        match request.kind {
            RequestKind::Primary => Some(JobPayload::SearchMedia {
                request_id: request.id.clone(),
                target,
            }),
            RequestKind::Sidecar => request.sidecar_source.as_ref().map(|source| {
                JobPayload::SearchSidecar {
                    request_id: request.id.clone(),
                    source: source.clone(),
                    target,
                }
            }),
        }
    }

    /// Enqueue the search job for a request.
    pub fn enqueue_search(&self, request: &AcquisitionRequest) -> Result<Job, ProcessorError> {
        let payload = Self::search_payload_for(request).ok_or_else(|| {
            ProcessorError::Queue(format!("sidecar request {} has no source", request.id))
        })?;
        self.queue
            .enqueue(payload, self.runtime.default_max_attempts)
            .map_err(|e| ProcessorError::Queue(e.to_string()))
    }

    // ========================================================================
    // search-media
    // ========================================================================

    async fn process_search_media(
        &self,
        request_id: &str,
        target: &SearchTarget,
    ) -> Result<serde_json::Value, ProcessorError> {
        let Some(request) = self.actionable_request(request_id)? else {
            return Ok(json!({"skipped": "request gone or terminal"}));
        };

        self.enter_searching(&request)?;

        let outcome = self.search_and_select(&request, target).await;

        // Exhaustive mapping from outcome to request state
        match outcome {
            SearchOutcome::Selected {
                ref title,
                ref source,
                base_score,
                final_score,
                candidates_evaluated,
                ..
            } => {
                metrics::SEARCHES_EXECUTED.with_label_values(&["selected"]).inc();
                metrics::CANDIDATES_EVALUATED
                    .with_label_values(&[])
                    .observe(candidates_evaluated as f64);
                metrics::SELECTION_SCORE
                    .with_label_values(&[])
                    .observe(final_score as f64);

                self.set_status(&request.id, RequestStatus::Downloading, None)?;
                self.emit(PipelineEvent::CandidateSelected {
                    request_id: request.id.clone(),
                    title: title.clone(),
                    source: source.clone(),
                    base_score,
                    final_score,
                })
                .await;

                info!(request_id = %request.id, title = %title, "Candidate selected");
                Ok(serde_json::to_value(&outcome).unwrap_or_default())
            }
            SearchOutcome::NoQualifyingCandidate { evaluated, ref reason } => {
                metrics::SEARCHES_EXECUTED
                    .with_label_values(&["no_candidates"])
                    .inc();

                // Not a job failure: the request parks until the next sweep
                self.set_status(
                    &request.id,
                    RequestStatus::AwaitingSearch,
                    Some(reason.clone()),
                )?;
                self.emit(PipelineEvent::NoCandidateQualified {
                    request_id: request.id.clone(),
                    evaluated,
                    reason: reason.clone(),
                })
                .await;

                debug!(request_id = %request.id, evaluated, "No qualifying candidate");
                Ok(serde_json::to_value(&outcome).unwrap_or_default())
            }
            SearchOutcome::TransientError { error } => {
                metrics::SEARCHES_EXECUTED.with_label_values(&["error"]).inc();
                Err(ProcessorError::Transient(error))
            }
            SearchOutcome::FatalError { ref error } => {
                // Configuration problem: fail fast without burning attempts
                self.set_status(&request.id, RequestStatus::Failed, Some(error.clone()))?;
                warn!(request_id = %request.id, error = %error, "Search failed fast");
                Ok(serde_json::to_value(&outcome).unwrap_or_default())
            }
        }
    }

    /// Run the external search and the ranking pass.
    async fn search_and_select(
        &self,
        request: &AcquisitionRequest,
        target: &SearchTarget,
    ) -> SearchOutcome {
        let Some(indexer) = self.indexer.as_ref() else {
            return SearchOutcome::FatalError {
                error: "no search indexer configured".to_string(),
            };
        };

        let mut query_text = target.title.clone();
        if let Some(ref author) = target.author {
            query_text.push(' ');
            query_text.push_str(author);
        }

        let mut query = SearchQuery::new(query_text.clone());
        query.category = Some(SearchCategory::Audiobooks);

        let report = match indexer.search(&query).await {
            Ok(report) => report,
            Err(IndexerError::NoSourcesEnabled) => {
                return SearchOutcome::FatalError {
                    error: "no search sources enabled".to_string(),
                }
            }
            Err(e) => {
                return SearchOutcome::TransientError {
                    error: format!("search failed: {}", e),
                }
            }
        };

        self.emit(PipelineEvent::SearchExecuted {
            request_id: request.id.clone(),
            query: query_text,
            candidates_found: report.candidates.len() as u32,
            duration_ms: report.duration_ms,
        })
        .await;

        // Candidates without a download location can never be fetched
        let candidates: Vec<_> = report
            .candidates
            .into_iter()
            .filter(|c| !c.download_urls.is_empty())
            .collect();
        let evaluated = candidates.len() as u32;

        let ranking_target = TargetMetadata {
            title: request.title.clone(),
            author: request.author.clone(),
            duration_minutes: request.duration_minutes,
        };

        let ranked = rank(&candidates, &ranking_target, &self.runtime.ranking);

        let Some(winner) = select(&ranked) else {
            let reason = if evaluated == 0 {
                "no candidates found".to_string()
            } else {
                format!("0 of {} candidates scored above the threshold", evaluated)
            };
            return SearchOutcome::NoQualifyingCandidate { evaluated, reason };
        };

        let record = match self.history.create(CreateHistoryRecord {
            request_id: request.id.clone(),
            source: winner.candidate.source.clone(),
            candidate_title: winner.candidate.title.clone(),
            size_bytes: winner.candidate.size_bytes,
            quality_score: winner.final_score,
            selected: true,
        }) {
            Ok(record) => record,
            Err(e) => {
                return SearchOutcome::TransientError {
                    error: format!("failed to record selection: {}", e),
                }
            }
        };

        let payload = JobPayload::StartDownload {
            request_id: request.id.clone(),
            history_id: record.id.clone(),
            download_urls: winner.candidate.download_urls.clone(),
            display_name: winner.candidate.title.clone(),
            size_bytes: Some(winner.candidate.size_bytes),
        };
        if let Err(e) = self.queue.enqueue(payload, self.runtime.default_max_attempts) {
            return SearchOutcome::TransientError {
                error: format!("failed to enqueue download: {}", e),
            };
        }

        SearchOutcome::Selected {
            history_id: record.id,
            title: winner.candidate.title.clone(),
            source: winner.candidate.source.clone(),
            base_score: winner.base_score,
            final_score: winner.final_score,
            candidates_evaluated: evaluated,
        }
    }

    // ========================================================================
    // search-sidecar
    // ========================================================================

    async fn process_search_sidecar(
        &self,
        request_id: &str,
        source: &str,
        target: &SearchTarget,
    ) -> Result<serde_json::Value, ProcessorError> {
        let Some(request) = self.actionable_request(request_id)? else {
            return Ok(json!({"skipped": "request gone or terminal"}));
        };

        let Some(fetcher) = self.fetchers.iter().find(|f| f.name() == source) else {
            // Configuration problem: the source this request targets is gone
            let error = format!("sidecar source '{}' is not configured", source);
            self.enter_searching(&request)?;
            self.set_status(&request.id, RequestStatus::Failed, Some(error.clone()))?;
            return Ok(json!({"outcome": "fatal_error", "error": error}));
        };

        self.enter_searching(&request)?;

        let format = target
            .preferred_format
            .as_deref()
            .unwrap_or("epub")
            .to_string();

        // Prefer the external catalog id, fall back to title/author
        let (handle, method) = match self
            .lookup_sidecar(fetcher.as_ref(), target, &format)
            .await
        {
            Ok(found) => found,
            Err(e) => return Err(ProcessorError::Transient(format!("sidecar lookup: {}", e))),
        };

        let Some(handle) = handle else {
            let reason = format!("no edition found at {}", source);
            self.set_status(
                &request.id,
                RequestStatus::AwaitingSearch,
                Some(reason.clone()),
            )?;
            self.emit(PipelineEvent::NoCandidateQualified {
                request_id: request.id.clone(),
                evaluated: 0,
                reason,
            })
            .await;
            return Ok(json!({"outcome": "no_match", "links": 0}));
        };

        let ranked = rank_sidecar(
            std::slice::from_ref(&handle),
            &format,
            &self.runtime.sidecar_trust,
        );
        let score = ranked.first().map(|r| r.score).unwrap_or(0.0);

        let locations = fetcher
            .download_locations(&handle)
            .await
            .map_err(|e| ProcessorError::Transient(format!("sidecar locations: {}", e)))?;

        if locations.is_empty() {
            let reason = format!("edition at {} has no download locations", source);
            self.set_status(
                &request.id,
                RequestStatus::AwaitingSearch,
                Some(reason),
            )?;
            return Ok(json!({
                "outcome": "no_match",
                "match_method": method.to_string(),
                "links": 0,
            }));
        }

        let record = self
            .history
            .create(CreateHistoryRecord {
                request_id: request.id.clone(),
                source: source.to_string(),
                candidate_title: handle.title.clone(),
                size_bytes: handle.size_bytes.unwrap_or(0),
                quality_score: score,
                selected: true,
            })
            .map_err(|e| ProcessorError::Store(e.to_string()))?;

        self.set_status(&request.id, RequestStatus::Downloading, None)?;

        let link_count = locations.len();
        self.queue
            .enqueue(
                JobPayload::StartDownload {
                    request_id: request.id.clone(),
                    history_id: record.id,
                    download_urls: locations,
                    display_name: handle.title.clone(),
                    size_bytes: handle.size_bytes,
                },
                self.runtime.default_max_attempts,
            )
            .map_err(|e| ProcessorError::Queue(e.to_string()))?;

        info!(request_id = %request.id, source, method = %method, "Sidecar edition selected");

        Ok(json!({
            "outcome": "selected",
            "match_method": method.to_string(),
            "score": score,
            "links": link_count,
        }))
    }

    async fn lookup_sidecar(
        &self,
        fetcher: &dyn DirectFetcher,
        target: &SearchTarget,
        format: &str,
    ) -> Result<(Option<ContentHandle>, MatchMethod), crate::fetcher::FetchError> {
        if let Some(ref external_id) = target.external_id {
            if let Some(handle) = fetcher.search_by_external_id(external_id, format).await? {
                return Ok((Some(handle), MatchMethod::ExternalId));
            }
        }

        let author = target.author.as_deref().unwrap_or("");
        let handle = fetcher
            .search_by_title_author(&target.title, author, format)
            .await?;
        Ok((handle, MatchMethod::TitleAuthor))
    }

    // ========================================================================
    // start-download
    // ========================================================================

    async fn process_start_download(
        &self,
        request_id: &str,
        history_id: &str,
        download_urls: &[String],
        display_name: &str,
        size_bytes: Option<u64>,
    ) -> Result<serde_json::Value, ProcessorError> {
        let Some(request) = self.actionable_request(request_id)? else {
            return Ok(json!({"skipped": "request gone or terminal"}));
        };

        let Some(client) = self.download_client.as_ref() else {
            let error = "no download client configured".to_string();
            self.set_status(&request.id, RequestStatus::Failed, Some(error.clone()))?;
            return Ok(json!({"outcome": "fatal_error", "error": error}));
        };

        // Fallback chain: try each known location before giving up
        let mut last_error = String::new();
        for (idx, url) in download_urls.iter().enumerate() {
            debug!(
                request_id = %request.id,
                location = idx + 1,
                total = download_urls.len(),
                "Trying download location"
            );

            let start = StartDownloadRequest {
                url: url.clone(),
                display_name: display_name.to_string(),
                category: None,
                expected_size_bytes: size_bytes,
            };

            match client.start(start).await {
                Ok(handle) => {
                    let _ = self.history.set_client_id(history_id, &handle.client_id);
                    let _ = self.history.set_download_status(history_id, "started");

                    metrics::DOWNLOADS_STARTED.inc();
                    self.emit(PipelineEvent::DownloadStarted {
                        request_id: request.id.clone(),
                        client_id: handle.client_id.clone(),
                        location: url.clone(),
                    })
                    .await;

                    self.queue
                        .enqueue_after(
                            JobPayload::MonitorDownload {
                                request_id: request.id.clone(),
                                client_id: handle.client_id.clone(),
                            },
                            self.runtime.default_max_attempts,
                            self.runtime.monitor_poll,
                        )
                        .map_err(|e| ProcessorError::Queue(e.to_string()))?;

                    info!(
                        request_id = %request.id,
                        client_id = %handle.client_id,
                        "Download started (location {} of {})",
                        idx + 1,
                        download_urls.len()
                    );

                    return Ok(json!({
                        "client_id": handle.client_id,
                        "location_index": idx,
                        "bytes_transferred": 0,
                    }));
                }
                Err(e) => {
                    warn!(
                        request_id = %request.id,
                        location = idx + 1,
                        error = %e,
                        "Download location failed"
                    );
                    last_error = e.to_string();
                }
            }
        }

        // All locations exhausted: terminal for this download attempt
        let error = if download_urls.is_empty() {
            "no download locations known".to_string()
        } else {
            format!(
                "all {} download locations failed, last error: {}",
                download_urls.len(),
                last_error
            )
        };

        metrics::DOWNLOADS_FAILED.inc();
        let _ = self.history.set_download_status(history_id, "failed");
        self.set_status(&request.id, RequestStatus::Failed, Some(error.clone()))?;
        self.emit(PipelineEvent::DownloadFailed {
            request_id: request.id.clone(),
            reason: error.clone(),
        })
        .await;

        Ok(json!({"outcome": "locations_exhausted", "error": error}))
    }

    // ========================================================================
    // monitor-download
    // ========================================================================

    async fn process_monitor_download(
        &self,
        request_id: &str,
        client_id: &str,
    ) -> Result<serde_json::Value, ProcessorError> {
        let Some(request) = self.actionable_request(request_id)? else {
            return Ok(json!({"skipped": "request gone or terminal"}));
        };

        let Some(client) = self.download_client.as_ref() else {
            let error = "no download client configured".to_string();
            self.set_status(&request.id, RequestStatus::Failed, Some(error.clone()))?;
            return Ok(json!({"outcome": "fatal_error", "error": error}));
        };

        let status = match client.status(client_id).await {
            Ok(status) => status,
            Err(DownloadClientError::NotFound(_)) => {
                // The transfer disappeared out from under us
                let error = format!("transfer {} no longer known to the client", client_id);
                metrics::DOWNLOADS_FAILED.inc();
                self.set_status(&request.id, RequestStatus::Failed, Some(error.clone()))?;
                self.emit(PipelineEvent::DownloadFailed {
                    request_id: request.id.clone(),
                    reason: error.clone(),
                })
                .await;
                return Ok(json!({"outcome": "transfer_lost", "error": error}));
            }
            Err(e) => return Err(ProcessorError::Transient(format!("client status: {}", e))),
        };

        match status.state {
            DownloadState::Queued | DownloadState::Active => {
                let progress_pct = (status.progress * 100.0).clamp(0.0, 100.0);
                self.requests
                    .set_progress(&request.id, progress_pct)
                    .map_err(|e| ProcessorError::Store(e.to_string()))?;

                // Keep polling
                self.queue
                    .enqueue_after(
                        JobPayload::MonitorDownload {
                            request_id: request.id.clone(),
                            client_id: client_id.to_string(),
                        },
                        self.runtime.default_max_attempts,
                        self.runtime.monitor_poll,
                    )
                    .map_err(|e| ProcessorError::Queue(e.to_string()))?;

                Ok(json!({"progress": progress_pct}))
            }
            DownloadState::Complete => {
                self.requests
                    .set_progress(&request.id, 100.0)
                    .map_err(|e| ProcessorError::Store(e.to_string()))?;

                metrics::DOWNLOADS_COMPLETED.inc();
                self.emit(PipelineEvent::DownloadCompleted {
                    request_id: request.id.clone(),
                    client_id: client_id.to_string(),
                    bytes: status.bytes_done,
                })
                .await;

                let Some(save_path) = status.save_path else {
                    let error = "download finished but the client reported no path".to_string();
                    self.set_status(&request.id, RequestStatus::Failed, Some(error.clone()))?;
                    return Ok(json!({"outcome": "no_save_path", "error": error}));
                };

                // The client reports paths in its own filesystem view
                let translated = transform(&save_path, &self.runtime.path_map);
                if let Some(note) = &translated.note {
                    debug!(request_id = %request.id, note = %note, "Path translation");
                }

                self.set_status(&request.id, RequestStatus::Processing, None)?;

                self.queue
                    .enqueue(
                        JobPayload::OrganizeFiles {
                            request_id: request.id.clone(),
                            source_path: translated.path,
                            dest_template: self.runtime.dest_template.clone(),
                        },
                        self.runtime.default_max_attempts,
                    )
                    .map_err(|e| ProcessorError::Queue(e.to_string()))?;

                Ok(json!({"progress": 100.0, "bytes_transferred": status.bytes_done}))
            }
            DownloadState::Failed => {
                let error = status
                    .message
                    .unwrap_or_else(|| "download failed".to_string());
                metrics::DOWNLOADS_FAILED.inc();
                self.set_status(&request.id, RequestStatus::Failed, Some(error.clone()))?;
                self.emit(PipelineEvent::DownloadFailed {
                    request_id: request.id.clone(),
                    reason: error.clone(),
                })
                .await;
                Ok(json!({"outcome": "download_failed", "error": error}))
            }
        }
    }

    // ========================================================================
    // organize-files
    // ========================================================================

    async fn process_organize(
        &self,
        request_id: &str,
        source_path: &str,
        dest_template: &str,
    ) -> Result<serde_json::Value, ProcessorError> {
        let Some(request) = self.actionable_request(request_id)? else {
            return Ok(json!({"skipped": "request gone or terminal"}));
        };

        let (final_status, final_path) = match self.runtime.library_root.as_ref() {
            Some(root) => {
                let relative = FsOrganizer::render_template(
                    dest_template,
                    request.author.as_deref(),
                    &request.title,
                );
                let dest_dir = root.join(relative);

                let result = self
                    .organizer
                    .organize(&PathBuf::from(source_path), &dest_dir)
                    .await
                    .map_err(|e| ProcessorError::Transient(format!("organize: {}", e)))?;

                info!(
                    request_id = %request.id,
                    files = result.files_moved,
                    dest = %result.final_dir.display(),
                    "Files organized"
                );

                (
                    RequestStatus::Available,
                    result.final_dir.display().to_string(),
                )
            }
            None => {
                // No library configured: leave files where the client put them
                (RequestStatus::Downloaded, source_path.to_string())
            }
        };

        self.set_status(&request.id, final_status, None)?;
        metrics::ORGANIZES_COMPLETED
            .with_label_values(&[final_status.as_str()])
            .inc();
        self.emit(PipelineEvent::FilesOrganized {
            request_id: request.id.clone(),
            final_path: final_path.clone(),
        })
        .await;

        // A finished primary may spawn companion sidecar searches
        let mut sidecars_spawned = 0usize;
        if request.kind == RequestKind::Primary {
            sidecars_spawned = self.trigger_sidecars(&request.id).await?;
        }

        Ok(json!({
            "final_path": final_path,
            "status": final_status.as_str(),
            "sidecars_spawned": sidecars_spawned,
        }))
    }

    /// Spawn one sidecar search per enabled sidecar source for a completed
    /// primary request. Idempotent: an existing sidecar request for the same
    /// parent and source is reused (reset when it had failed or was parked)
    /// rather than duplicated. Also the entry point for manual re-triggers.
    pub async fn trigger_sidecars(&self, parent_id: &str) -> Result<usize, ProcessorError> {
        let parent = self
            .requests
            .get(parent_id)
            .map_err(|e| ProcessorError::Store(e.to_string()))?;

        let Some(parent) = parent.filter(|p| {
            !p.is_deleted() && p.kind == RequestKind::Primary && p.status.is_completed()
        }) else {
            return Ok(0);
        };

        self.spawn_sidecars(&parent).await
    }

    async fn spawn_sidecars(
        &self,
        parent: &AcquisitionRequest,
    ) -> Result<usize, ProcessorError> {
        let mut spawned = 0usize;

        for source in &self.runtime.sidecar_sources {
            let existing = self
                .requests
                .find_sidecar(&parent.id, &source.name)
                .map_err(|e| ProcessorError::Store(e.to_string()))?;

            let sidecar = match existing {
                Some(existing) => {
                    match existing.status {
                        RequestStatus::Failed | RequestStatus::AwaitingSearch => {
                            // Re-trigger: reset instead of duplicating
                            self.requests
                                .reset_for_retry(&existing.id)
                                .map_err(|e| ProcessorError::Store(e.to_string()))?
                        }
                        _ => {
                            debug!(
                                parent_id = %parent.id,
                                source = %source.name,
                                status = %existing.status,
                                "Sidecar request already in flight, skipping"
                            );
                            continue;
                        }
                    }
                }
                None => {
                    let mut create =
                        CreateRequest::sidecar(&parent.id, &source.name, &parent.title)
                            .with_preferred_format(&source.preferred_format);
                    create.author = parent.author.clone();
                    create.external_id = parent.external_id.clone();

                    match self.requests.create(create) {
                        Ok(request) => request,
                        Err(RequestError::InvalidParent(msg)) => {
                            warn!(parent_id = %parent.id, "Cannot spawn sidecar: {}", msg);
                            continue;
                        }
                        Err(e) => return Err(ProcessorError::Store(e.to_string())),
                    }
                }
            };

            self.enqueue_search(&sidecar)?;
            self.emit(PipelineEvent::SidecarSpawned {
                parent_request_id: parent.id.clone(),
                request_id: sidecar.id.clone(),
                source: source.name.clone(),
            })
            .await;

            info!(
                parent_id = %parent.id,
                request_id = %sidecar.id,
                source = %source.name,
                "Sidecar search spawned"
            );
            spawned += 1;
        }

        Ok(spawned)
    }

    // ========================================================================
    // Shared helpers
    // ========================================================================

    /// Load a request that is still worth working on. Returns `None` when it
    /// is missing, soft-deleted, or already terminal, so in-flight jobs exit
    /// early without side effects.
    fn actionable_request(
        &self,
        id: &str,
    ) -> Result<Option<AcquisitionRequest>, ProcessorError> {
        let request = self
            .requests
            .get(id)
            .map_err(|e| ProcessorError::Store(e.to_string()))?;

        Ok(request.filter(|r| !r.is_deleted() && !r.status.is_terminal()))
    }

    /// Move a request into `searching`, tolerating retries that already did.
    fn enter_searching(&self, request: &AcquisitionRequest) -> Result<(), ProcessorError> {
        if request.status == RequestStatus::Searching {
            return Ok(());
        }
        self.set_status(&request.id, RequestStatus::Searching, None)
    }

    fn set_status(
        &self,
        id: &str,
        status: RequestStatus,
        error_message: Option<String>,
    ) -> Result<(), ProcessorError> {
        let previous = self
            .requests
            .get(id)
            .map_err(|e| ProcessorError::Store(e.to_string()))?
            .map(|r| r.status);

        self.requests
            .update_status(id, status, error_message.clone())
            .map_err(|e| ProcessorError::Store(e.to_string()))?;

        if let Some(from) = previous {
            if let Some(ref handle) = self.events {
                handle.try_emit(PipelineEvent::RequestStateChanged {
                    request_id: id.to_string(),
                    from_status: from.as_str().to_string(),
                    to_status: status.as_str().to_string(),
                    reason: error_message,
                });
            }
        }

        Ok(())
    }

    async fn emit(&self, event: PipelineEvent) {
        if let Some(ref handle) = self.events {
            handle.emit(event).await;
        }
    }
}
