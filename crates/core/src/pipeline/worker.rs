//! Worker pool: claims jobs, runs processors, routes failures.
//!
//! Any number of workers may run concurrently, here or in other processes;
//! the queue's atomic claim is the only coordination between them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::config::PipelineConfig;
use crate::events::{EventHandle, PipelineEvent};
use crate::jobs::{Job, JobQueue, JobStatus};
use crate::metrics;
use crate::request::{RequestFilter, RequestStatus, RequestStore};

use super::processors::Processors;

/// Snapshot of the worker pool state.
#[derive(Debug, Clone, Default)]
pub struct WorkerPoolStatus {
    pub running: bool,
    pub queued_jobs: usize,
    pub running_jobs: usize,
    pub awaiting_search: usize,
}

/// The worker pool: N claim loops plus the re-search sweeper.
pub struct WorkerPool {
    config: PipelineConfig,
    processors: Arc<Processors>,
    queue: Arc<dyn JobQueue>,
    requests: Arc<dyn RequestStore>,
    events: Option<EventHandle>,

    running: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
}

impl WorkerPool {
    pub fn new(
        config: PipelineConfig,
        processors: Arc<Processors>,
        queue: Arc<dyn JobQueue>,
        requests: Arc<dyn RequestStore>,
        events: Option<EventHandle>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            processors,
            queue,
            requests,
            events,
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
        }
    }

    /// Start the worker loops and the sweeper (spawns background tasks).
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Worker pool already running");
            return;
        }

        info!(workers = self.config.worker_count, "Starting worker pool");

        for worker_id in 0..self.config.worker_count {
            self.spawn_worker_loop(worker_id);
        }
        self.spawn_sweeper_loop();

        info!("Worker pool started");
    }

    /// Stop the pool gracefully.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            warn!("Worker pool not running");
            return;
        }

        info!("Stopping worker pool");
        let _ = self.shutdown_tx.send(());

        // Give workers a moment to finish current work
        tokio::time::sleep(Duration::from_millis(500)).await;

        info!("Worker pool stopped");
    }

    /// Current pool status.
    pub fn status(&self) -> WorkerPoolStatus {
        WorkerPoolStatus {
            running: self.running.load(Ordering::Relaxed),
            queued_jobs: self
                .queue
                .count_by_status(JobStatus::Queued)
                .unwrap_or(0)
                .max(0) as usize,
            running_jobs: self
                .queue
                .count_by_status(JobStatus::Running)
                .unwrap_or(0)
                .max(0) as usize,
            awaiting_search: self
                .requests
                .count(&RequestFilter::new().with_status(RequestStatus::AwaitingSearch))
                .unwrap_or(0)
                .max(0) as usize,
        }
    }

    fn spawn_worker_loop(&self, worker_id: usize) {
        let running = Arc::clone(&self.running);
        let processors = Arc::clone(&self.processors);
        let queue = Arc::clone(&self.queue);
        let requests = Arc::clone(&self.requests);
        let events = self.events.clone();
        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            debug!(worker_id, "Worker loop started");
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        debug!(worker_id, "Worker received shutdown signal");
                        break;
                    }
                    _ = tokio::time::sleep(poll_interval) => {
                        if !running.load(Ordering::Relaxed) {
                            break;
                        }
                        // Drain runnable jobs before sleeping again
                        loop {
                            match queue.claim_next(None) {
                                Ok(Some(job)) => {
                                    Self::handle_job(&processors, &queue, &requests, &events, job)
                                        .await;
                                }
                                Ok(None) => break,
                                Err(e) => {
                                    error!(worker_id, "Failed to claim job: {}", e);
                                    break;
                                }
                            }
                            if !running.load(Ordering::Relaxed) {
                                break;
                            }
                        }
                    }
                }
            }
            debug!(worker_id, "Worker loop stopped");
        });
    }

    /// Run one claimed job and record its outcome on the queue.
    async fn handle_job(
        processors: &Arc<Processors>,
        queue: &Arc<dyn JobQueue>,
        requests: &Arc<dyn RequestStore>,
        events: &Option<EventHandle>,
        job: Job,
    ) {
        debug!(job_id = %job.id, job_type = %job.job_type, "Processing job");

        match processors.dispatch(&job).await {
            Ok(result) => {
                if let Err(e) = queue.complete(&job.id, result) {
                    error!(job_id = %job.id, "Failed to complete job: {}", e);
                }
            }
            Err(e) => {
                let error_text = e.to_string();
                warn!(job_id = %job.id, error = %error_text, "Job failed");

                match queue.fail(&job.id, &error_text) {
                    Ok(failed) if failed.status == JobStatus::Failed => {
                        // Attempts exhausted: surface the failure on the request
                        if let Some(ref handle) = events {
                            handle.try_emit(PipelineEvent::JobExhausted {
                                job_id: failed.id.clone(),
                                job_type: failed.job_type.as_str().to_string(),
                                error: error_text.clone(),
                            });
                        }

                        let request_id = failed.payload.request_id().to_string();
                        let message = format!(
                            "{} failed after {} attempts: {}",
                            failed.job_type, failed.attempts, error_text
                        );
                        match requests.update_status(
                            &request_id,
                            RequestStatus::Failed,
                            Some(message),
                        ) {
                            Ok(_) => {
                                info!(request_id = %request_id, "Request failed after job retries")
                            }
                            Err(err) => {
                                // Deleted or already terminal: nothing to surface
                                debug!(request_id = %request_id, "Skipped failure update: {}", err)
                            }
                        }
                    }
                    Ok(retried) => {
                        metrics::JOB_RETRIES
                            .with_label_values(&[retried.job_type.as_str()])
                            .inc();
                        if let Some(ref handle) = events {
                            handle.try_emit(PipelineEvent::JobRetryScheduled {
                                job_id: retried.id.clone(),
                                job_type: retried.job_type.as_str().to_string(),
                                attempts: retried.attempts,
                                error: error_text,
                            });
                        }
                    }
                    Err(err) => {
                        error!(job_id = %job.id, "Failed to record job failure: {}", err);
                    }
                }
            }
        }
    }

    /// The sweeper re-schedules searches for requests parked in
    /// awaiting-search once their re-search interval has elapsed.
    fn spawn_sweeper_loop(&self) {
        let running = Arc::clone(&self.running);
        let processors = Arc::clone(&self.processors);
        let requests = Arc::clone(&self.requests);
        let sweep_interval = Duration::from_secs(self.config.sweep_interval_secs);
        let research_interval =
            chrono::Duration::minutes(self.config.research_interval_mins as i64);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            debug!("Sweeper loop started");
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        debug!("Sweeper received shutdown signal");
                        break;
                    }
                    _ = tokio::time::sleep(sweep_interval) => {
                        if !running.load(Ordering::Relaxed) {
                            break;
                        }

                        let cutoff = Utc::now() - research_interval;
                        let filter = RequestFilter::new()
                            .with_status(RequestStatus::AwaitingSearch)
                            .with_last_search_before(cutoff)
                            .with_limit(20);

                        let due = match requests.list(&filter) {
                            Ok(due) => due,
                            Err(e) => {
                                error!("Sweeper failed to list requests: {}", e);
                                continue;
                            }
                        };

                        for request in due {
                            match processors.enqueue_search(&request) {
                                Ok(job) => {
                                    info!(
                                        request_id = %request.id,
                                        job_id = %job.id,
                                        "Re-search scheduled"
                                    );
                                }
                                Err(e) => {
                                    warn!(
                                        request_id = %request.id,
                                        "Failed to schedule re-search: {}", e
                                    );
                                }
                            }
                        }
                    }
                }
            }
            debug!("Sweeper loop stopped");
        });
    }
}
