//! SQLite-backed job queue implementation.

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use super::{Job, JobPayload, JobQueue, JobStatus, JobType, QueueError};

/// Longest backoff the retry ladder will schedule.
const MAX_BACKOFF: Duration = Duration::from_secs(3600);

/// SQLite-backed job queue.
pub struct SqliteJobQueue {
    conn: Mutex<Connection>,
    retry_backoff: Duration,
}

impl SqliteJobQueue {
    /// Create a new SQLite job queue, creating the database file and tables
    /// if needed.
    pub fn new(path: &Path) -> Result<Self, QueueError> {
        let conn = Connection::open(path).map_err(|e| QueueError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            retry_backoff: Duration::from_secs(30),
        })
    }

    /// Create an in-memory SQLite job queue (useful for testing).
    pub fn in_memory() -> Result<Self, QueueError> {
        let conn =
            Connection::open_in_memory().map_err(|e| QueueError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            retry_backoff: Duration::from_secs(30),
        })
    }

    /// Override the base retry backoff.
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    fn initialize_schema(conn: &Connection) -> Result<(), QueueError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
                id TEXT PRIMARY KEY,
                job_type TEXT NOT NULL,
                payload TEXT NOT NULL,
                status TEXT NOT NULL,
                attempts INTEGER NOT NULL DEFAULT 0,
                max_attempts INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                run_at TEXT NOT NULL,
                started_at TEXT,
                completed_at TEXT,
                result TEXT,
                error_message TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_jobs_status_run_at ON jobs(status, run_at);
            CREATE INDEX IF NOT EXISTS idx_jobs_type ON jobs(job_type);
            "#,
        )
        .map_err(|e| QueueError::Database(e.to_string()))?;

        Ok(())
    }

    const COLUMNS: &'static str = "id, job_type, payload, status, attempts, max_attempts, \
         created_at, run_at, started_at, completed_at, result, error_message";

    fn row_to_job(row: &rusqlite::Row) -> rusqlite::Result<Job> {
        let job_type_str: String = row.get(1)?;
        let payload_json: String = row.get(2)?;
        let status_str: String = row.get(3)?;
        let created_at: String = row.get(6)?;
        let run_at: String = row.get(7)?;
        let started_at: Option<String> = row.get(8)?;
        let completed_at: Option<String> = row.get(9)?;
        let result_json: Option<String> = row.get(10)?;

        let payload: JobPayload = serde_json::from_str(&payload_json).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
        })?;

        Ok(Job {
            id: row.get(0)?,
            job_type: JobType::parse(&job_type_str).unwrap_or(payload.job_type()),
            payload,
            status: JobStatus::parse(&status_str).unwrap_or(JobStatus::Queued),
            attempts: row.get(4)?,
            max_attempts: row.get(5)?,
            created_at: parse_timestamp(&created_at).unwrap_or_else(Utc::now),
            run_at: parse_timestamp(&run_at).unwrap_or_else(Utc::now),
            started_at: started_at.and_then(|s| parse_timestamp(&s)),
            completed_at: completed_at.and_then(|s| parse_timestamp(&s)),
            result: result_json.and_then(|s| serde_json::from_str(&s).ok()),
            error_message: row.get(11)?,
        })
    }

    fn get_locked(conn: &Connection, id: &str) -> Result<Option<Job>, QueueError> {
        let sql = format!("SELECT {} FROM jobs WHERE id = ?", Self::COLUMNS);
        let result = conn.query_row(&sql, params![id], Self::row_to_job);

        match result {
            Ok(job) => Ok(Some(job)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(QueueError::Database(e.to_string())),
        }
    }

    fn insert(
        &self,
        payload: JobPayload,
        max_attempts: u32,
        run_at: DateTime<Utc>,
    ) -> Result<Job, QueueError> {
        let conn = self.conn.lock().unwrap();

        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();
        let job_type = payload.job_type();

        let payload_json =
            serde_json::to_string(&payload).map_err(|e| QueueError::Serialization(e.to_string()))?;

        conn.execute(
            "INSERT INTO jobs (id, job_type, payload, status, attempts, max_attempts, \
             created_at, run_at) VALUES (?, ?, ?, ?, 0, ?, ?, ?)",
            params![
                id,
                job_type.as_str(),
                payload_json,
                JobStatus::Queued.as_str(),
                max_attempts,
                now.to_rfc3339(),
                run_at.to_rfc3339(),
            ],
        )
        .map_err(|e| QueueError::Database(e.to_string()))?;

        Ok(Job {
            id,
            job_type,
            payload,
            status: JobStatus::Queued,
            attempts: 0,
            max_attempts,
            created_at: now,
            run_at,
            started_at: None,
            completed_at: None,
            result: None,
            error_message: None,
        })
    }

    /// Backoff before the next run of a job that has failed `attempts` times.
    fn backoff_for(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(10);
        let backoff = self.retry_backoff.saturating_mul(1u32 << exponent);
        backoff.min(MAX_BACKOFF)
    }
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

impl JobQueue for SqliteJobQueue {
    fn enqueue(&self, payload: JobPayload, max_attempts: u32) -> Result<Job, QueueError> {
        self.insert(payload, max_attempts.max(1), Utc::now())
    }

    fn enqueue_after(
        &self,
        payload: JobPayload,
        max_attempts: u32,
        delay: Duration,
    ) -> Result<Job, QueueError> {
        let run_at = Utc::now()
            + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());
        self.insert(payload, max_attempts.max(1), run_at)
    }

    fn claim_next(&self, job_type: Option<JobType>) -> Result<Option<Job>, QueueError> {
        let conn = self.conn.lock().unwrap();

        loop {
            let now = Utc::now().to_rfc3339();

            // Pick the oldest runnable job, then claim it with a guarded
            // update. The status check in the WHERE clause is the
            // compare-and-set: if another claimer got there first, zero rows
            // change and we pick again.
            let candidate: Option<String> = {
                let (sql, lookup_params): (String, Vec<Box<dyn rusqlite::ToSql>>) = match job_type
                {
                    Some(t) => (
                        "SELECT id FROM jobs WHERE status = 'queued' AND run_at <= ? \
                         AND job_type = ? ORDER BY created_at ASC, id ASC LIMIT 1"
                            .to_string(),
                        vec![Box::new(now.clone()), Box::new(t.as_str().to_string())],
                    ),
                    None => (
                        "SELECT id FROM jobs WHERE status = 'queued' AND run_at <= ? \
                         ORDER BY created_at ASC, id ASC LIMIT 1"
                            .to_string(),
                        vec![Box::new(now.clone())],
                    ),
                };

                let param_refs: Vec<&dyn rusqlite::ToSql> =
                    lookup_params.iter().map(|p| p.as_ref()).collect();

                match conn.query_row(&sql, param_refs.as_slice(), |row| row.get(0)) {
                    Ok(id) => Some(id),
                    Err(rusqlite::Error::QueryReturnedNoRows) => None,
                    Err(e) => return Err(QueueError::Database(e.to_string())),
                }
            };

            let Some(id) = candidate else {
                return Ok(None);
            };

            let changed = conn
                .execute(
                    "UPDATE jobs SET status = 'running', started_at = ? \
                     WHERE id = ? AND status = 'queued'",
                    params![now, id],
                )
                .map_err(|e| QueueError::Database(e.to_string()))?;

            if changed == 1 {
                return Self::get_locked(&conn, &id);
            }
            // Lost the race; pick another candidate.
        }
    }

    fn complete(&self, id: &str, result: serde_json::Value) -> Result<Job, QueueError> {
        let conn = self.conn.lock().unwrap();

        let current =
            Self::get_locked(&conn, id)?.ok_or_else(|| QueueError::NotFound(id.to_string()))?;

        if current.status != JobStatus::Running {
            return Err(QueueError::InvalidState {
                job_id: id.to_string(),
                status: current.status.as_str().to_string(),
                operation: "complete".to_string(),
            });
        }

        let now = Utc::now();
        let result_json =
            serde_json::to_string(&result).map_err(|e| QueueError::Serialization(e.to_string()))?;

        conn.execute(
            "UPDATE jobs SET status = 'completed', result = ?, completed_at = ? WHERE id = ?",
            params![result_json, now.to_rfc3339(), id],
        )
        .map_err(|e| QueueError::Database(e.to_string()))?;

        Ok(Job {
            status: JobStatus::Completed,
            result: Some(result),
            completed_at: Some(now),
            ..current
        })
    }

    fn fail(&self, id: &str, error: &str) -> Result<Job, QueueError> {
        let conn = self.conn.lock().unwrap();

        let current =
            Self::get_locked(&conn, id)?.ok_or_else(|| QueueError::NotFound(id.to_string()))?;

        if current.status != JobStatus::Running {
            return Err(QueueError::InvalidState {
                job_id: id.to_string(),
                status: current.status.as_str().to_string(),
                operation: "fail".to_string(),
            });
        }

        let now = Utc::now();
        let attempts = (current.attempts + 1).min(current.max_attempts);

        if attempts < current.max_attempts {
            // Re-queue with backoff
            let backoff = self.backoff_for(attempts);
            let run_at = now
                + chrono::Duration::from_std(backoff).unwrap_or_else(|_| chrono::Duration::zero());

            conn.execute(
                "UPDATE jobs SET status = 'queued', attempts = ?, run_at = ?, error_message = ? \
                 WHERE id = ?",
                params![attempts, run_at.to_rfc3339(), error, id],
            )
            .map_err(|e| QueueError::Database(e.to_string()))?;

            Ok(Job {
                status: JobStatus::Queued,
                attempts,
                run_at,
                error_message: Some(error.to_string()),
                ..current
            })
        } else {
            // Out of attempts: permanently failed
            conn.execute(
                "UPDATE jobs SET status = 'failed', attempts = ?, error_message = ?, \
                 completed_at = ? WHERE id = ?",
                params![attempts, error, now.to_rfc3339(), id],
            )
            .map_err(|e| QueueError::Database(e.to_string()))?;

            Ok(Job {
                status: JobStatus::Failed,
                attempts,
                error_message: Some(error.to_string()),
                completed_at: Some(now),
                ..current
            })
        }
    }

    fn get(&self, id: &str) -> Result<Option<Job>, QueueError> {
        let conn = self.conn.lock().unwrap();
        Self::get_locked(&conn, id)
    }

    fn count_by_status(&self, status: JobStatus) -> Result<i64, QueueError> {
        let conn = self.conn.lock().unwrap();

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM jobs WHERE status = ?",
                params![status.as_str()],
                |row| row.get(0),
            )
            .map_err(|e| QueueError::Database(e.to_string()))?;

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::SearchTarget;
    use std::sync::Arc;

    fn search_payload(request_id: &str) -> JobPayload {
        JobPayload::SearchMedia {
            request_id: request_id.to_string(),
            target: SearchTarget {
                title: "The Wild Robot".to_string(),
                author: Some("Peter Brown".to_string()),
                external_id: None,
                preferred_format: None,
            },
        }
    }

    fn monitor_payload(request_id: &str) -> JobPayload {
        JobPayload::MonitorDownload {
            request_id: request_id.to_string(),
            client_id: "dl-1".to_string(),
        }
    }

    #[test]
    fn test_enqueue_and_get() {
        let queue = SqliteJobQueue::in_memory().unwrap();
        let job = queue.enqueue(search_payload("r-1"), 3).unwrap();

        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.attempts, 0);
        assert_eq!(job.max_attempts, 3);

        let fetched = queue.get(&job.id).unwrap().unwrap();
        assert_eq!(fetched.job_type, JobType::SearchMedia);
        assert_eq!(fetched.payload, job.payload);
    }

    #[test]
    fn test_claim_transitions_to_running() {
        let queue = SqliteJobQueue::in_memory().unwrap();
        let job = queue.enqueue(search_payload("r-1"), 3).unwrap();

        let claimed = queue.claim_next(None).unwrap().unwrap();
        assert_eq!(claimed.id, job.id);
        assert_eq!(claimed.status, JobStatus::Running);
        assert!(claimed.started_at.is_some());

        // Nothing else to claim
        assert!(queue.claim_next(None).unwrap().is_none());
    }

    #[test]
    fn test_claim_filters_by_type() {
        let queue = SqliteJobQueue::in_memory().unwrap();
        queue.enqueue(search_payload("r-1"), 3).unwrap();
        let monitor = queue.enqueue(monitor_payload("r-1"), 3).unwrap();

        let claimed = queue
            .claim_next(Some(JobType::MonitorDownload))
            .unwrap()
            .unwrap();
        assert_eq!(claimed.id, monitor.id);

        assert!(queue
            .claim_next(Some(JobType::OrganizeFiles))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_claim_is_fifo() {
        let queue = SqliteJobQueue::in_memory().unwrap();
        let first = queue.enqueue(search_payload("r-1"), 3).unwrap();
        let _second = queue.enqueue(search_payload("r-2"), 3).unwrap();

        let claimed = queue.claim_next(None).unwrap().unwrap();
        assert_eq!(claimed.id, first.id);
    }

    #[test]
    fn test_delayed_job_not_claimable_early() {
        let queue = SqliteJobQueue::in_memory().unwrap();
        queue
            .enqueue_after(monitor_payload("r-1"), 3, Duration::from_secs(300))
            .unwrap();

        assert!(queue.claim_next(None).unwrap().is_none());
    }

    #[test]
    fn test_complete_stores_result() {
        let queue = SqliteJobQueue::in_memory().unwrap();
        let job = queue.enqueue(search_payload("r-1"), 3).unwrap();
        queue.claim_next(None).unwrap().unwrap();

        let result = serde_json::json!({"candidates": 5, "selected": "The Wild Robot [M4B]"});
        let completed = queue.complete(&job.id, result.clone()).unwrap();

        assert_eq!(completed.status, JobStatus::Completed);
        assert!(completed.completed_at.is_some());

        let fetched = queue.get(&job.id).unwrap().unwrap();
        assert_eq!(fetched.result, Some(result));
    }

    #[test]
    fn test_complete_requires_running() {
        let queue = SqliteJobQueue::in_memory().unwrap();
        let job = queue.enqueue(search_payload("r-1"), 3).unwrap();

        let result = queue.complete(&job.id, serde_json::json!({}));
        assert!(matches!(result, Err(QueueError::InvalidState { .. })));
    }

    #[test]
    fn test_fail_requeues_with_backoff() {
        let queue = SqliteJobQueue::in_memory()
            .unwrap()
            .with_retry_backoff(Duration::from_secs(60));
        let job = queue.enqueue(search_payload("r-1"), 3).unwrap();
        queue.claim_next(None).unwrap().unwrap();

        let failed = queue.fail(&job.id, "indexer timeout").unwrap();
        assert_eq!(failed.status, JobStatus::Queued);
        assert_eq!(failed.attempts, 1);
        assert!(failed.run_at > Utc::now());
        assert_eq!(failed.error_message, Some("indexer timeout".to_string()));

        // Backoff means it is not immediately claimable
        assert!(queue.claim_next(None).unwrap().is_none());
    }

    #[test]
    fn test_backoff_grows_with_attempts() {
        let queue = SqliteJobQueue::in_memory()
            .unwrap()
            .with_retry_backoff(Duration::from_secs(30));
        assert_eq!(queue.backoff_for(1), Duration::from_secs(30));
        assert_eq!(queue.backoff_for(2), Duration::from_secs(60));
        assert_eq!(queue.backoff_for(3), Duration::from_secs(120));
        // Capped
        assert_eq!(queue.backoff_for(20), MAX_BACKOFF);
    }

    #[test]
    fn test_fail_at_max_attempts_is_permanent() {
        let queue = SqliteJobQueue::in_memory()
            .unwrap()
            .with_retry_backoff(Duration::from_millis(0));
        let job = queue.enqueue(search_payload("r-1"), 2).unwrap();

        queue.claim_next(None).unwrap().unwrap();
        let after_first = queue.fail(&job.id, "error 1").unwrap();
        assert_eq!(after_first.status, JobStatus::Queued);
        assert_eq!(after_first.attempts, 1);

        queue.claim_next(None).unwrap().unwrap();
        let after_second = queue.fail(&job.id, "error 2").unwrap();
        assert_eq!(after_second.status, JobStatus::Failed);
        assert_eq!(after_second.attempts, 2);
        assert!(after_second.is_terminal());

        // Never re-queued automatically
        assert!(queue.claim_next(None).unwrap().is_none());

        let fetched = queue.get(&job.id).unwrap().unwrap();
        assert_eq!(fetched.status, JobStatus::Failed);
        assert_eq!(fetched.error_message, Some("error 2".to_string()));
        assert!(fetched.attempts <= fetched.max_attempts);
    }

    #[test]
    fn test_concurrent_claims_are_exclusive() {
        let queue = Arc::new(SqliteJobQueue::in_memory().unwrap());
        queue.enqueue(search_payload("r-1"), 3).unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let queue = Arc::clone(&queue);
            handles.push(std::thread::spawn(move || {
                queue.claim_next(None).unwrap().is_some()
            }));
        }

        let successes = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|claimed| *claimed)
            .count();
        assert_eq!(successes, 1, "exactly one claimer may win");
    }

    #[test]
    fn test_count_by_status() {
        let queue = SqliteJobQueue::in_memory().unwrap();
        queue.enqueue(search_payload("r-1"), 3).unwrap();
        queue.enqueue(search_payload("r-2"), 3).unwrap();
        queue.claim_next(None).unwrap().unwrap();

        assert_eq!(queue.count_by_status(JobStatus::Queued).unwrap(), 1);
        assert_eq!(queue.count_by_status(JobStatus::Running).unwrap(), 1);
        assert_eq!(queue.count_by_status(JobStatus::Completed).unwrap(), 0);
    }

    #[test]
    fn test_jobs_are_retained_after_completion() {
        let queue = SqliteJobQueue::in_memory().unwrap();
        let job = queue.enqueue(search_payload("r-1"), 3).unwrap();
        queue.claim_next(None).unwrap().unwrap();
        queue.complete(&job.id, serde_json::json!({})).unwrap();

        // Completed jobs stay readable for audit
        let fetched = queue.get(&job.id).unwrap().unwrap();
        assert_eq!(fetched.status, JobStatus::Completed);
    }
}
