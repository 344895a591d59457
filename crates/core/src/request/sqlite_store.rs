//! SQLite-backed request store implementation.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use super::{
    AcquisitionRequest, CreateRequest, RequestError, RequestFilter, RequestKind, RequestStatus,
    RequestStore,
};

/// SQLite-backed request store.
pub struct SqliteRequestStore {
    conn: Mutex<Connection>,
}

impl SqliteRequestStore {
    /// Create a new SQLite request store, creating the database file and
    /// tables if needed.
    pub fn new(path: &Path) -> Result<Self, RequestError> {
        let conn = Connection::open(path).map_err(|e| RequestError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory SQLite request store (useful for testing).
    pub fn in_memory() -> Result<Self, RequestError> {
        let conn =
            Connection::open_in_memory().map_err(|e| RequestError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), RequestError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS requests (
                id TEXT PRIMARY KEY,
                kind TEXT NOT NULL,
                parent_request_id TEXT,
                sidecar_source TEXT,
                title TEXT NOT NULL,
                author TEXT,
                external_id TEXT,
                preferred_format TEXT,
                duration_minutes INTEGER,
                status TEXT NOT NULL,
                progress REAL NOT NULL DEFAULT 0,
                search_attempts INTEGER NOT NULL DEFAULT 0,
                last_search_at TEXT,
                error_message TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                deleted_at TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_requests_status ON requests(status);
            CREATE INDEX IF NOT EXISTS idx_requests_parent ON requests(parent_request_id);
            "#,
        )
        .map_err(|e| RequestError::Database(e.to_string()))?;

        Ok(())
    }

    const COLUMNS: &'static str = "id, kind, parent_request_id, sidecar_source, title, author, \
         external_id, preferred_format, duration_minutes, status, progress, search_attempts, \
         last_search_at, error_message, created_at, updated_at, deleted_at";

    fn row_to_request(row: &rusqlite::Row) -> rusqlite::Result<AcquisitionRequest> {
        let kind_str: String = row.get(1)?;
        let status_str: String = row.get(9)?;
        let progress: f64 = row.get(10)?;
        let last_search_at: Option<String> = row.get(12)?;
        let created_at: String = row.get(14)?;
        let updated_at: String = row.get(15)?;
        let deleted_at: Option<String> = row.get(16)?;

        Ok(AcquisitionRequest {
            id: row.get(0)?,
            kind: RequestKind::parse(&kind_str).unwrap_or(RequestKind::Primary),
            parent_request_id: row.get(2)?,
            sidecar_source: row.get(3)?,
            title: row.get(4)?,
            author: row.get(5)?,
            external_id: row.get(6)?,
            preferred_format: row.get(7)?,
            duration_minutes: row.get(8)?,
            status: RequestStatus::parse(&status_str).unwrap_or(RequestStatus::Pending),
            progress: progress as f32,
            search_attempts: row.get(11)?,
            last_search_at: last_search_at.and_then(|s| parse_timestamp(&s)),
            error_message: row.get(13)?,
            created_at: parse_timestamp(&created_at).unwrap_or_else(Utc::now),
            updated_at: parse_timestamp(&updated_at).unwrap_or_else(Utc::now),
            deleted_at: deleted_at.and_then(|s| parse_timestamp(&s)),
        })
    }

    fn get_locked(
        conn: &Connection,
        id: &str,
    ) -> Result<Option<AcquisitionRequest>, RequestError> {
        let sql = format!("SELECT {} FROM requests WHERE id = ?", Self::COLUMNS);
        let result = conn.query_row(&sql, params![id], Self::row_to_request);

        match result {
            Ok(request) => Ok(Some(request)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(RequestError::Database(e.to_string())),
        }
    }

    fn build_where_clause(filter: &RequestFilter) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(status) = filter.status {
            conditions.push("status = ?".to_string());
            params.push(Box::new(status.as_str().to_string()));
        }

        if let Some(kind) = filter.kind {
            conditions.push("kind = ?".to_string());
            params.push(Box::new(kind.as_str().to_string()));
        }

        if let Some(cutoff) = filter.last_search_before {
            conditions.push("(last_search_at IS NULL OR last_search_at < ?)".to_string());
            params.push(Box::new(cutoff.to_rfc3339()));
        }

        if !filter.include_deleted {
            conditions.push("deleted_at IS NULL".to_string());
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        (where_clause, params)
    }
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

impl RequestStore for SqliteRequestStore {
    fn create(&self, request: CreateRequest) -> Result<AcquisitionRequest, RequestError> {
        let conn = self.conn.lock().unwrap();

        // A sidecar's parent must exist and be completed before the sidecar
        // is created
        if request.kind == RequestKind::Sidecar {
            let parent_id = request.parent_request_id.as_deref().ok_or_else(|| {
                RequestError::InvalidParent("sidecar request without parent_request_id".to_string())
            })?;
            let parent = Self::get_locked(&conn, parent_id)?
                .ok_or_else(|| RequestError::InvalidParent(format!("{} not found", parent_id)))?;
            if parent.is_deleted() {
                return Err(RequestError::InvalidParent(format!(
                    "{} was deleted",
                    parent_id
                )));
            }
            if !parent.status.is_completed() {
                return Err(RequestError::InvalidParent(format!(
                    "{} is {} rather than completed",
                    parent_id, parent.status
                )));
            }
        }

        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();

        conn.execute(
            "INSERT INTO requests (id, kind, parent_request_id, sidecar_source, title, author, \
             external_id, preferred_format, duration_minutes, status, progress, search_attempts, \
             created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, 0, ?, ?)",
            params![
                id,
                request.kind.as_str(),
                request.parent_request_id,
                request.sidecar_source,
                request.title,
                request.author,
                request.external_id,
                request.preferred_format,
                request.duration_minutes,
                RequestStatus::Pending.as_str(),
                now.to_rfc3339(),
                now.to_rfc3339(),
            ],
        )
        .map_err(|e| RequestError::Database(e.to_string()))?;

        Ok(AcquisitionRequest {
            id,
            kind: request.kind,
            parent_request_id: request.parent_request_id,
            sidecar_source: request.sidecar_source,
            title: request.title,
            author: request.author,
            external_id: request.external_id,
            preferred_format: request.preferred_format,
            duration_minutes: request.duration_minutes,
            status: RequestStatus::Pending,
            progress: 0.0,
            search_attempts: 0,
            last_search_at: None,
            error_message: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        })
    }

    fn get(&self, id: &str) -> Result<Option<AcquisitionRequest>, RequestError> {
        let conn = self.conn.lock().unwrap();
        Self::get_locked(&conn, id)
    }

    fn list(&self, filter: &RequestFilter) -> Result<Vec<AcquisitionRequest>, RequestError> {
        let conn = self.conn.lock().unwrap();

        let (where_clause, params) = Self::build_where_clause(filter);

        let sql = format!(
            "SELECT {} FROM requests {} ORDER BY created_at ASC LIMIT ? OFFSET ?",
            Self::COLUMNS,
            where_clause
        );

        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| RequestError::Database(e.to_string()))?;

        let mut all_params: Vec<Box<dyn rusqlite::ToSql>> = params;
        all_params.push(Box::new(filter.limit));
        all_params.push(Box::new(filter.offset));

        let param_refs: Vec<&dyn rusqlite::ToSql> = all_params.iter().map(|p| p.as_ref()).collect();

        let rows = stmt
            .query_map(param_refs.as_slice(), Self::row_to_request)
            .map_err(|e| RequestError::Database(e.to_string()))?;

        let mut requests = Vec::new();
        for row_result in rows {
            let request = row_result.map_err(|e| RequestError::Database(e.to_string()))?;
            requests.push(request);
        }

        Ok(requests)
    }

    fn count(&self, filter: &RequestFilter) -> Result<i64, RequestError> {
        let conn = self.conn.lock().unwrap();

        let (where_clause, params) = Self::build_where_clause(filter);

        let sql = format!("SELECT COUNT(*) FROM requests {}", where_clause);

        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let count: i64 = conn
            .query_row(&sql, param_refs.as_slice(), |row| row.get(0))
            .map_err(|e| RequestError::Database(e.to_string()))?;

        Ok(count)
    }

    fn update_status(
        &self,
        id: &str,
        status: RequestStatus,
        error_message: Option<String>,
    ) -> Result<AcquisitionRequest, RequestError> {
        let conn = self.conn.lock().unwrap();

        let current = Self::get_locked(&conn, id)?
            .ok_or_else(|| RequestError::NotFound(id.to_string()))?;

        if current.is_deleted() {
            return Err(RequestError::Deleted(id.to_string()));
        }

        if !current.status.can_transition(status) {
            return Err(RequestError::InvalidTransition {
                request_id: id.to_string(),
                from: current.status,
                to: status,
            });
        }

        let now = Utc::now();

        // Entering searching counts as a search attempt
        let (search_attempts, last_search_at) = if status == RequestStatus::Searching {
            (current.search_attempts + 1, Some(now))
        } else {
            (current.search_attempts, current.last_search_at)
        };

        conn.execute(
            "UPDATE requests SET status = ?, error_message = ?, search_attempts = ?, \
             last_search_at = ?, updated_at = ? WHERE id = ?",
            params![
                status.as_str(),
                error_message,
                search_attempts,
                last_search_at.map(|t| t.to_rfc3339()),
                now.to_rfc3339(),
                id,
            ],
        )
        .map_err(|e| RequestError::Database(e.to_string()))?;

        Ok(AcquisitionRequest {
            status,
            error_message,
            search_attempts,
            last_search_at,
            updated_at: now,
            ..current
        })
    }

    fn set_progress(&self, id: &str, progress: f32) -> Result<(), RequestError> {
        let conn = self.conn.lock().unwrap();

        let changed = conn
            .execute(
                "UPDATE requests SET progress = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL",
                params![
                    progress.clamp(0.0, 100.0) as f64,
                    Utc::now().to_rfc3339(),
                    id
                ],
            )
            .map_err(|e| RequestError::Database(e.to_string()))?;

        if changed == 0 {
            return Err(RequestError::NotFound(id.to_string()));
        }

        Ok(())
    }

    fn find_sidecar(
        &self,
        parent_id: &str,
        source: &str,
    ) -> Result<Option<AcquisitionRequest>, RequestError> {
        let conn = self.conn.lock().unwrap();

        let sql = format!(
            "SELECT {} FROM requests WHERE parent_request_id = ? AND sidecar_source = ? \
             AND deleted_at IS NULL LIMIT 1",
            Self::COLUMNS
        );

        let result = conn.query_row(&sql, params![parent_id, source], Self::row_to_request);

        match result {
            Ok(request) => Ok(Some(request)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(RequestError::Database(e.to_string())),
        }
    }

    fn reset_for_retry(&self, id: &str) -> Result<AcquisitionRequest, RequestError> {
        let conn = self.conn.lock().unwrap();

        let current = Self::get_locked(&conn, id)?
            .ok_or_else(|| RequestError::NotFound(id.to_string()))?;

        if current.is_deleted() {
            return Err(RequestError::Deleted(id.to_string()));
        }

        // failed requests can always be reset; awaiting-search resets are a
        // sidecar re-trigger affordance
        let allowed = current.status == RequestStatus::Failed
            || (current.status == RequestStatus::AwaitingSearch
                && current.kind == RequestKind::Sidecar);
        if !allowed {
            return Err(RequestError::InvalidTransition {
                request_id: id.to_string(),
                from: current.status,
                to: RequestStatus::Pending,
            });
        }

        let now = Utc::now();
        conn.execute(
            "UPDATE requests SET status = ?, progress = 0, error_message = NULL, updated_at = ? \
             WHERE id = ?",
            params![RequestStatus::Pending.as_str(), now.to_rfc3339(), id],
        )
        .map_err(|e| RequestError::Database(e.to_string()))?;

        Ok(AcquisitionRequest {
            status: RequestStatus::Pending,
            progress: 0.0,
            error_message: None,
            updated_at: now,
            ..current
        })
    }

    fn soft_delete(&self, id: &str) -> Result<AcquisitionRequest, RequestError> {
        let conn = self.conn.lock().unwrap();

        let current = Self::get_locked(&conn, id)?
            .ok_or_else(|| RequestError::NotFound(id.to_string()))?;

        if current.is_deleted() {
            return Ok(current);
        }

        let now = Utc::now();
        conn.execute(
            "UPDATE requests SET deleted_at = ?, updated_at = ? WHERE id = ?",
            params![now.to_rfc3339(), now.to_rfc3339(), id],
        )
        .map_err(|e| RequestError::Database(e.to_string()))?;

        Ok(AcquisitionRequest {
            deleted_at: Some(now),
            updated_at: now,
            ..current
        })
    }
}
