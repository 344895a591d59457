//! SQLite-backed event store implementation.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use super::{EventError, EventLevel, EventRecord, EventStore, PipelineEvent};

/// SQLite-backed event store.
pub struct SqliteEventStore {
    conn: Mutex<Connection>,
}

impl SqliteEventStore {
    /// Create a new SQLite event store, creating the database file and
    /// tables if needed.
    pub fn new(path: &Path) -> Result<Self, EventError> {
        let conn = Connection::open(path).map_err(|e| EventError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory SQLite event store (useful for testing).
    pub fn in_memory() -> Result<Self, EventError> {
        let conn = Connection::open_in_memory().map_err(|e| EventError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), EventError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS job_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                level TEXT NOT NULL,
                event_type TEXT NOT NULL,
                request_id TEXT,
                data TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_events_request ON job_events(request_id);
            CREATE INDEX IF NOT EXISTS idx_events_type ON job_events(event_type);
            "#,
        )
        .map_err(|e| EventError::Database(e.to_string()))?;

        Ok(())
    }

    fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<EventRecord> {
        let timestamp: String = row.get(1)?;
        let level: String = row.get(2)?;
        let data_json: String = row.get(5)?;

        let data: PipelineEvent = serde_json::from_str(&data_json).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
        })?;

        Ok(EventRecord {
            id: row.get(0)?,
            timestamp: DateTime::parse_from_rfc3339(&timestamp)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
            level: match level.as_str() {
                "debug" => EventLevel::Debug,
                "warning" => EventLevel::Warning,
                "error" => EventLevel::Error,
                _ => EventLevel::Info,
            },
            event_type: row.get(3)?,
            request_id: row.get(4)?,
            data,
        })
    }
}

impl EventStore for SqliteEventStore {
    fn insert(&self, record: &EventRecord) -> Result<i64, EventError> {
        let conn = self.conn.lock().unwrap();

        let data_json = serde_json::to_string(&record.data)
            .map_err(|e| EventError::Serialization(e.to_string()))?;

        conn.execute(
            "INSERT INTO job_events (timestamp, level, event_type, request_id, data) \
             VALUES (?, ?, ?, ?, ?)",
            params![
                record.timestamp.to_rfc3339(),
                record.level.as_str(),
                record.event_type,
                record.request_id,
                data_json,
            ],
        )
        .map_err(|e| EventError::Database(e.to_string()))?;

        Ok(conn.last_insert_rowid())
    }

    fn recent(&self, limit: i64) -> Result<Vec<EventRecord>, EventError> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn
            .prepare(
                "SELECT id, timestamp, level, event_type, request_id, data FROM job_events \
                 ORDER BY id DESC LIMIT ?",
            )
            .map_err(|e| EventError::Database(e.to_string()))?;

        let rows = stmt
            .query_map(params![limit], Self::row_to_record)
            .map_err(|e| EventError::Database(e.to_string()))?;

        let mut records = Vec::new();
        for row_result in rows {
            records.push(row_result.map_err(|e| EventError::Database(e.to_string()))?);
        }

        Ok(records)
    }
}
