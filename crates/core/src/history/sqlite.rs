//! SQLite-backed history store implementation.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use super::{CreateHistoryRecord, HistoryError, HistoryRecord, HistoryStore};

/// SQLite-backed history store.
pub struct SqliteHistoryStore {
    conn: Mutex<Connection>,
}

impl SqliteHistoryStore {
    /// Create a new SQLite history store, creating the database file and
    /// tables if needed.
    pub fn new(path: &Path) -> Result<Self, HistoryError> {
        let conn = Connection::open(path).map_err(|e| HistoryError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory SQLite history store (useful for testing).
    pub fn in_memory() -> Result<Self, HistoryError> {
        let conn =
            Connection::open_in_memory().map_err(|e| HistoryError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), HistoryError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS download_history (
                id TEXT PRIMARY KEY,
                request_id TEXT NOT NULL,
                source TEXT NOT NULL,
                candidate_title TEXT NOT NULL,
                size_bytes INTEGER NOT NULL,
                quality_score REAL NOT NULL,
                selected INTEGER NOT NULL,
                client_id TEXT,
                download_status TEXT,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_history_request ON download_history(request_id);
            "#,
        )
        .map_err(|e| HistoryError::Database(e.to_string()))?;

        Ok(())
    }

    fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<HistoryRecord> {
        let size_bytes: i64 = row.get(4)?;
        let quality_score: f64 = row.get(5)?;
        let created_at: String = row.get(9)?;

        Ok(HistoryRecord {
            id: row.get(0)?,
            request_id: row.get(1)?,
            source: row.get(2)?,
            candidate_title: row.get(3)?,
            size_bytes: size_bytes.max(0) as u64,
            quality_score: quality_score as f32,
            selected: row.get(6)?,
            client_id: row.get(7)?,
            download_status: row.get(8)?,
            created_at: DateTime::parse_from_rfc3339(&created_at)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
        })
    }
}

impl HistoryStore for SqliteHistoryStore {
    fn create(&self, record: CreateHistoryRecord) -> Result<HistoryRecord, HistoryError> {
        let conn = self.conn.lock().unwrap();

        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();

        conn.execute(
            "INSERT INTO download_history (id, request_id, source, candidate_title, size_bytes, \
             quality_score, selected, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                id,
                record.request_id,
                record.source,
                record.candidate_title,
                record.size_bytes as i64,
                record.quality_score as f64,
                record.selected,
                now.to_rfc3339(),
            ],
        )
        .map_err(|e| HistoryError::Database(e.to_string()))?;

        Ok(HistoryRecord {
            id,
            request_id: record.request_id,
            source: record.source,
            candidate_title: record.candidate_title,
            size_bytes: record.size_bytes,
            quality_score: record.quality_score,
            selected: record.selected,
            client_id: None,
            download_status: None,
            created_at: now,
        })
    }

    fn get(&self, id: &str) -> Result<Option<HistoryRecord>, HistoryError> {
        let conn = self.conn.lock().unwrap();

        let result = conn.query_row(
            "SELECT id, request_id, source, candidate_title, size_bytes, quality_score, \
             selected, client_id, download_status, created_at FROM download_history WHERE id = ?",
            params![id],
            Self::row_to_record,
        );

        match result {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(HistoryError::Database(e.to_string())),
        }
    }

    fn list_for_request(&self, request_id: &str) -> Result<Vec<HistoryRecord>, HistoryError> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn
            .prepare(
                "SELECT id, request_id, source, candidate_title, size_bytes, quality_score, \
                 selected, client_id, download_status, created_at FROM download_history \
                 WHERE request_id = ? ORDER BY created_at DESC",
            )
            .map_err(|e| HistoryError::Database(e.to_string()))?;

        let rows = stmt
            .query_map(params![request_id], Self::row_to_record)
            .map_err(|e| HistoryError::Database(e.to_string()))?;

        let mut records = Vec::new();
        for row_result in rows {
            records.push(row_result.map_err(|e| HistoryError::Database(e.to_string()))?);
        }

        Ok(records)
    }

    fn set_client_id(&self, id: &str, client_id: &str) -> Result<(), HistoryError> {
        let conn = self.conn.lock().unwrap();

        let changed = conn
            .execute(
                "UPDATE download_history SET client_id = ? WHERE id = ?",
                params![client_id, id],
            )
            .map_err(|e| HistoryError::Database(e.to_string()))?;

        if changed == 0 {
            return Err(HistoryError::NotFound(id.to_string()));
        }

        Ok(())
    }

    fn set_download_status(&self, id: &str, status: &str) -> Result<(), HistoryError> {
        let conn = self.conn.lock().unwrap();

        let changed = conn
            .execute(
                "UPDATE download_history SET download_status = ? WHERE id = ?",
                params![status, id],
            )
            .map_err(|e| HistoryError::Database(e.to_string()))?;

        if changed == 0 {
            return Err(HistoryError::NotFound(id.to_string()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_record() -> CreateHistoryRecord {
        CreateHistoryRecord {
            request_id: "r-1".to_string(),
            source: "audiobay".to_string(),
            candidate_title: "The Wild Robot on the Island [M4B]".to_string(),
            size_bytes: 450_000_000,
            quality_score: 82.5,
            selected: true,
        }
    }

    #[test]
    fn test_create_and_get() {
        let store = SqliteHistoryStore::in_memory().unwrap();
        let created = store.create(test_record()).unwrap();

        let fetched = store.get(&created.id).unwrap().unwrap();
        assert_eq!(fetched.request_id, "r-1");
        assert_eq!(fetched.size_bytes, 450_000_000);
        assert!((fetched.quality_score - 82.5).abs() < 0.001);
        assert!(fetched.selected);
        assert!(fetched.client_id.is_none());
    }

    #[test]
    fn test_get_missing() {
        let store = SqliteHistoryStore::in_memory().unwrap();
        assert!(store.get("missing").unwrap().is_none());
    }

    #[test]
    fn test_list_for_request() {
        let store = SqliteHistoryStore::in_memory().unwrap();
        store.create(test_record()).unwrap();

        let mut other = test_record();
        other.request_id = "r-2".to_string();
        store.create(other).unwrap();

        let records = store.list_for_request("r-1").unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].request_id, "r-1");
    }

    #[test]
    fn test_set_client_id_and_status() {
        let store = SqliteHistoryStore::in_memory().unwrap();
        let record = store.create(test_record()).unwrap();

        store.set_client_id(&record.id, "dl-42").unwrap();
        store.set_download_status(&record.id, "active").unwrap();

        let fetched = store.get(&record.id).unwrap().unwrap();
        assert_eq!(fetched.client_id, Some("dl-42".to_string()));
        assert_eq!(fetched.download_status, Some("active".to_string()));
    }

    #[test]
    fn test_update_missing_record_errors() {
        let store = SqliteHistoryStore::in_memory().unwrap();
        assert!(matches!(
            store.set_client_id("missing", "dl-1"),
            Err(HistoryError::NotFound(_))
        ));
    }
}
