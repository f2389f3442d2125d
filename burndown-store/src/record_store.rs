//! `SqliteRecordStore` — the single owner of the report database
//! connection. No code outside this module touches a raw `Connection`.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection};
use tracing::debug;

use burndown_core::errors::StoreError;
use burndown_core::traits::store::{RecordReader, RecordStore, RecordWriter};
use burndown_core::types::collections::FxHashMap;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS reports (
    path        TEXT PRIMARY KEY,
    meta        TEXT NOT NULL,
    created_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
);
CREATE TABLE IF NOT EXISTS records (
    path     TEXT NOT NULL,
    kind     TEXT NOT NULL,
    seq      INTEGER NOT NULL,
    payload  BLOB NOT NULL,
    PRIMARY KEY (path, seq)
);
CREATE INDEX IF NOT EXISTS idx_records_path_kind ON records (path, kind, seq);
";

/// SQLite-backed keyed record store.
pub struct SqliteRecordStore {
    conn: Mutex<Connection>,
}

impl SqliteRecordStore {
    /// Open (or create) a file-backed store and apply the schema.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(sqe)?;
        Self::with_connection(conn)
    }

    /// In-memory store, for tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(sqe)?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA).map_err(sqe)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Io {
            message: "record store lock poisoned".to_string(),
        })?;
        f(&conn)
    }
}

impl RecordStore for SqliteRecordStore {
    fn begin(
        &self,
        path: &str,
        meta: &FxHashMap<String, String>,
    ) -> Result<Box<dyn RecordWriter + '_>, StoreError> {
        let meta_json = serde_json::to_string(meta).map_err(|e| StoreError::Io {
            message: format!("encode report meta: {e}"),
        })?;
        self.with_conn(|conn| {
            conn.execute("DELETE FROM records WHERE path = ?1", params![path])
                .map_err(sqe)?;
            conn.execute(
                "INSERT INTO reports (path, meta) VALUES (?1, ?2)
                 ON CONFLICT(path) DO UPDATE SET meta = excluded.meta",
                params![path, meta_json],
            )
            .map_err(sqe)?;
            Ok(())
        })?;
        debug!(path, "report started");
        Ok(Box::new(SqliteRecordWriter {
            store: self,
            path: path.to_string(),
            seq: 0,
        }))
    }

    fn open(&self, path: &str) -> Result<Box<dyn RecordReader + '_>, StoreError> {
        let exists = self.with_conn(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM reports WHERE path = ?1",
                params![path],
                |row| row.get::<_, i64>(0),
            )
            .map_err(sqe)
        })?;
        if exists == 0 {
            return Err(StoreError::NotFound {
                path: path.to_string(),
            });
        }
        Ok(Box::new(SqliteRecordReader {
            store: self,
            path: path.to_string(),
        }))
    }
}

struct SqliteRecordWriter<'a> {
    store: &'a SqliteRecordStore,
    path: String,
    seq: i64,
}

impl RecordWriter for SqliteRecordWriter<'_> {
    fn write(&mut self, kind: &str, payload: &[u8]) -> Result<(), StoreError> {
        self.store.with_conn(|conn| {
            conn.execute(
                "INSERT INTO records (path, kind, seq, payload) VALUES (?1, ?2, ?3, ?4)",
                params![self.path, kind, self.seq, payload],
            )
            .map_err(sqe)?;
            Ok(())
        })?;
        self.seq += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), StoreError> {
        debug!(path = %self.path, records = self.seq, "report finished");
        Ok(())
    }
}

struct SqliteRecordReader<'a> {
    store: &'a SqliteRecordStore,
    path: String,
}

impl RecordReader for SqliteRecordReader<'_> {
    fn kinds(&self) -> Result<Vec<String>, StoreError> {
        self.store.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT kind, MIN(seq) AS first FROM records
                     WHERE path = ?1 GROUP BY kind ORDER BY first",
                )
                .map_err(sqe)?;
            let rows = stmt
                .query_map(params![self.path], |row| row.get::<_, String>(0))
                .map_err(sqe)?;
            rows.collect::<Result<Vec<_>, _>>().map_err(sqe)
        })
    }

    fn for_each(&self, kind: &str, f: &mut dyn FnMut(&[u8])) -> Result<(), StoreError> {
        self.store.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT payload FROM records
                     WHERE path = ?1 AND kind = ?2 ORDER BY seq",
                )
                .map_err(sqe)?;
            let rows = stmt
                .query_map(params![self.path, kind], |row| row.get::<_, Vec<u8>>(0))
                .map_err(sqe)?;
            for payload in rows {
                f(&payload.map_err(sqe)?);
            }
            Ok(())
        })
    }
}

fn sqe(e: impl std::fmt::Display) -> StoreError {
    StoreError::SqliteError {
        message: e.to_string(),
    }
}
