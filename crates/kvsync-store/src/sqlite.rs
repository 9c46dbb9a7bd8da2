//! SQLite persistence backend using rusqlite.
//!
//! This is the primary durable backend for desktop and edge applications.
//! Uses WAL mode by default so several processes can read while one writes.
//!
//! # Example
//!
//! ```no_run
//! use kvsync_store::{Backend, SqliteBackend};
//!
//! # async fn run() -> Result<(), kvsync_store::BackendError> {
//! let backend = SqliteBackend::open("my_app.db")?;
//! backend.write_one("prefs", "theme", b"\"dark\"".to_vec()).await?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use crate::traits::{Backend, BackendError};

/// SQLite configuration options.
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    /// SQLite journal mode. Defaults to WAL.
    pub journal_mode: JournalMode,
    /// Busy timeout in milliseconds. Defaults to 5000.
    pub busy_timeout_ms: u32,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            journal_mode: JournalMode::Wal,
            busy_timeout_ms: 5000,
        }
    }
}

/// SQLite journal mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JournalMode {
    /// Write-Ahead Logging. Allows concurrent reads during writes.
    Wal,
    /// Traditional rollback journal.
    Delete,
    /// In-memory journal (fastest, no crash recovery).
    Memory,
}

impl JournalMode {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Wal => "WAL",
            Self::Delete => "DELETE",
            Self::Memory => "MEMORY",
        }
    }
}

impl From<rusqlite::Error> for BackendError {
    fn from(e: rusqlite::Error) -> Self {
        Self::io(e)
    }
}

/// SQLite persistence backend.
///
/// Wraps a `rusqlite::Connection` behind a `Mutex`. Every call runs on the
/// blocking thread pool so the async caller is never stalled. Clones share
/// the connection. Creates the schema automatically on first open.
#[derive(Clone)]
pub struct SqliteBackend {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteBackend {
    /// Open (or create) a SQLite database at the given path with default config.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, BackendError> {
        Self::open_with_config(path, SqliteConfig::default())
    }

    /// Open with custom configuration.
    pub fn open_with_config<P: AsRef<Path>>(
        path: P,
        config: SqliteConfig,
    ) -> Result<Self, BackendError> {
        let conn = Connection::open(path.as_ref())
            .map_err(|e| BackendError::Unavailable(e.to_string()))?;
        Self::from_connection(conn, &config)
    }

    /// Open an in-memory database (useful for testing).
    pub fn open_in_memory() -> Result<Self, BackendError> {
        let conn =
            Connection::open_in_memory().map_err(|e| BackendError::Unavailable(e.to_string()))?;
        Self::from_connection(conn, &SqliteConfig::default())
    }

    fn from_connection(conn: Connection, config: &SqliteConfig) -> Result<Self, BackendError> {
        conn.execute_batch(&format!(
            "PRAGMA journal_mode = {};
             PRAGMA busy_timeout = {};
             PRAGMA synchronous = NORMAL;

             CREATE TABLE IF NOT EXISTS kv_records (
                store       TEXT NOT NULL,
                key         TEXT NOT NULL,
                data        BLOB NOT NULL,
                updated_at  INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (store, key)
             );",
            config.journal_mode.as_str(),
            config.busy_timeout_ms,
        ))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn now_ms() -> i64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as i64
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T, BackendError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, BackendError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|_| BackendError::Io("sqlite lock poisoned".into()))?;
            f(&conn)
        })
        .await
        .map_err(BackendError::io)?
    }

    /// List every store name that has at least one record.
    pub async fn list_stores(&self) -> Result<Vec<String>, BackendError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT DISTINCT store FROM kv_records ORDER BY store")?;
            let names = stmt
                .query_map([], |row| row.get(0))?
                .collect::<Result<Vec<String>, _>>()?;
            Ok(names)
        })
        .await
    }

    /// Number of records in `store`.
    pub async fn count(&self, store: &str) -> Result<u64, BackendError> {
        let store = store.to_string();
        self.with_conn(move |conn| {
            let n: i64 = conn.query_row(
                "SELECT COUNT(*) FROM kv_records WHERE store = ?1",
                params![store],
                |row| row.get(0),
            )?;
            Ok(n as u64)
        })
        .await
    }
}

#[async_trait]
impl Backend for SqliteBackend {
    async fn attach(&self, store: &str) -> Result<(), BackendError> {
        debug!(store, "attaching sqlite backend");
        self.with_conn(|conn| {
            conn.query_row("SELECT 1", [], |_| Ok(()))
                .map_err(|e| BackendError::Unavailable(e.to_string()))
        })
        .await
    }

    async fn load_all(&self, store: &str) -> Result<Vec<(String, Vec<u8>)>, BackendError> {
        let store = store.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT key, data FROM kv_records WHERE store = ?1 ORDER BY key",
            )?;
            let rows = stmt
                .query_map(params![store], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<Result<Vec<(String, Vec<u8>)>, _>>()?;
            Ok(rows)
        })
        .await
    }

    async fn load_one(&self, store: &str, key: &str) -> Result<Option<Vec<u8>>, BackendError> {
        let (store, key) = (store.to_string(), key.to_string());
        self.with_conn(move |conn| {
            let data = conn
                .query_row(
                    "SELECT data FROM kv_records WHERE store = ?1 AND key = ?2",
                    params![store, key],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(data)
        })
        .await
    }

    async fn write_one(&self, store: &str, key: &str, value: Vec<u8>) -> Result<(), BackendError> {
        let (store, key) = (store.to_string(), key.to_string());
        let now = Self::now_ms();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO kv_records (store, key, data, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(store, key) DO UPDATE SET
                    data = excluded.data,
                    updated_at = excluded.updated_at",
                params![store, key, value, now],
            )?;
            Ok(())
        })
        .await
    }

    async fn delete_one(&self, store: &str, key: &str) -> Result<(), BackendError> {
        let (store, key) = (store.to_string(), key.to_string());
        self.with_conn(move |conn| {
            conn.execute(
                "DELETE FROM kv_records WHERE store = ?1 AND key = ?2",
                params![store, key],
            )?;
            Ok(())
        })
        .await
    }

    async fn clear_all(&self, store: &str) -> Result<(), BackendError> {
        let store = store.to_string();
        self.with_conn(move |conn| {
            conn.execute("DELETE FROM kv_records WHERE store = ?1", params![store])?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_backend() -> SqliteBackend {
        SqliteBackend::open_in_memory().unwrap()
    }

    #[tokio::test]
    async fn write_load_delete() {
        let backend = test_backend();

        backend.write_one("s", "k1", b"hello".to_vec()).await.unwrap();
        assert_eq!(
            backend.load_one("s", "k1").await.unwrap(),
            Some(b"hello".to_vec())
        );

        backend.write_one("s", "k1", b"world".to_vec()).await.unwrap();
        assert_eq!(
            backend.load_one("s", "k1").await.unwrap(),
            Some(b"world".to_vec())
        );

        backend.delete_one("s", "k1").await.unwrap();
        assert_eq!(backend.load_one("s", "k1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn store_isolation_and_clear() {
        let backend = test_backend();
        backend.write_one("a", "k", b"alpha".to_vec()).await.unwrap();
        backend.write_one("b", "k", b"beta".to_vec()).await.unwrap();
        backend.write_one("b", "j", b"gamma".to_vec()).await.unwrap();

        assert_eq!(backend.list_stores().await.unwrap(), vec!["a", "b"]);
        assert_eq!(backend.count("b").await.unwrap(), 2);

        backend.clear_all("b").await.unwrap();
        assert!(backend.load_all("b").await.unwrap().is_empty());
        assert_eq!(
            backend.load_all("a").await.unwrap(),
            vec![("k".to_string(), b"alpha".to_vec())]
        );
    }

    #[tokio::test]
    async fn load_all_is_sorted_by_key() {
        let backend = test_backend();
        for key in ["c", "a", "b"] {
            backend.write_one("s", key, key.as_bytes().to_vec()).await.unwrap();
        }
        let keys: Vec<String> = backend
            .load_all("s")
            .await
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn open_file_based() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kv.db");

        {
            let backend = SqliteBackend::open(&path).unwrap();
            backend.attach("s").await.unwrap();
            backend.write_one("s", "k", b"persisted".to_vec()).await.unwrap();
        }

        let backend = SqliteBackend::open(&path).unwrap();
        assert_eq!(
            backend.load_one("s", "k").await.unwrap(),
            Some(b"persisted".to_vec())
        );
    }
}
