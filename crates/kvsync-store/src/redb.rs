//! Pure-Rust durable backend using [`redb`](https://docs.rs/redb).
//!
//! No C dependencies. Useful when SQLite cannot be cross-compiled, or when
//! a fully Rust-native stack is preferred.
//!
//! Enable with `features = ["redb"]`.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use redb::{Database, ReadableTable, TableDefinition};
use tracing::debug;

use crate::traits::{Backend, BackendError};

/// `len(store) as u32 BE, store, key` -> stored bytes
const RECORD_TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("kv_records");

/// A pure-Rust durable backend built on [`redb`].
///
/// Each operation runs in its own redb transaction on the blocking pool.
/// Clones share the same database.
#[derive(Clone)]
pub struct RedbBackend {
    db: Arc<Database>,
}

impl RedbBackend {
    /// Open or create a redb database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, BackendError> {
        debug!(path = %path.as_ref().display(), "opening redb backend");
        let db = Database::create(path).map_err(|e| BackendError::Unavailable(e.to_string()))?;
        Self::init(db)
    }

    /// Create an in-memory redb database (for testing).
    pub fn open_in_memory() -> Result<Self, BackendError> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(|e| BackendError::Unavailable(e.to_string()))?;
        Self::init(db)
    }

    fn init(db: Database) -> Result<Self, BackendError> {
        // Ensure the table exists by opening a write txn.
        let txn = db.begin_write().map_err(BackendError::io)?;
        txn.open_table(RECORD_TABLE).map_err(BackendError::io)?;
        txn.commit().map_err(BackendError::io)?;
        Ok(Self { db: Arc::new(db) })
    }

    async fn with_db<T, F>(&self, f: F) -> Result<T, BackendError>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> Result<T, BackendError> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(BackendError::io)?
    }
}

/// Every key of `store` starts with this. The length prefix keeps names
/// that are prefixes of each other, or that contain NUL, apart.
fn store_prefix(store: &str) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(4 + store.len());
    prefix.extend_from_slice(&(store.len() as u32).to_be_bytes());
    prefix.extend_from_slice(store.as_bytes());
    prefix
}

fn record_key(store: &str, key: &str) -> Vec<u8> {
    let mut k = store_prefix(store);
    k.extend_from_slice(key.as_bytes());
    k
}

/// `[lower, upper)` bounds covering every key of `store`.
fn store_range(store: &str) -> (Vec<u8>, Vec<u8>) {
    let lower = store_prefix(store);
    // Smallest byte string above every string starting with `lower`.
    let mut upper = lower.clone();
    while upper.last() == Some(&u8::MAX) {
        upper.pop();
    }
    if let Some(last) = upper.last_mut() {
        *last += 1;
    }
    (lower, upper)
}

fn parse_record_key(raw: &[u8]) -> Option<&str> {
    let len = <[u8; 4]>::try_from(raw.get(..4)?).ok()?;
    let start = 4usize.checked_add(u32::from_be_bytes(len) as usize)?;
    std::str::from_utf8(raw.get(start..)?).ok()
}

#[async_trait]
impl Backend for RedbBackend {
    async fn load_all(&self, store: &str) -> Result<Vec<(String, Vec<u8>)>, BackendError> {
        let (lower, upper) = store_range(store);
        self.with_db(move |db| {
            let txn = db.begin_read().map_err(BackendError::io)?;
            let table = txn.open_table(RECORD_TABLE).map_err(BackendError::io)?;
            let mut records = Vec::new();
            for item in table
                .range(lower.as_slice()..upper.as_slice())
                .map_err(BackendError::io)?
            {
                let (k, v) = item.map_err(BackendError::io)?;
                if let Some(key) = parse_record_key(k.value()) {
                    records.push((key.to_string(), v.value().to_vec()));
                }
            }
            Ok(records)
        })
        .await
    }

    async fn load_one(&self, store: &str, key: &str) -> Result<Option<Vec<u8>>, BackendError> {
        let k = record_key(store, key);
        self.with_db(move |db| {
            let txn = db.begin_read().map_err(BackendError::io)?;
            let table = txn.open_table(RECORD_TABLE).map_err(BackendError::io)?;
            let value = table
                .get(k.as_slice())
                .map_err(BackendError::io)?
                .map(|guard| guard.value().to_vec());
            Ok(value)
        })
        .await
    }

    async fn write_one(&self, store: &str, key: &str, value: Vec<u8>) -> Result<(), BackendError> {
        let k = record_key(store, key);
        self.with_db(move |db| {
            let txn = db.begin_write().map_err(BackendError::io)?;
            {
                let mut table = txn.open_table(RECORD_TABLE).map_err(BackendError::io)?;
                table
                    .insert(k.as_slice(), value.as_slice())
                    .map_err(BackendError::io)?;
            }
            txn.commit().map_err(BackendError::io)
        })
        .await
    }

    async fn delete_one(&self, store: &str, key: &str) -> Result<(), BackendError> {
        let k = record_key(store, key);
        self.with_db(move |db| {
            let txn = db.begin_write().map_err(BackendError::io)?;
            {
                let mut table = txn.open_table(RECORD_TABLE).map_err(BackendError::io)?;
                table.remove(k.as_slice()).map_err(BackendError::io)?;
            }
            txn.commit().map_err(BackendError::io)
        })
        .await
    }

    async fn clear_all(&self, store: &str) -> Result<(), BackendError> {
        let (lower, upper) = store_range(store);
        self.with_db(move |db| {
            let txn = db.begin_write().map_err(BackendError::io)?;
            {
                let mut table = txn.open_table(RECORD_TABLE).map_err(BackendError::io)?;
                table
                    .retain_in(lower.as_slice()..upper.as_slice(), |_, _| false)
                    .map_err(BackendError::io)?;
            }
            txn.commit().map_err(BackendError::io)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_range_covers_only_store() {
        let (lower, upper) = store_range("ab");
        let inside = record_key("ab", "zzz");
        let outside = record_key("abc", "k");
        assert!(lower.as_slice() <= inside.as_slice() && inside.as_slice() < upper.as_slice());
        assert!(!(lower.as_slice() <= outside.as_slice() && outside.as_slice() < upper.as_slice()));
        assert_eq!(parse_record_key(&inside), Some("zzz"));
    }

    #[test]
    fn nul_in_store_names_cannot_alias() {
        // "a\0b" + "c" and "a" + "b\0c" would share a NUL-joined key.
        assert_ne!(record_key("a\0b", "c"), record_key("a", "b\0c"));
        let (lower, upper) = store_range("a");
        let other = record_key("a\0b", "c");
        assert!(!(lower.as_slice() <= other.as_slice() && other.as_slice() < upper.as_slice()));
        assert_eq!(parse_record_key(&record_key("a\0b", "c")), Some("c"));
        assert_eq!(parse_record_key(&[0, 0]), None);
    }

    #[tokio::test]
    async fn stores_with_nul_in_their_names_stay_isolated() {
        let backend = RedbBackend::open_in_memory().unwrap();
        backend.write_one("a", "b\0c", b"1".to_vec()).await.unwrap();
        backend.write_one("a\0b", "c", b"2".to_vec()).await.unwrap();

        assert_eq!(backend.load_all("a").await.unwrap(), vec![("b\0c".to_string(), b"1".to_vec())]);
        assert_eq!(backend.load_all("a\0b").await.unwrap(), vec![("c".to_string(), b"2".to_vec())]);

        backend.clear_all("a").await.unwrap();
        assert_eq!(backend.load_one("a\0b", "c").await.unwrap(), Some(b"2".to_vec()));
    }

    #[tokio::test]
    async fn write_load_clear() {
        let backend = RedbBackend::open_in_memory().unwrap();
        backend.write_one("a", "k1", b"1".to_vec()).await.unwrap();
        backend.write_one("a", "k2", b"2".to_vec()).await.unwrap();
        backend.write_one("b", "k1", b"3".to_vec()).await.unwrap();

        assert_eq!(backend.load_all("a").await.unwrap().len(), 2);
        assert_eq!(backend.load_one("b", "k1").await.unwrap(), Some(b"3".to_vec()));

        backend.delete_one("a", "k1").await.unwrap();
        assert_eq!(backend.load_one("a", "k1").await.unwrap(), None);

        backend.clear_all("a").await.unwrap();
        assert!(backend.load_all("a").await.unwrap().is_empty());
        assert_eq!(backend.load_all("b").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kv.redb");
        {
            let backend = RedbBackend::open(&path).unwrap();
            backend.write_one("s", "k", b"kept".to_vec()).await.unwrap();
        }
        let backend = RedbBackend::open(&path).unwrap();
        assert_eq!(backend.load_one("s", "k").await.unwrap(), Some(b"kept".to_vec()));
    }
}
