use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::traits::{Backend, BackendError};

/// In-memory storage backend.
///
/// All data is stored in `BTreeMap`s; nothing touches disk. Clones share
/// the same medium, so handing clones to several stores models several
/// tabs of one origin. Ideal for testing and prototyping.
///
/// # Example
///
/// ```
/// use kvsync_store::{Backend, MemoryBackend};
///
/// # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
/// let backend = MemoryBackend::new();
/// backend.write_one("prefs", "theme", b"\"dark\"".to_vec()).await.unwrap();
///
/// let other_tab = backend.clone();
/// let data = other_tab.load_one("prefs", "theme").await.unwrap();
/// assert_eq!(data.as_deref(), Some(b"\"dark\"".as_slice()));
/// # });
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    inner: Arc<Mutex<MemoryInner>>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    /// store name -> key -> stored bytes
    stores: HashMap<String, BTreeMap<String, Vec<u8>>>,
    offline: bool,
    read_only: bool,
    writes: u64,
}

impl MemoryBackend {
    /// Create a new empty medium.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every operation fail with [`BackendError::Unavailable`].
    pub fn set_offline(&self, offline: bool) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.offline = offline;
        }
    }

    /// Make mutations fail with [`BackendError::ReadOnly`]. Loads still work.
    pub fn set_read_only(&self, read_only: bool) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.read_only = read_only;
        }
    }

    /// Seed a record without going through a store.
    pub fn insert_raw(&self, store: &str, key: &str, value: impl Into<Vec<u8>>) {
        if let Ok(mut inner) = self.inner.lock() {
            inner
                .stores
                .entry(store.to_string())
                .or_default()
                .insert(key.to_string(), value.into());
        }
    }

    /// Read a record's raw bytes, bypassing offline simulation.
    pub fn raw(&self, store: &str, key: &str) -> Option<Vec<u8>> {
        let inner = self.inner.lock().ok()?;
        inner.stores.get(store)?.get(key).cloned()
    }

    /// Number of records in `store`.
    pub fn len(&self, store: &str) -> usize {
        self.inner
            .lock()
            .ok()
            .and_then(|inner| inner.stores.get(store).map(BTreeMap::len))
            .unwrap_or(0)
    }

    /// Returns `true` if `store` has no records.
    pub fn is_empty(&self, store: &str) -> bool {
        self.len(store) == 0
    }

    /// Total number of successful `write_one` calls across all stores.
    pub fn write_count(&self) -> u64 {
        self.inner.lock().map(|inner| inner.writes).unwrap_or(0)
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryInner>, BackendError> {
        let inner = self
            .inner
            .lock()
            .map_err(|_| BackendError::Io("memory backend lock poisoned".into()))?;
        if inner.offline {
            return Err(BackendError::Unavailable("memory backend is offline".into()));
        }
        Ok(inner)
    }

    fn lock_mut(&self) -> Result<MutexGuard<'_, MemoryInner>, BackendError> {
        let inner = self.lock()?;
        if inner.read_only {
            return Err(BackendError::ReadOnly);
        }
        Ok(inner)
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn attach(&self, _store: &str) -> Result<(), BackendError> {
        self.lock().map(drop)
    }

    async fn load_all(&self, store: &str) -> Result<Vec<(String, Vec<u8>)>, BackendError> {
        let inner = self.lock()?;
        Ok(inner
            .stores
            .get(store)
            .map(|records| {
                records
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn load_one(&self, store: &str, key: &str) -> Result<Option<Vec<u8>>, BackendError> {
        let inner = self.lock()?;
        Ok(inner.stores.get(store).and_then(|r| r.get(key)).cloned())
    }

    async fn write_one(&self, store: &str, key: &str, value: Vec<u8>) -> Result<(), BackendError> {
        let mut inner = self.lock_mut()?;
        inner
            .stores
            .entry(store.to_string())
            .or_default()
            .insert(key.to_string(), value);
        inner.writes += 1;
        Ok(())
    }

    async fn delete_one(&self, store: &str, key: &str) -> Result<(), BackendError> {
        let mut inner = self.lock_mut()?;
        if let Some(records) = inner.stores.get_mut(store) {
            records.remove(key);
        }
        Ok(())
    }

    async fn clear_all(&self, store: &str) -> Result<(), BackendError> {
        let mut inner = self.lock_mut()?;
        inner.stores.remove(store);
        Ok(())
    }
}
