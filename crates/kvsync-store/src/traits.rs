use async_trait::async_trait;
use thiserror::Error;

/// Errors returned by durable backends.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// The durable medium cannot be opened or reached.
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    /// The medium refuses mutations.
    #[error("backend is read-only")]
    ReadOnly,
    /// An individual operation failed.
    #[error("backend I/O error: {0}")]
    Io(String),
}

impl BackendError {
    #[cfg(any(feature = "sqlite", feature = "redb"))]
    pub(crate) fn io(e: impl std::fmt::Display) -> Self {
        Self::Io(e.to_string())
    }
}

/// Core trait for durable record persistence.
///
/// Every backend implements this trait. It provides asynchronous key-value
/// operations scoped by a store name; two stores with different names never
/// see each other's records.
///
/// Data is stored as opaque bytes. The backend does not interpret the
/// record. Versioning and migration are handled by
/// [`kvsync-migrate`](https://docs.rs/kvsync-migrate).
#[async_trait]
pub trait Backend: Send + Sync {
    /// Open or attach to the medium for `store`.
    ///
    /// Called once before the first load. Backends that need no per-store
    /// setup keep the default.
    async fn attach(&self, store: &str) -> Result<(), BackendError> {
        let _ = store;
        Ok(())
    }

    /// Load every record in `store`.
    async fn load_all(&self, store: &str) -> Result<Vec<(String, Vec<u8>)>, BackendError>;

    /// Load one record. Returns `None` if the key does not exist.
    async fn load_one(&self, store: &str, key: &str) -> Result<Option<Vec<u8>>, BackendError>;

    /// Store a record under `(store, key)`, replacing any previous one.
    async fn write_one(&self, store: &str, key: &str, value: Vec<u8>) -> Result<(), BackendError>;

    /// Delete a record. Deleting a missing key succeeds.
    async fn delete_one(&self, store: &str, key: &str) -> Result<(), BackendError>;

    /// Delete every record in `store`.
    async fn clear_all(&self, store: &str) -> Result<(), BackendError>;
}
