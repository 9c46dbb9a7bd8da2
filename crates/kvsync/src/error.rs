use kvsync_migrate::{EnvelopeError, MigrationError};
use kvsync_store::BackendError;
use thiserror::Error;

/// Errors surfaced by a [`Store`](crate::Store).
///
/// Initialization failures are shared by every waiter, so the error is
/// cheap to clone.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The durable medium could not be opened or loaded. Fatal to
    /// initialization.
    #[error("store `{store}` could not reach its backend: {source}")]
    BackendUnavailable { store: String, source: BackendError },
    /// A migration step failed. Fatal to initialization; nothing from the
    /// batch was written back.
    #[error("migrating `{key}` failed: {source}")]
    MigrationFailure { key: String, source: MigrationError },
    /// A persisted record could not be decoded. Fatal to initialization.
    #[error("record `{key}` is corrupt: {source}")]
    CorruptRecord { key: String, source: EnvelopeError },
    /// An individual write did not persist. The in-memory mirror keeps the
    /// optimistic change.
    #[error("persisting `{}` failed: {source}", .key.as_deref().unwrap_or("*"))]
    WriteFailure {
        /// The key written, or `None` for `clear`.
        key: Option<String>,
        source: BackendError,
    },
    /// The instance's write queue shut down before the write ran, which
    /// only happens when the runtime is going away.
    #[error("write queue is closed")]
    Closed,
}
