use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::trace;

use crate::envelope::StoredRecord;

/// A transform that upgrades a value to the version it is registered under.
///
/// Steps are keyed by their *target* version: the step registered at `2`
/// receives a value at version 1 and returns it at version 2. Steps are
/// trusted to return the same conceptual shape; the engine does not
/// validate their output.
#[async_trait]
pub trait MigrationStep: Send + Sync {
    /// Transform `value` into the next version.
    async fn migrate(&self, value: Value) -> Result<Value, MigrationError>;
}

/// Error during migration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MigrationError {
    /// A step refused its input.
    #[error("{0}")]
    Rejected(String),
    /// A step failed while upgrading to `version`.
    #[error("migration to v{version} failed: {reason}")]
    StepFailed { version: u32, reason: String },
}

impl MigrationError {
    /// Convenience constructor for step implementations.
    pub fn rejected(reason: impl fmt::Display) -> Self {
        Self::Rejected(reason.to_string())
    }
}

/// The outcome of migrating one stored record.
#[derive(Debug, Clone, PartialEq)]
pub struct Migrated {
    /// The application value at `version`.
    pub value: Value,
    /// Version the value is now at.
    pub version: u32,
    /// Whether the stored form changed and should be written back.
    pub write_back: bool,
}

struct SyncFnStep<F>(F);

#[async_trait]
impl<F> MigrationStep for SyncFnStep<F>
where
    F: Fn(Value) -> Result<Value, MigrationError> + Send + Sync,
{
    async fn migrate(&self, value: Value) -> Result<Value, MigrationError> {
        (self.0)(value)
    }
}

struct AsyncFnStep<F>(F);

#[async_trait]
impl<F, Fut> MigrationStep for AsyncFnStep<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, MigrationError>> + Send,
{
    async fn migrate(&self, value: Value) -> Result<Value, MigrationError> {
        (self.0)(value).await
    }
}

/// Wrap a synchronous closure as a [`MigrationStep`].
pub fn sync_step<F>(f: F) -> Arc<dyn MigrationStep>
where
    F: Fn(Value) -> Result<Value, MigrationError> + Send + Sync + 'static,
{
    Arc::new(SyncFnStep(f))
}

/// Wrap an async closure as a [`MigrationStep`].
pub fn async_step<F, Fut>(f: F) -> Arc<dyn MigrationStep>
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, MigrationError>> + Send + 'static,
{
    Arc::new(AsyncFnStep(f))
}

/// The migration engine that brings stored records up to a target version.
///
/// When a record at version N needs to reach version M (N < M), the
/// engine runs the steps registered for N+1, N+2, ..., M in ascending order.
/// A version with no registered step is skipped; the record's version marker
/// still advances past it.
///
/// # Example
///
/// ```
/// use kvsync_migrate::{sync_step, MigrationEngine, StoredRecord};
/// use serde_json::json;
///
/// # tokio_test_block_on(async {
/// let mut engine = MigrationEngine::new(1);
/// engine.register(1, sync_step(|mut v| {
///     v["humidity"] = json!(null);
///     Ok(v)
/// }));
///
/// let stored = StoredRecord::Untagged(json!({"temp": 22.5}));
/// let migrated = engine.migrate(stored).await.unwrap();
/// assert_eq!(migrated.value, json!({"temp": 22.5, "humidity": null}));
/// assert!(migrated.write_back);
/// # });
/// # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
/// #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
/// # }
/// ```
#[derive(Clone)]
pub struct MigrationEngine {
    target_version: u32,
    steps: BTreeMap<u32, Arc<dyn MigrationStep>>,
}

impl fmt::Debug for MigrationEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationEngine")
            .field("target_version", &self.target_version)
            .field("steps", &self.registered_versions())
            .finish()
    }
}

impl Default for MigrationEngine {
    fn default() -> Self {
        Self::new(0)
    }
}

impl MigrationEngine {
    /// Create a new engine targeting `target_version`.
    pub fn new(target_version: u32) -> Self {
        Self {
            target_version,
            steps: BTreeMap::new(),
        }
    }

    /// Register the step that produces `version`.
    ///
    /// Registering the same version twice replaces the earlier step. Steps
    /// registered at 0 or above the target version are never run.
    pub fn register(&mut self, version: u32, step: Arc<dyn MigrationStep>) {
        self.steps.insert(version, step);
    }

    /// The target schema version.
    pub fn target_version(&self) -> u32 {
        self.target_version
    }

    /// Check if a record at `stored_version` needs migration.
    pub fn needs_migration(&self, stored_version: u32) -> bool {
        stored_version < self.target_version
    }

    /// List registered step versions in ascending order.
    pub fn registered_versions(&self) -> Vec<u32> {
        self.steps.keys().copied().collect()
    }

    /// The stored form for a value written at the target version.
    pub fn encode(&self, value: Value) -> StoredRecord {
        StoredRecord::for_version(self.target_version, value)
    }

    /// Migrate one stored record to the target version.
    ///
    /// Records already at or above the target are returned unchanged with
    /// `write_back = false`.
    pub async fn migrate(&self, record: StoredRecord) -> Result<Migrated, MigrationError> {
        let stored_version = record.version();
        if !self.needs_migration(stored_version) {
            return Ok(Migrated {
                value: record.into_value(),
                version: stored_version,
                write_back: false,
            });
        }

        let mut value = record.into_value();
        let pending = self
            .steps
            .range(stored_version + 1..=self.target_version);
        for (&version, step) in pending {
            trace!(version, "applying migration step");
            value = step
                .migrate(value)
                .await
                .map_err(|e| MigrationError::StepFailed {
                    version,
                    reason: e.to_string(),
                })?;
        }

        Ok(Migrated {
            value,
            version: self.target_version,
            write_back: true,
        })
    }
}
