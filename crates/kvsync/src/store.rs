//! The instance state store.
//!
//! A [`Store`] is one handle onto a named persisted store. It keeps an
//! in-memory mirror of every record, migrates records on open, persists each
//! write and tells sibling instances about it over the [`MessageBus`].
//!
//! Lifecycle of one instance:
//!
//! ```text
//! Uninitialized ──open()──▶ Initializing ──load+migrate ok──▶ Ready
//!                                   │
//!                                   └──backend/migration error──▶ Failed
//! ```
//!
//! Only a `Ready` instance applies broadcasts. It subscribes after its full
//! load, so a sibling write that lands between the load and the
//! subscription is not seen until that key is written again or
//! [`Store::reload`] is called.
//!
//! Writes go through a per-instance queue drained by one task, so they reach
//! the backend and the bus in call order whether or not the caller awaits
//! the returned future.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use futures_util::future::join_all;
use futures_util::StreamExt;
use kvsync_migrate::{MigrationEngine, MigrationStep, StoredRecord};
use kvsync_store::{Backend, BackendError};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::bus::{InstanceId, MessageBus, Subscription};
use crate::cell::{Cell, Derived};
use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::item::{ItemCell, ItemShared};
use crate::message::SyncEvent;

/// The in-memory mirror: key to current application value.
pub type Mirror = BTreeMap<String, Value>;

/// A read-only cell derived from a store's mirror.
pub type ReadCell<T> = Derived<Mirror, T>;

/// Synchronization state of one instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncState {
    /// Constructed, initialization not yet started.
    Uninitialized,
    /// Loading and migrating records.
    Initializing,
    /// Mirror populated; reads, writes and broadcasts are live.
    Ready,
    /// Initialization failed. Terminal.
    Failed(StoreError),
}

impl SyncState {
    fn outcome(&self) -> Option<Result<(), StoreError>> {
        match self {
            Self::Uninitialized | Self::Initializing => None,
            Self::Ready => Some(Ok(())),
            Self::Failed(e) => Some(Err(e.clone())),
        }
    }
}

/// Initialization status as seen by consumers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitStatus {
    /// Still loading.
    Pending,
    /// Loaded and migrated.
    Resolved,
    /// Failed with the given error.
    Rejected(StoreError),
}

impl From<&SyncState> for InitStatus {
    fn from(state: &SyncState) -> Self {
        match state {
            SyncState::Uninitialized | SyncState::Initializing => Self::Pending,
            SyncState::Ready => Self::Resolved,
            SyncState::Failed(e) => Self::Rejected(e.clone()),
        }
    }
}

/// Builder for opening a [`Store`].
///
/// ```
/// use kvsync::{sync_step, LocalBus, MemoryBackend, Store};
/// use serde_json::json;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let store = Store::builder(MemoryBackend::new(), LocalBus::new())
///     .name("prefs")
///     .version(1)
///     .migration(1, sync_step(|v| Ok(json!({ "legacy": v }))))
///     .open();
///
/// store.suspend_until_init().await.unwrap();
/// assert!(store.is_empty());
/// # }
/// ```
pub struct StoreBuilder {
    backend: Arc<dyn Backend>,
    bus: Arc<dyn MessageBus>,
    config: StoreConfig,
    engine_steps: Vec<(u32, Arc<dyn MigrationStep>)>,
}

impl StoreBuilder {
    /// Set the store name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    /// Set the target schema version.
    pub fn version(mut self, version: u32) -> Self {
        self.config.version = version;
        self
    }

    /// Replace name and version with `config`.
    pub fn config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }

    /// Register the step that upgrades records to `version`.
    pub fn migration(mut self, version: u32, step: Arc<dyn MigrationStep>) -> Self {
        self.engine_steps.push((version, step));
        self
    }

    /// Construct the store and schedule its initialization.
    ///
    /// # Panics
    ///
    /// Must be called from within a Tokio runtime.
    pub fn open(self) -> Store {
        let mut engine = MigrationEngine::new(self.config.version);
        for (version, step) in self.engine_steps {
            engine.register(version, step);
        }

        let (writes, queue) = mpsc::unbounded_channel();
        let inner = Arc::new(StoreInner {
            id: InstanceId::next(),
            channel: self.config.channel(),
            config: self.config,
            engine,
            backend: self.backend,
            bus: self.bus,
            state: Cell::new(SyncState::Uninitialized),
            mirror: Cell::new(Mirror::new()),
            items: Mutex::new(HashMap::new()),
            listener: Mutex::new(None),
            writes: Mutex::new(WriteQueue {
                tx: writes,
                deferred: 0,
            }),
        });

        tokio::spawn(write_loop(queue));
        tokio::spawn(Arc::clone(&inner).initialize());
        Store { inner }
    }
}

/// A handle onto one named, versioned, synchronized store.
///
/// Cloning a `Store` yields another handle onto the same instance (same
/// mirror). To model a second tab, open a second store with the same name
/// on the same backend and bus.
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

pub(crate) struct StoreInner {
    id: InstanceId,
    config: StoreConfig,
    channel: String,
    engine: MigrationEngine,
    backend: Arc<dyn Backend>,
    bus: Arc<dyn MessageBus>,
    state: Cell<SyncState>,
    mirror: Cell<Mirror>,
    items: Mutex<HashMap<String, Weak<ItemShared>>>,
    listener: Mutex<Option<JoinHandle<()>>>,
    writes: Mutex<WriteQueue>,
}

/// A local mutation waiting for the writer task.
enum WriteOp {
    Set { key: String, value: Value },
    Delete { key: String },
    Clear,
}

struct QueuedWrite {
    inner: Arc<StoreInner>,
    op: WriteOp,
    /// The mirror already reflects `op`.
    applied: bool,
    reply: oneshot::Sender<Result<(), StoreError>>,
}

struct WriteQueue {
    tx: mpsc::UnboundedSender<QueuedWrite>,
    /// Queued writes whose mirror change waits for initialization. While
    /// any are pending, later writes wait behind them.
    deferred: usize,
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("id", &self.inner.id)
            .field("name", &self.inner.config.name)
            .field("version", &self.inner.config.version)
            .field("state", &self.inner.state.get())
            .finish()
    }
}

impl Store {
    /// Start building a store over `backend`, synchronized through `bus`.
    pub fn builder(
        backend: impl Backend + 'static,
        bus: impl MessageBus + 'static,
    ) -> StoreBuilder {
        StoreBuilder {
            backend: Arc::new(backend),
            bus: Arc::new(bus),
            config: StoreConfig::default(),
            engine_steps: Vec::new(),
        }
    }

    /// The store name.
    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    /// The schema version this instance writes.
    pub fn version(&self) -> u32 {
        self.inner.config.version
    }

    /// This instance's identity on the bus.
    pub fn id(&self) -> InstanceId {
        self.inner.id
    }

    /// The current synchronization state.
    pub fn state(&self) -> SyncState {
        self.inner.state.get()
    }

    /// A cell tracking initialization status.
    pub fn init_status(&self) -> Derived<SyncState, InitStatus> {
        self.inner.state.derive(|s| InitStatus::from(s))
    }

    /// Resolve once initialization settles, with its outcome.
    pub fn suspend_until_init(&self) -> impl Future<Output = Result<(), StoreError>> + Send + 'static {
        let inner = Arc::clone(&self.inner);
        async move { inner.ready().await }
    }

    /// Current value for `key`, or `None` if absent (or not yet loaded).
    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.mirror.with(|m| m.get(key).cloned())
    }

    /// Returns `true` if `key` is in the mirror.
    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.mirror.with(|m| m.contains_key(key))
    }

    /// Number of keys in the mirror.
    pub fn len(&self) -> usize {
        self.inner.mirror.with(BTreeMap::len)
    }

    /// Returns `true` if the mirror is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A cell of all keys, in key order.
    pub fn keys(&self) -> ReadCell<Vec<String>> {
        self.inner.mirror.derive(|m| m.keys().cloned().collect())
    }

    /// A cell of all values, in key order.
    pub fn values(&self) -> ReadCell<Vec<Value>> {
        self.inner.mirror.derive(|m| m.values().cloned().collect())
    }

    /// A cell of all `(key, value)` pairs, in key order.
    pub fn entries(&self) -> ReadCell<Vec<(String, Value)>> {
        self.inner
            .mirror
            .derive(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }

    /// A read-write cell for one key.
    ///
    /// Calls with the same key return the same cell while any handle to it
    /// is alive.
    pub fn item(&self, key: impl Into<String>) -> ItemCell {
        let key = key.into();
        let Ok(mut items) = self.inner.items.lock() else {
            return ItemCell::new(self.clone(), key);
        };
        if let Some(shared) = items.get(&key).and_then(Weak::upgrade) {
            return ItemCell::from_shared(shared);
        }
        items.retain(|_, cell| cell.strong_count() > 0);
        let cell = ItemCell::new(self.clone(), key.clone());
        items.insert(key, cell.downgrade());
        cell
    }

    /// Write `value` under `key`.
    ///
    /// When the store is ready the mirror is updated before this returns.
    /// The write is queued at once: it is persisted and then announced to
    /// siblings even if the returned future is dropped, and one instance's
    /// writes reach the backend in call order. The future resolves with the
    /// persistence outcome. If persisting fails the mirror keeps the new
    /// value and the error is returned.
    pub fn set(
        &self,
        key: impl Into<String>,
        value: Value,
    ) -> impl Future<Output = Result<(), StoreError>> + Send + 'static {
        self.submit(WriteOp::Set {
            key: key.into(),
            value,
        })
    }

    /// Remove `key`. Same update and persistence rules as [`set`](Self::set).
    pub fn delete(
        &self,
        key: impl Into<String>,
    ) -> impl Future<Output = Result<(), StoreError>> + Send + 'static {
        self.submit(WriteOp::Delete { key: key.into() })
    }

    /// Remove every key. Same update and persistence rules as [`set`](Self::set).
    pub fn clear(&self) -> impl Future<Output = Result<(), StoreError>> + Send + 'static {
        self.submit(WriteOp::Clear)
    }

    fn submit(&self, op: WriteOp) -> impl Future<Output = Result<(), StoreError>> + Send + 'static {
        let (reply, outcome) = oneshot::channel();
        let queued = self.inner.enqueue(op, reply);
        async move {
            queued?;
            outcome.await.unwrap_or(Err(StoreError::Closed))
        }
    }

    /// Re-read `key` from the backend, migrating it if needed, and update
    /// the mirror to match. Returns the value now in the mirror.
    pub fn reload(
        &self,
        key: impl Into<String>,
    ) -> impl Future<Output = Result<Option<Value>, StoreError>> + Send + 'static {
        let inner = Arc::clone(&self.inner);
        let key = key.into();
        async move {
            inner.ready().await?;
            inner.reload(key).await
        }
    }

    pub(crate) fn mirror(&self) -> &Cell<Mirror> {
        &self.inner.mirror
    }
}

impl StoreInner {
    fn is_ready(&self) -> bool {
        self.state.with(|s| *s == SyncState::Ready)
    }

    fn lock_writes(&self) -> MutexGuard<'_, WriteQueue> {
        self.writes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Hand `op` to the writer task, applying it to the mirror first when
    /// nothing is waiting on initialization.
    fn enqueue(
        self: &Arc<Self>,
        op: WriteOp,
        reply: oneshot::Sender<Result<(), StoreError>>,
    ) -> Result<(), StoreError> {
        let mut queue = self.lock_writes();
        let applied = queue.deferred == 0 && self.is_ready();
        if applied {
            self.apply(&op);
        } else {
            queue.deferred += 1;
        }
        let write = QueuedWrite {
            inner: Arc::clone(self),
            op,
            applied,
            reply,
        };
        queue.tx.send(write).map_err(|_| StoreError::Closed)
    }

    /// Run one queued write: wait for initialization if the mirror change
    /// is still pending, then persist and broadcast.
    async fn run(&self, op: WriteOp, applied: bool) -> Result<(), StoreError> {
        if !applied {
            let ready = self.ready().await;
            let mut queue = self.lock_writes();
            queue.deferred = queue.deferred.saturating_sub(1);
            ready?;
            self.apply(&op);
        }
        match op {
            WriteOp::Set { key, value } => self.persist_set(key, value).await,
            WriteOp::Delete { key } => self.persist_delete(key).await,
            WriteOp::Clear => self.persist_clear().await,
        }
    }

    async fn ready(&self) -> Result<(), StoreError> {
        let mut outcome = self.state.derive(SyncState::outcome);
        match outcome.wait_for(Option::is_some).await {
            Ok(Some(result)) => result,
            // The state cell lives as long as `self`.
            _ => Ok(()),
        }
    }

    async fn initialize(self: Arc<Self>) {
        let started = self.state.update(|s| {
            if *s != SyncState::Uninitialized {
                return false;
            }
            *s = SyncState::Initializing;
            true
        });
        if !started {
            return;
        }
        debug!(store = %self.config.name, id = %self.id, "initializing");

        match self.load().await {
            Ok(mirror) => {
                let subscription = self.bus.subscribe(&self.channel, self.id);
                let listener = tokio::spawn(listen(Arc::downgrade(&self), subscription));
                if let Ok(mut slot) = self.listener.lock() {
                    *slot = Some(listener);
                }
                let count = mirror.len();
                self.mirror.set(mirror);
                self.state.set(SyncState::Ready);
                info!(
                    store = %self.config.name,
                    id = %self.id,
                    version = self.config.version,
                    records = count,
                    "store ready"
                );
            }
            Err(e) => {
                warn!(store = %self.config.name, id = %self.id, error = %e, "initialization failed");
                self.state.set(SyncState::Failed(e));
            }
        }
    }

    /// Load and migrate every record. Nothing is written back unless every
    /// record migrated.
    async fn load(&self) -> Result<Mirror, StoreError> {
        let name = self.config.name.as_str();
        let unavailable = |source: BackendError| StoreError::BackendUnavailable {
            store: name.to_string(),
            source,
        };

        self.backend.attach(name).await.map_err(unavailable)?;
        let records = self.backend.load_all(name).await.map_err(unavailable)?;

        let mut mirror = Mirror::new();
        let mut write_backs = Vec::new();
        for (key, bytes) in records {
            let (value, write_back) = self.decode_and_migrate(&key, &bytes).await?;
            if let Some(record) = write_back {
                write_backs.push((key.clone(), record));
            }
            mirror.insert(key, value);
        }

        if !write_backs.is_empty() {
            debug!(store = name, count = write_backs.len(), "writing back migrated records");
        }
        let writes = write_backs.iter().map(|(key, record)| async move {
            let result = self.backend.write_one(name, key, record.to_bytes()).await;
            (key, result)
        });
        for (key, result) in join_all(writes).await {
            if let Err(e) = result {
                warn!(store = name, key = %key, error = %e, "write-back of migrated record failed");
            }
        }

        Ok(mirror)
    }

    /// Decode one stored record and bring it to the target version.
    ///
    /// Returns the application value and, if the stored form changed, the
    /// record to write back.
    async fn decode_and_migrate(
        &self,
        key: &str,
        bytes: &[u8],
    ) -> Result<(Value, Option<StoredRecord>), StoreError> {
        let record = StoredRecord::from_bytes(bytes).map_err(|source| StoreError::CorruptRecord {
            key: key.to_string(),
            source,
        })?;
        let migrated = self
            .engine
            .migrate(record)
            .await
            .map_err(|source| StoreError::MigrationFailure {
                key: key.to_string(),
                source,
            })?;
        if migrated.write_back {
            let record = self.engine.encode(migrated.value);
            let value = record.value().clone();
            Ok((value, Some(record)))
        } else {
            Ok((migrated.value, None))
        }
    }

    async fn reload(&self, key: String) -> Result<Option<Value>, StoreError> {
        let name = self.config.name.as_str();
        let stored = self
            .backend
            .load_one(name, &key)
            .await
            .map_err(|source| StoreError::BackendUnavailable {
                store: name.to_string(),
                source,
            })?;

        let Some(bytes) = stored else {
            self.apply_delete(&key);
            return Ok(None);
        };
        let (value, write_back) = self.decode_and_migrate(&key, &bytes).await?;
        if let Some(record) = write_back {
            if let Err(e) = self.backend.write_one(name, &key, record.to_bytes()).await {
                warn!(store = name, key = %key, error = %e, "write-back of migrated record failed");
            }
        }
        self.apply_set(key, value.clone());
        Ok(Some(value))
    }

    fn apply(&self, op: &WriteOp) -> bool {
        match op {
            WriteOp::Set { key, value } => self.apply_set(key.clone(), value.clone()),
            WriteOp::Delete { key } => self.apply_delete(key),
            WriteOp::Clear => self.apply_clear(),
        }
    }

    fn apply_set(&self, key: String, value: Value) -> bool {
        self.mirror.update(|m| match m.get(&key) {
            Some(existing) if *existing == value => false,
            _ => {
                m.insert(key, value);
                true
            }
        })
    }

    fn apply_delete(&self, key: &str) -> bool {
        self.mirror.update(|m| m.remove(key).is_some())
    }

    fn apply_clear(&self) -> bool {
        self.mirror.update(|m| {
            if m.is_empty() {
                return false;
            }
            m.clear();
            true
        })
    }

    async fn persist_set(&self, key: String, value: Value) -> Result<(), StoreError> {
        let record = self.engine.encode(value);
        self.backend
            .write_one(&self.config.name, &key, record.to_bytes())
            .await
            .map_err(|source| StoreError::WriteFailure {
                key: Some(key.clone()),
                source,
            })?;
        self.broadcast(SyncEvent::Set {
            store_name: self.config.name.clone(),
            key,
            value: record.into_value(),
        });
        Ok(())
    }

    async fn persist_delete(&self, key: String) -> Result<(), StoreError> {
        self.backend
            .delete_one(&self.config.name, &key)
            .await
            .map_err(|source| StoreError::WriteFailure {
                key: Some(key.clone()),
                source,
            })?;
        self.broadcast(SyncEvent::Delete {
            store_name: self.config.name.clone(),
            key,
        });
        Ok(())
    }

    async fn persist_clear(&self) -> Result<(), StoreError> {
        self.backend
            .clear_all(&self.config.name)
            .await
            .map_err(|source| StoreError::WriteFailure { key: None, source })?;
        self.broadcast(SyncEvent::Clear {
            store_name: self.config.name.clone(),
        });
        Ok(())
    }

    fn broadcast(&self, event: SyncEvent) {
        self.bus.publish(&self.channel, self.id, event.to_payload());
    }

    /// Apply a sibling's mutation to the mirror. Never migrates and never
    /// persists: the sender already did both.
    fn handle_broadcast(&self, payload: Value) {
        if !self.is_ready() {
            debug!(store = %self.config.name, id = %self.id, "ignoring broadcast before ready");
            return;
        }
        let Some(event) = SyncEvent::from_payload(&payload) else {
            debug!(store = %self.config.name, id = %self.id, "dropping malformed broadcast");
            return;
        };
        if event.store_name() != self.config.name {
            debug!(
                store = %self.config.name,
                foreign = event.store_name(),
                "dropping broadcast for another store"
            );
            return;
        }

        match event {
            SyncEvent::Set { key, value, .. } => {
                debug!(store = %self.config.name, id = %self.id, key = %key, "applying remote set");
                self.apply_set(key, value);
            }
            SyncEvent::Delete { key, .. } => {
                debug!(store = %self.config.name, id = %self.id, key = %key, "applying remote delete");
                self.apply_delete(&key);
            }
            SyncEvent::Clear { .. } => {
                debug!(store = %self.config.name, id = %self.id, "applying remote clear");
                self.apply_clear();
            }
        }
    }
}

impl Drop for StoreInner {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.get_mut().ok().and_then(Option::take) {
            listener.abort();
        }
    }
}

async fn write_loop(mut queue: mpsc::UnboundedReceiver<QueuedWrite>) {
    while let Some(write) = queue.recv().await {
        let QueuedWrite {
            inner,
            op,
            applied,
            reply,
        } = write;
        let result = inner.run(op, applied).await;
        // The caller may have dropped its future.
        let _ = reply.send(result);
    }
}

async fn listen(inner: Weak<StoreInner>, mut subscription: Subscription) {
    while let Some(payload) = subscription.next().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        inner.handle_broadcast(payload);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::LocalBus;
    use kvsync_store::MemoryBackend;
    use serde_json::json;

    #[test]
    fn init_status_mapping() {
        assert_eq!(InitStatus::from(&SyncState::Uninitialized), InitStatus::Pending);
        assert_eq!(InitStatus::from(&SyncState::Initializing), InitStatus::Pending);
        assert_eq!(InitStatus::from(&SyncState::Ready), InitStatus::Resolved);
        let err = StoreError::WriteFailure {
            key: None,
            source: BackendError::ReadOnly,
        };
        assert_eq!(
            InitStatus::from(&SyncState::Failed(err.clone())),
            InitStatus::Rejected(err)
        );
    }

    #[tokio::test]
    async fn set_updates_mirror_before_persisting() {
        let store = Store::builder(MemoryBackend::new(), LocalBus::new()).open();
        store.suspend_until_init().await.unwrap();

        let pending = store.set("k", json!(1));
        // Not yet polled: mirror already reflects the write.
        assert_eq!(store.get("k"), Some(json!(1)));
        pending.await.unwrap();
    }

    #[tokio::test]
    async fn writes_before_ready_wait_for_init() {
        let backend = MemoryBackend::new();
        backend.insert_raw("kvsync", "old", "\"value\"");
        let store = Store::builder(backend.clone(), LocalBus::new()).open();

        // Issued before initialization has had a chance to run.
        store.set("new", json!(true)).await.unwrap();
        assert_eq!(store.get("old"), Some(json!("value")));
        assert_eq!(store.get("new"), Some(json!(true)));
        assert_eq!(backend.raw("kvsync", "new"), Some(b"true".to_vec()));
        assert_eq!(store.inner.lock_writes().deferred, 0);
    }

    #[tokio::test]
    async fn identical_set_does_not_notify() {
        let store = Store::builder(MemoryBackend::new(), LocalBus::new()).open();
        store.suspend_until_init().await.unwrap();
        store.set("k", json!("v")).await.unwrap();

        assert!(!store.inner.apply_set("k".into(), json!("v")));
        assert!(store.inner.apply_set("k".into(), json!("w")));
    }

    #[tokio::test]
    async fn handle_broadcast_filters_foreign_and_malformed() {
        let store = Store::builder(MemoryBackend::new(), LocalBus::new())
            .name("mine")
            .open();
        store.suspend_until_init().await.unwrap();

        store.inner.handle_broadcast(json!({"kind": "set", "storeName": "theirs", "key": "k", "value": 1}));
        store.inner.handle_broadcast(json!({"bogus": true}));
        assert!(store.is_empty());

        store.inner.handle_broadcast(json!({"kind": "set", "storeName": "mine", "key": "k", "value": 1}));
        assert_eq!(store.get("k"), Some(json!(1)));
    }

    #[tokio::test]
    async fn initialization_runs_once() {
        let backend = MemoryBackend::new();
        let store = Store::builder(backend, LocalBus::new()).open();
        store.suspend_until_init().await.unwrap();
        store.set("k", json!(1)).await.unwrap();

        // A second run must not reload over the live mirror.
        Arc::clone(&store.inner).initialize().await;
        assert_eq!(store.state(), SyncState::Ready);
        assert_eq!(store.get("k"), Some(json!(1)));
    }
}
