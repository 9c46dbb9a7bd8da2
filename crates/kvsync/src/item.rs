use std::fmt;
use std::future::Future;
use std::sync::{Arc, Weak};

use serde_json::Value;

use crate::cell::CellClosed;
use crate::error::StoreError;
use crate::store::{ReadCell, Store};

/// A read-write cell bound to one key of a [`Store`].
///
/// Obtained from [`Store::item`]. Reads reflect the store's mirror, so local
/// writes and applied broadcasts both show up here.
#[derive(Clone)]
pub struct ItemCell {
    shared: Arc<ItemShared>,
}

pub(crate) struct ItemShared {
    key: String,
    view: ReadCell<Option<Value>>,
    store: Store,
}

impl fmt::Debug for ItemCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ItemCell")
            .field("store", &self.shared.store.name())
            .field("key", &self.shared.key)
            .field("value", &self.get())
            .finish()
    }
}

impl ItemCell {
    pub(crate) fn new(store: Store, key: String) -> Self {
        let lookup = key.clone();
        let view = store.mirror().derive(move |m| m.get(&lookup).cloned());
        Self {
            shared: Arc::new(ItemShared { key, view, store }),
        }
    }

    pub(crate) fn from_shared(shared: Arc<ItemShared>) -> Self {
        Self { shared }
    }

    pub(crate) fn downgrade(&self) -> Weak<ItemShared> {
        Arc::downgrade(&self.shared)
    }

    /// Returns `true` if both handles are the same cell.
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.shared, &b.shared)
    }

    /// The key this cell is bound to.
    pub fn key(&self) -> &str {
        &self.shared.key
    }

    /// The current value, or `None` if the key is absent.
    pub fn get(&self) -> Option<Value> {
        self.shared.view.get()
    }

    /// Write through to the store. See [`Store::set`].
    pub fn set(&self, value: Value) -> impl Future<Output = Result<(), StoreError>> + Send + 'static {
        self.shared.store.set(self.shared.key.clone(), value)
    }

    /// Remove the key from the store. See [`Store::delete`].
    pub fn delete(&self) -> impl Future<Output = Result<(), StoreError>> + Send + 'static {
        self.shared.store.delete(self.shared.key.clone())
    }

    /// A read-only observer of this key.
    pub fn subscribe(&self) -> ReadCell<Option<Value>> {
        self.shared.view.subscribe()
    }

    /// Wait until this key's value differs from its value now.
    pub async fn changed(&self) -> Result<Option<Value>, CellClosed> {
        self.subscribe().changed_distinct().await
    }
}

#[cfg(test)]
mod tests {
    use crate::bus::LocalBus;
    use crate::Store;
    use kvsync_store::MemoryBackend;
    use serde_json::json;
    use std::time::Duration;

    #[tokio::test]
    async fn same_key_same_cell() {
        let store = Store::builder(MemoryBackend::new(), LocalBus::new()).open();
        let a = store.item("k");
        let b = store.item("k");
        let other = store.item("j");
        assert!(super::ItemCell::ptr_eq(&a, &b));
        assert!(!super::ItemCell::ptr_eq(&a, &other));
    }

    #[tokio::test]
    async fn dropped_cell_is_recreated() {
        let store = Store::builder(MemoryBackend::new(), LocalBus::new()).open();
        let first = store.item("k");
        let weak = first.downgrade();
        drop(first);
        assert!(weak.upgrade().is_none());
        let second = store.item("k");
        assert_eq!(second.key(), "k");
    }

    #[tokio::test]
    async fn reads_and_writes_through_store() {
        let store = Store::builder(MemoryBackend::new(), LocalBus::new()).open();
        store.suspend_until_init().await.unwrap();
        let item = store.item("theme");
        assert_eq!(item.get(), None);

        item.set(json!("dark")).await.unwrap();
        assert_eq!(store.get("theme"), Some(json!("dark")));
        assert_eq!(item.get(), Some(json!("dark")));

        item.delete().await.unwrap();
        assert_eq!(item.get(), None);
    }

    #[tokio::test]
    async fn changed_ignores_other_keys() {
        let store = Store::builder(MemoryBackend::new(), LocalBus::new()).open();
        store.suspend_until_init().await.unwrap();
        let item = store.item("watched");

        let writer = store.clone();
        tokio::spawn(async move {
            writer.set("unrelated", json!(1)).await.unwrap();
            writer.set("watched", json!(2)).await.unwrap();
        });

        let value = tokio::time::timeout(Duration::from_secs(1), item.changed())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(value, Some(json!(2)));
    }
}
