//! # kvsync
//!
//! A versioned key-value store whose instances stay in sync.
//!
//! Each [`Store`] keeps an in-memory mirror of a named persisted store. When
//! it opens, every record is migrated up to the schema version the instance
//! expects. After that, each local write updates the mirror at once, is
//! persisted through the pluggable [`Backend`], and is announced over a
//! [`MessageBus`] so sibling instances of the same store apply it too.
//!
//! ## Quick Start
//!
//! ```
//! use kvsync::prelude::*;
//! use serde_json::json;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), StoreError> {
//! let backend = MemoryBackend::new();
//! let bus = LocalBus::new();
//!
//! let tab_a = Store::builder(backend.clone(), bus.clone()).name("prefs").open();
//! let tab_b = Store::builder(backend, bus).name("prefs").open();
//! tab_a.suspend_until_init().await?;
//! tab_b.suspend_until_init().await?;
//!
//! tab_a.set("theme", json!("dark")).await?;
//! assert_eq!(tab_a.get("theme"), Some(json!("dark")));
//!
//! let mut theme = tab_b.item("theme").subscribe();
//! let seen = theme.wait_for(Option::is_some).await.unwrap();
//! assert_eq!(seen, Some(json!("dark")));
//! # Ok(())
//! # }
//! ```
//!
//! ## Pieces
//!
//! - [`Store`] / [`StoreBuilder`] - the instance state store
//! - [`ItemCell`] - a read-write cell bound to one key
//! - [`cell`] - the reactive [`Cell`](cell::Cell) and
//!   [`Derived`](cell::Derived) primitives
//! - [`bus`] - the [`MessageBus`] trait and the in-process [`LocalBus`]
//! - [`message`] - the [`SyncEvent`] wire format
//! - [`kvsync_migrate`] - versioned envelopes and the migration engine
//! - [`kvsync_store`] - durable backends

mod config;
mod error;
mod item;
mod store;

pub mod bus;
pub mod cell;
pub mod message;
pub mod prelude;

pub use bus::{InstanceId, LocalBus, MessageBus, Subscription};
pub use config::{StoreConfig, CHANNEL_PREFIX, DEFAULT_STORE_NAME};
pub use error::StoreError;
pub use item::ItemCell;
pub use message::SyncEvent;
pub use store::{InitStatus, Mirror, ReadCell, Store, StoreBuilder, SyncState};

pub use kvsync_migrate::{
    async_step, sync_step, Migrated, MigrationEngine, MigrationError, MigrationStep, StoredRecord,
};
pub use kvsync_store::{Backend, BackendError, MemoryBackend};
