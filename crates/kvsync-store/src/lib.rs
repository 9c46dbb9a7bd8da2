//! # kvsync-store
//!
//! Durable backends for [`kvsync`](https://docs.rs/kvsync).
//!
//! Provides one asynchronous storage abstraction, [`Backend`], for persisting
//! the records of named stores, with in-memory, SQLite and redb
//! implementations. Records are opaque bytes; the version envelope is
//! interpreted by `kvsync-migrate`.
//!
//! ## Backends
//!
//! | Backend | Feature flag | Use case |
//! |---------|-------------|----------|
//! | [`MemoryBackend`] | *(always available)* | Testing, in-process sharing |
//! | `SqliteBackend` | `sqlite` | Desktop, edge Linux, multi-process |
//! | `RedbBackend` | `redb` | Pure-Rust stack without C deps |

mod memory;
#[cfg(feature = "redb")]
mod redb;
#[cfg(feature = "sqlite")]
mod sqlite;
mod traits;

pub use memory::MemoryBackend;
#[cfg(feature = "redb")]
pub use redb::RedbBackend;
#[cfg(feature = "sqlite")]
pub use sqlite::{JournalMode, SqliteBackend, SqliteConfig};
pub use traits::{Backend, BackendError};
