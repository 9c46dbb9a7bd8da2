//! # kvsync-migrate
//!
//! Per-record schema migrations for [`kvsync`](https://docs.rs/kvsync).
//!
//! Every persisted value carries the schema version it was last migrated to,
//! inside the record itself rather than in a store-wide field. When a store
//! opens, each record is brought up to the version the opening instance
//! expects and written back if it changed.
//!
//! ## How It Works
//!
//! 1. A record is stored either **untagged** (bare JSON, version 0) or
//!    **tagged** with a 5-byte header carrying its version.
//! 2. On load, the stored version is compared to the engine's target.
//! 3. If it is older, the steps registered for each later version run in
//!    ascending order. Versions without a step are skipped.
//! 4. The caller writes the migrated record back at the target version.
//!
//! ## Key Concepts
//!
//! - **Lazy, per record**: the version lives on the record, so stores with
//!   mixed-version data migrate each item independently.
//! - **Forward tolerant**: records at or above the target are left alone.
//! - **Async steps**: a step may await I/O before producing its value.

mod engine;
mod envelope;

pub use engine::{async_step, sync_step, Migrated, MigrationEngine, MigrationError, MigrationStep};
pub use envelope::{EnvelopeError, StoredRecord, ENVELOPE_HEADER_SIZE, MAGIC_BYTE};
