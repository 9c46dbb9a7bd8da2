//! Convenient re-exports for common usage.
//!
//! ```
//! use kvsync::prelude::*;
//! ```

pub use crate::InitStatus;
pub use crate::ItemCell;
pub use crate::LocalBus;
pub use crate::MemoryBackend;
pub use crate::MessageBus;
pub use crate::Store;
pub use crate::StoreConfig;
pub use crate::StoreError;
pub use crate::SyncState;
pub use crate::{async_step, sync_step};
