//! Named broadcast channels connecting sibling store instances.
//!
//! The store never talks to a global channel directly; it is handed a
//! [`MessageBus`] at construction. [`LocalBus`] connects every instance that
//! shares it inside one process. Other transports (a cross-process socket, a
//! browser `BroadcastChannel` under wasm) implement the same trait.

use std::collections::HashMap;
use std::fmt;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use futures_util::{Stream, StreamExt};
use serde_json::Value;
use tokio::sync::broadcast;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tracing::warn;

/// Default buffer per channel before slow receivers start dropping messages.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Process-unique identity of one bus participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(u64);

impl InstanceId {
    /// Allocate a fresh id.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw id.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Payloads delivered to one subscriber.
pub type Subscription = Pin<Box<dyn Stream<Item = Value> + Send>>;

/// Broadcast-to-others capability.
///
/// Delivery is asynchronous, best-effort and fire-and-forget: there is no
/// acknowledgment and no retry. A subscriber never receives payloads it
/// published itself.
pub trait MessageBus: Send + Sync {
    /// Send `payload` to every other subscriber of `channel`.
    fn publish(&self, channel: &str, origin: InstanceId, payload: Value);

    /// Receive payloads published on `channel` by anyone but `origin`.
    ///
    /// Only payloads published after this call are delivered.
    fn subscribe(&self, channel: &str, origin: InstanceId) -> Subscription;
}

#[derive(Debug, Clone)]
struct Frame {
    origin: InstanceId,
    payload: Value,
}

/// In-process [`MessageBus`] backed by one `tokio::sync::broadcast` channel
/// per name. Clones share the same channels.
///
/// A channel exists only while it has subscribers. Publishing to a name
/// nobody listens on is a no-op, and channels whose last subscriber went
/// away are dropped on the next publish or subscribe.
#[derive(Clone)]
pub struct LocalBus {
    channels: Arc<Mutex<HashMap<String, broadcast::Sender<Frame>>>>,
    capacity: usize,
}

impl fmt::Debug for LocalBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self
            .channels
            .lock()
            .map(|c| c.keys().cloned().collect())
            .unwrap_or_default();
        f.debug_struct("LocalBus")
            .field("channels", &names)
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl Default for LocalBus {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }
}

impl LocalBus {
    /// Create a bus with the default per-channel capacity.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a bus buffering up to `capacity` messages per channel.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: Arc::new(Mutex::new(HashMap::new())),
            capacity: capacity.max(1),
        }
    }

    /// Number of live subscribers on `channel`.
    pub fn receiver_count(&self, channel: &str) -> usize {
        self.channels
            .lock()
            .ok()
            .and_then(|c| c.get(channel).map(broadcast::Sender::receiver_count))
            .unwrap_or(0)
    }

    /// Number of channels currently held open.
    pub fn channel_count(&self) -> usize {
        self.channels.lock().map(|c| c.len()).unwrap_or(0)
    }
}

impl MessageBus for LocalBus {
    fn publish(&self, channel: &str, origin: InstanceId, payload: Value) {
        let Ok(mut channels) = self.channels.lock() else {
            return;
        };
        let live = channels
            .get(channel)
            .filter(|tx| tx.receiver_count() > 0)
            .cloned();
        let Some(tx) = live else {
            channels.remove(channel);
            return;
        };
        drop(channels);
        // A subscriber may have gone since the check; that is not an error.
        let _ = tx.send(Frame { origin, payload });
    }

    fn subscribe(&self, channel: &str, origin: InstanceId) -> Subscription {
        let Ok(mut channels) = self.channels.lock() else {
            return Box::pin(futures_util::stream::empty());
        };
        channels.retain(|_, tx| tx.receiver_count() > 0);
        let rx = channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe();
        drop(channels);

        let channel = channel.to_string();
        let frames = BroadcastStream::new(rx).filter_map(move |frame| {
            let delivered = match frame {
                Ok(frame) if frame.origin != origin => Some(frame.payload),
                Ok(_) => None,
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    warn!(%channel, %origin, skipped, "subscriber lagged, messages dropped");
                    None
                }
            };
            futures_util::future::ready(delivered)
        });
        Box::pin(frames)
    }
}
