//! Reactive cells.
//!
//! A [`Cell`] holds a value and notifies subscribers when it changes. A
//! [`Derived`] is a read-only projection of a cell that recomputes from the
//! cell's current value each time it is read, so it can never go stale.
//!
//! ```
//! use kvsync::cell::Cell;
//!
//! let count = Cell::new(1);
//! let doubled = count.derive(|n| n * 2);
//! count.set(21);
//! assert_eq!(doubled.get(), 42);
//! ```

use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::watch;

/// The cell feeding a [`Derived`] was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("source cell closed")]
pub struct CellClosed;

/// A writable cell. Clones share the same value.
pub struct Cell<T> {
    tx: Arc<watch::Sender<T>>,
}

impl<T> Clone for Cell<T> {
    fn clone(&self) -> Self {
        Self {
            tx: Arc::clone(&self.tx),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Cell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Cell").field(&*self.tx.borrow()).finish()
    }
}

impl<T: Send + Sync + 'static> Cell<T> {
    /// Create a cell holding `value`.
    pub fn new(value: T) -> Self {
        let (tx, _) = watch::channel(value);
        Self { tx: Arc::new(tx) }
    }

    /// Borrow the current value for the duration of `f`.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.tx.borrow())
    }

    /// Replace the value and notify subscribers.
    pub fn set(&self, value: T) {
        self.tx.send_replace(value);
    }

    /// Mutate the value in place. Subscribers are notified only if `f`
    /// returns `true`.
    pub fn update(&self, f: impl FnOnce(&mut T) -> bool) -> bool {
        self.tx.send_if_modified(f)
    }

    /// Derive a read-only cell that projects this cell's value through `f`.
    pub fn derive<U>(&self, f: impl Fn(&T) -> U + Send + Sync + 'static) -> Derived<T, U> {
        Derived {
            rx: self.tx.subscribe(),
            project: Arc::new(f),
        }
    }

    /// A raw watch receiver positioned at the current value.
    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.tx.subscribe()
    }
}

impl<T: Clone + Send + Sync + 'static> Cell<T> {
    /// A clone of the current value.
    pub fn get(&self) -> T {
        self.tx.borrow().clone()
    }

    /// A read-only view of this cell.
    pub fn read_only(&self) -> Derived<T, T> {
        self.derive(T::clone)
    }
}

/// A read-only cell computed from a source cell.
///
/// Each `Derived` tracks which source versions it has observed, so
/// [`changed`](Self::changed) resolves once per source update. Clones share
/// the projection but track observation independently.
pub struct Derived<S, T> {
    rx: watch::Receiver<S>,
    project: Arc<dyn Fn(&S) -> T + Send + Sync>,
}

impl<S, T> Clone for Derived<S, T> {
    fn clone(&self) -> Self {
        Self {
            rx: self.rx.clone(),
            project: Arc::clone(&self.project),
        }
    }
}

impl<S, T: fmt::Debug> fmt::Debug for Derived<S, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Derived")
            .field(&(self.project)(&self.rx.borrow()))
            .finish()
    }
}

impl<S: Send + Sync + 'static, T: 'static> Derived<S, T> {
    /// Compute the current value.
    pub fn get(&self) -> T {
        (self.project)(&self.rx.borrow())
    }

    fn get_and_mark(&mut self) -> T {
        (self.project)(&self.rx.borrow_and_update())
    }

    /// Wait for the source to change, then return the new projection.
    pub async fn changed(&mut self) -> Result<T, CellClosed> {
        self.rx.changed().await.map_err(|_| CellClosed)?;
        Ok(self.get_and_mark())
    }

    /// Wait until the projection satisfies `pred`, checking the current
    /// value first.
    pub async fn wait_for(&mut self, mut pred: impl FnMut(&T) -> bool) -> Result<T, CellClosed> {
        loop {
            let value = self.get_and_mark();
            if pred(&value) {
                return Ok(value);
            }
            self.rx.changed().await.map_err(|_| CellClosed)?;
        }
    }

    /// Project further through `f`.
    pub fn map<U: 'static>(&self, f: impl Fn(T) -> U + Send + Sync + 'static) -> Derived<S, U> {
        let inner = Arc::clone(&self.project);
        let project: Arc<dyn Fn(&S) -> U + Send + Sync> = Arc::new(move |s: &S| f(inner(s)));
        Derived {
            rx: self.rx.clone(),
            project,
        }
    }

    /// A fresh observer that has seen the current source version.
    pub fn subscribe(&self) -> Self {
        let mut rx = self.rx.clone();
        rx.borrow_and_update();
        Self {
            rx,
            project: Arc::clone(&self.project),
        }
    }
}

impl<S: Send + Sync + 'static, T: PartialEq + 'static> Derived<S, T> {
    /// Wait until the projected value differs from what it is now.
    ///
    /// Source updates that leave the projection unchanged are skipped.
    pub async fn changed_distinct(&mut self) -> Result<T, CellClosed> {
        let current = self.get_and_mark();
        self.wait_for(|value| *value != current).await
    }
}
