//! Cross-context watchers.
//!
//! A watcher observes a medium for writes made by other contexts and calls
//! back with no payload; the caller reloads the slot itself. Each medium
//! supplies its own watcher through [`KeyValueStore::watcher`].
//!
//! [`KeyValueStore::watcher`]: crate::KeyValueStore::watcher

#[cfg(feature = "file")]
mod file;
mod storage_event;

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::SyncError;

#[cfg(feature = "file")]
pub use file::FileWatcher;
pub use storage_event::StorageEventWatcher;

/// Callback invoked once per observed foreign change.
pub type ForeignChange = Arc<dyn Fn() + Send + Sync>;

pub trait Watcher: Send + Sync {
    /// Begin observing `key`. Observation lasts until the returned handle is
    /// stopped or dropped.
    fn start(&self, key: &str, on_foreign_change: ForeignChange) -> Result<WatchHandle, SyncError>;
}

/// A running observation. Stopping is idempotent and also happens on drop.
pub struct WatchHandle {
    stop: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl WatchHandle {
    pub fn new<F>(stop: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        WatchHandle {
            stop: Mutex::new(Some(Box::new(stop))),
        }
    }

    /// A handle with nothing to stop.
    pub fn inert() -> Self {
        WatchHandle {
            stop: Mutex::new(None),
        }
    }

    pub fn stop(&self) {
        let stop = self
            .stop
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(stop) = stop {
            stop();
        }
    }

    pub fn is_active(&self) -> bool {
        self.stop
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchHandle")
            .field("active", &self.is_active())
            .finish()
    }
}

/// Watcher for media with no cross-context transport. Never fires; the
/// reconciliation timer alone picks up foreign writes.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledWatcher;

impl Watcher for DisabledWatcher {
    fn start(
        &self,
        _key: &str,
        _on_foreign_change: ForeignChange,
    ) -> Result<WatchHandle, SyncError> {
        Ok(WatchHandle::inert())
    }
}
