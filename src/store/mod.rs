//! Storage media and the slot adapter on top of them.
//!
//! A medium is any [`KeyValueStore`]: a flat map from slot key to bytes that
//! several execution contexts can share. [`SlotAdapter`] turns one key of a
//! medium into a record collection.

#[cfg(feature = "file")]
mod file;
mod memory;
mod slot;

use std::sync::Arc;

use crate::error::StoreError;
use crate::watch::{DisabledWatcher, Watcher};

#[cfg(feature = "file")]
pub use file::FileStorage;
pub use memory::{MemoryContext, MemoryStorage};
pub use slot::SlotAdapter;

/// Byte-level access to a storage medium shared between contexts.
pub trait KeyValueStore: Send + Sync + 'static {
    /// Read a slot. `Ok(None)` when the slot has never been written.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Write a slot, replacing any previous value. Last writer wins.
    fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError>;

    /// Delete a slot. Returns whether it existed.
    fn remove(&self, key: &str) -> Result<bool, StoreError>;

    /// The watcher that observes writes made to this medium by other contexts.
    fn watcher(&self) -> Arc<dyn Watcher> {
        Arc::new(DisabledWatcher)
    }
}

impl<S> KeyValueStore for Arc<S>
where
    S: KeyValueStore + ?Sized,
{
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<bool, StoreError> {
        (**self).remove(key)
    }

    fn watcher(&self) -> Arc<dyn Watcher> {
        (**self).watcher()
    }
}
