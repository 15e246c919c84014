use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::trace;

use super::KeyValueStore;
use crate::error::StoreError;
use crate::signal::{ChangeSignal, ContextId, StorageEvent, StorageEvents};
use crate::watch::{StorageEventWatcher, Watcher};

/// Shared in-memory medium, the moral equivalent of a browser's local
/// storage: one map reachable from every context opened on it.
///
/// Clone to share. Writes are made through a [`MemoryContext`] so each
/// write is tagged with the context it came from.
///
/// ## Example
///
/// ```
/// use booking_sync::{KeyValueStore, MemoryStorage};
///
/// let storage = MemoryStorage::new();
/// let tab_a = storage.context();
/// let tab_b = storage.context();
///
/// tab_a.set("bookings", b"[]").unwrap();
/// assert_eq!(tab_b.get("bookings").unwrap(), Some(b"[]".to_vec()));
/// ```
#[derive(Clone, Default)]
pub struct MemoryStorage {
    inner: Arc<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    slots: RwLock<HashMap<String, Vec<u8>>>,
    /// Upper bound on key + value bytes across all slots.
    quota: Option<usize>,
    events: StorageEvents,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// A medium that rejects writes once stored keys and values would exceed
    /// `quota` bytes.
    pub fn with_quota(quota: usize) -> Self {
        MemoryStorage {
            inner: Arc::new(MemoryInner {
                quota: Some(quota),
                ..MemoryInner::default()
            }),
        }
    }

    /// Open a new context on this medium.
    pub fn context(&self) -> MemoryContext {
        MemoryContext {
            storage: self.clone(),
            origin: ContextId::new(),
        }
    }

    /// Cross-context notifications for this medium.
    pub fn events(&self) -> &StorageEvents {
        &self.inner.events
    }

    /// Bytes currently used by keys and values.
    pub fn usage(&self) -> Result<usize, StoreError> {
        let slots = self
            .inner
            .slots
            .read()
            .map_err(|_| StoreError::LockPoisoned("usage"))?;
        Ok(slots.iter().map(|(key, value)| key.len() + value.len()).sum())
    }

    fn write(&self, origin: ContextId, key: &str, value: &[u8]) -> Result<(), StoreError> {
        {
            let mut slots = self
                .inner
                .slots
                .write()
                .map_err(|_| StoreError::LockPoisoned("write"))?;

            if let Some(quota) = self.inner.quota {
                let others: usize = slots
                    .iter()
                    .filter(|(existing, _)| existing.as_str() != key)
                    .map(|(existing, bytes)| existing.len() + bytes.len())
                    .sum();
                let needed = others + key.len() + value.len();
                if needed > quota {
                    return Err(StoreError::QuotaExceeded {
                        key: key.to_string(),
                        needed,
                        quota,
                    });
                }
            }

            slots.insert(key.to_string(), value.to_vec());
        }

        self.notify(origin, key);
        Ok(())
    }

    fn delete(&self, origin: ContextId, key: &str) -> Result<bool, StoreError> {
        let existed = self
            .inner
            .slots
            .write()
            .map_err(|_| StoreError::LockPoisoned("remove"))?
            .remove(key)
            .is_some();

        if existed {
            self.notify(origin, key);
        }
        Ok(existed)
    }

    fn notify(&self, origin: ContextId, key: &str) {
        trace!(slot = key, %origin, "storage event");
        self.inner.events.publish(&StorageEvent {
            key: key.to_string(),
            origin,
        });
    }
}

/// One execution context's view of a [`MemoryStorage`].
#[derive(Clone)]
pub struct MemoryContext {
    storage: MemoryStorage,
    origin: ContextId,
}

impl MemoryContext {
    pub fn origin(&self) -> ContextId {
        self.origin
    }

    pub fn storage(&self) -> &MemoryStorage {
        &self.storage
    }
}

impl KeyValueStore for MemoryContext {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let slots = self
            .storage
            .inner
            .slots
            .read()
            .map_err(|_| StoreError::LockPoisoned("read"))?;
        Ok(slots.get(key).cloned())
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.storage.write(self.origin, key, value)
    }

    fn remove(&self, key: &str) -> Result<bool, StoreError> {
        self.storage.delete(self.origin, key)
    }

    fn watcher(&self) -> Arc<dyn Watcher> {
        Arc::new(StorageEventWatcher::new(
            self.storage.events().clone(),
            self.origin,
        ))
    }
}
