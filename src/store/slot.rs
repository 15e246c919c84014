use tracing::{debug, warn};

use super::KeyValueStore;
use crate::error::{PersistenceError, StoreError};
use crate::record::RecordCollection;

/// Access to one named slot of a medium.
///
/// No retries here; callers decide what a failed write means.
pub struct SlotAdapter<S> {
    store: S,
    key: String,
}

impl<S: KeyValueStore> SlotAdapter<S> {
    pub fn new(store: S, key: impl Into<String>) -> Self {
        SlotAdapter {
            store,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Read the slot. Absent or undecodable contents yield an empty
    /// collection; only a failing medium is an error.
    pub fn read(&self) -> Result<RecordCollection, StoreError> {
        let Some(bytes) = self.store.get(&self.key)? else {
            debug!(slot = %self.key, "slot absent, starting empty");
            return Ok(RecordCollection::new());
        };

        match serde_json::from_slice(&bytes) {
            Ok(collection) => Ok(collection),
            Err(err) => {
                warn!(slot = %self.key, error = %err, "slot is corrupt, treating as empty");
                Ok(RecordCollection::new())
            }
        }
    }

    /// Read the slot, falling back to an empty collection on any failure.
    pub fn load(&self) -> RecordCollection {
        self.read().unwrap_or_else(|err| {
            warn!(slot = %self.key, error = %err, "slot read failed, treating as empty");
            RecordCollection::new()
        })
    }

    /// Serialize and write the collection. Creates the slot if absent.
    pub fn save(&self, collection: &RecordCollection) -> Result<(), PersistenceError> {
        let bytes = serde_json::to_vec(collection).map_err(|source| PersistenceError::Encode {
            key: self.key.clone(),
            source,
        })?;

        self.store
            .set(&self.key, &bytes)
            .map_err(|source| PersistenceError::Rejected {
                key: self.key.clone(),
                source,
            })
    }
}
