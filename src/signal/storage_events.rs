//! Cross-context storage notifications.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ChangeSignal, Listeners, Subscription};

/// Identity of one execution context sharing a storage medium.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContextId(Uuid);

impl ContextId {
    pub fn new() -> Self {
        ContextId(Uuid::new_v4())
    }
}

impl Default for ContextId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A slot was written or removed. Carries no data: receivers reload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEvent {
    pub key: String,
    pub origin: ContextId,
}

/// Channel reaching every context attached to one medium.
#[derive(Clone, Default)]
pub struct StorageEvents {
    listeners: Listeners<StorageEvent>,
}

impl StorageEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscriber_count(&self) -> usize {
        self.listeners.len()
    }
}

impl ChangeSignal<StorageEvent> for StorageEvents {
    fn subscribe(&self, listener: Box<dyn Fn(&StorageEvent) + Send + Sync>) -> Subscription {
        self.listeners.add(move |event: &StorageEvent| listener(event))
    }

    fn publish(&self, payload: &StorageEvent) {
        self.listeners.emit(payload);
    }

    fn unsubscribe(&self, subscription: &Subscription) {
        self.listeners.remove(subscription);
    }
}
