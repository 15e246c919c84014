//! In-process change bus.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::trace;

use super::{ChangeSignal, Listeners, Subscription};
use crate::record::Snapshot;

/// Identifies the handle that produced a [`SlotChange`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandleId(pub(crate) u64);

impl HandleId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        HandleId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// A new snapshot of one slot, as published on the bus.
#[derive(Debug, Clone)]
pub struct SlotChange {
    pub key: String,
    /// Context-wide ordering stamp from [`ChangeBus::next_revision`].
    pub revision: u64,
    pub source: HandleId,
    pub snapshot: Snapshot,
}

/// Publish/subscribe channel for one execution context.
///
/// Every handle mounted in the context subscribes here, so a write through
/// one handle reaches its siblings immediately. Clone to share.
#[derive(Clone, Default)]
pub struct ChangeBus {
    listeners: Listeners<SlotChange>,
    revisions: Arc<AtomicU64>,
}

impl ChangeBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&SlotChange) + Send + Sync + 'static,
    {
        self.listeners.add(listener)
    }

    pub fn publish(&self, change: &SlotChange) {
        let delivered = self.listeners.emit(change);
        trace!(slot = %change.key, revision = change.revision, delivered, "published slot change");
    }

    pub fn unsubscribe(&self, subscription: &Subscription) {
        self.listeners.remove(subscription);
    }

    /// Hand out the next revision. Revisions only grow.
    pub fn next_revision(&self) -> u64 {
        self.revisions.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn subscriber_count(&self) -> usize {
        self.listeners.len()
    }
}

impl ChangeSignal<SlotChange> for ChangeBus {
    fn subscribe(&self, listener: Box<dyn Fn(&SlotChange) + Send + Sync>) -> Subscription {
        self.listeners.add(move |change: &SlotChange| listener(change))
    }

    fn publish(&self, payload: &SlotChange) {
        ChangeBus::publish(self, payload);
    }

    fn unsubscribe(&self, subscription: &Subscription) {
        ChangeBus::unsubscribe(self, subscription);
    }
}
