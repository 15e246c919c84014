//! Change signals - notification channels with different reachability.
//!
//! ```text
//! ┌──────────────────────────────┐     ┌──────────────────────────────┐
//! │ ChangeBus (one per context)  │     │ StorageEvents (per medium)   │
//! │ payload: SlotChange          │     │ payload: StorageEvent        │
//! │ reach: same context only     │     │ reach: every context sharing │
//! │                              │     │        the medium            │
//! └──────────────┬───────────────┘     └──────────────┬───────────────┘
//!                │                                    │
//!                └────────── ChangeSignal<T> ─────────┘
//!                         (Listeners<T> registry)
//! ```
//!
//! Both channels deliver synchronously, in registration order, with each
//! listener isolated from the others' panics.

mod bus;
mod listeners;
mod storage_events;

pub use bus::{ChangeBus, HandleId, SlotChange};
pub use listeners::{Listeners, Subscription};
pub(crate) use listeners::run_isolated;
pub use storage_events::{ContextId, StorageEvent, StorageEvents};

/// A notification channel.
pub trait ChangeSignal<T>: Send + Sync {
    /// Register a callback; it stays registered until unsubscribed.
    fn subscribe(&self, listener: Box<dyn Fn(&T) + Send + Sync>) -> Subscription;

    /// Deliver `payload` to every current subscriber.
    fn publish(&self, payload: &T);

    /// Idempotent: removing an already removed subscription does nothing.
    fn unsubscribe(&self, subscription: &Subscription);
}

impl<T> ChangeSignal<T> for Listeners<T>
where
    T: 'static,
{
    fn subscribe(&self, listener: Box<dyn Fn(&T) + Send + Sync>) -> Subscription {
        self.add(move |payload: &T| listener(payload))
    }

    fn publish(&self, payload: &T) {
        self.emit(payload);
    }

    fn unsubscribe(&self, subscription: &Subscription) {
        self.remove(subscription);
    }
}
