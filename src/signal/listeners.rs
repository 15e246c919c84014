use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};

use tracing::error;

type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Registry side of a [`Subscription`].
trait Detach: Send + Sync {
    fn detach(&self, id: u64) -> bool;
}

struct Table<T> {
    next_id: AtomicU64,
    entries: RwLock<Vec<(u64, Listener<T>)>>,
}

impl<T> Detach for Table<T>
where
    T: 'static,
{
    fn detach(&self, id: u64) -> bool {
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|(entry_id, _)| *entry_id != id);
        entries.len() != before
    }
}

/// Ordered set of callbacks sharing one payload type.
///
/// Cloning yields another handle to the same registry. Delivery copies the
/// current listener list first, so a listener may subscribe or unsubscribe
/// from inside a callback. A panicking listener is logged and skipped; the
/// remaining listeners still run.
pub struct Listeners<T> {
    table: Arc<Table<T>>,
}

impl<T> Clone for Listeners<T> {
    fn clone(&self) -> Self {
        Listeners {
            table: Arc::clone(&self.table),
        }
    }
}

impl<T: 'static> Default for Listeners<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> Listeners<T> {
    pub fn new() -> Self {
        Listeners {
            table: Arc::new(Table {
                next_id: AtomicU64::new(1),
                entries: RwLock::new(Vec::new()),
            }),
        }
    }

    pub fn add<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = self.table.next_id.fetch_add(1, Ordering::Relaxed);
        self.table
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(listener)));

        let table: Arc<dyn Detach> = self.table.clone();
        Subscription {
            id,
            registry: Arc::downgrade(&table),
        }
    }

    /// Remove a subscription made on this registry. Returns false when it was
    /// already removed or belongs to another registry.
    pub fn remove(&self, subscription: &Subscription) -> bool {
        if !self.owns(subscription) {
            return false;
        }
        self.table.detach(subscription.id)
    }

    /// Deliver `payload` to every listener in registration order. Returns the
    /// number of listeners that completed without panicking.
    pub fn emit(&self, payload: &T) -> usize {
        self.emit_while(payload, || true)
    }

    /// Like [`emit`](Self::emit), but `proceed` is checked before each
    /// listener and delivery stops at the first `false`.
    pub fn emit_while<P>(&self, payload: &T, proceed: P) -> usize
    where
        P: Fn() -> bool,
    {
        let listeners: Vec<(u64, Listener<T>)> = self
            .table
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let mut delivered = 0;
        for (id, listener) in listeners {
            if !proceed() {
                break;
            }
            match panic::catch_unwind(AssertUnwindSafe(|| listener(payload))) {
                Ok(()) => delivered += 1,
                Err(cause) => {
                    error!(listener = id, reason = %panic_message(&cause), "listener panicked");
                }
            }
        }
        delivered
    }

    pub fn len(&self) -> usize {
        self.table
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn owns(&self, subscription: &Subscription) -> bool {
        std::ptr::eq(
            subscription.registry.as_ptr() as *const (),
            Arc::as_ptr(&self.table) as *const (),
        )
    }
}

/// Run a callback owned by a background thread, logging instead of
/// unwinding through the thread's loop.
pub(crate) fn run_isolated<F: FnOnce()>(what: &'static str, callback: F) -> bool {
    match panic::catch_unwind(AssertUnwindSafe(callback)) {
        Ok(()) => true,
        Err(cause) => {
            error!(callback = what, reason = %panic_message(&cause), "callback panicked");
            false
        }
    }
}

fn panic_message(cause: &Box<dyn Any + Send>) -> String {
    if let Some(message) = cause.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = cause.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Registration of one callback on a [`Listeners`] registry.
///
/// Dropping a subscription does not remove the callback; call [`cancel`]
/// (or the owning signal's `unsubscribe`). Cancelling twice is a no-op.
///
/// [`cancel`]: Subscription::cancel
pub struct Subscription {
    id: u64,
    registry: Weak<dyn Detach>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn cancel(&self) -> bool {
        match self.registry.upgrade() {
            Some(registry) => registry.detach(self.id),
            None => false,
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("registry_alive", &(self.registry.strong_count() > 0))
            .finish()
    }
}
