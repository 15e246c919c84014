use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::channel;
use std::sync::{Arc, Mutex};
use std::thread;

use tracing::{debug, trace};

use super::{ForeignChange, WatchHandle, Watcher};
use crate::error::SyncError;
use crate::signal::{run_isolated, ChangeSignal, ContextId, StorageEvent, StorageEvents};

/// Watches a medium's [`StorageEvents`] for writes by other contexts.
///
/// Events whose origin is this watcher's own context are dropped, so a
/// context never reloads because of its own write. Matching events are
/// handed to a dedicated thread: the callback never runs on the writer's
/// thread, and runs once per event.
#[derive(Clone)]
pub struct StorageEventWatcher {
    events: StorageEvents,
    origin: ContextId,
}

impl StorageEventWatcher {
    pub fn new(events: StorageEvents, origin: ContextId) -> Self {
        StorageEventWatcher { events, origin }
    }
}

impl Watcher for StorageEventWatcher {
    fn start(&self, key: &str, on_foreign_change: ForeignChange) -> Result<WatchHandle, SyncError> {
        let (tx, rx) = channel::<()>();
        let tx = Mutex::new(tx);
        let stopped = Arc::new(AtomicBool::new(false));

        let watched = key.to_string();
        let origin = self.origin;
        let subscription = self.events.subscribe(Box::new(move |event: &StorageEvent| {
            if event.key != watched || event.origin == origin {
                return;
            }
            trace!(slot = %event.key, from = %event.origin, "foreign storage event");
            if let Ok(tx) = tx.lock() {
                let _ = tx.send(());
            }
        }));

        let thread_stopped = Arc::clone(&stopped);
        let slot = key.to_string();
        let spawned = thread::Builder::new()
            .name("sync-watch".to_string())
            .spawn(move || {
                // Ends once the subscription, and with it the sender, is gone.
                while rx.recv().is_ok() {
                    if thread_stopped.load(Ordering::SeqCst) {
                        break;
                    }
                    run_isolated("foreign change", || on_foreign_change());
                }
                debug!(slot = %slot, "storage event watcher exited");
            });

        if let Err(source) = spawned {
            subscription.cancel();
            return Err(SyncError::Spawn {
                name: "sync-watch",
                source,
            });
        }

        Ok(WatchHandle::new(move || {
            stopped.store(true, Ordering::SeqCst);
            subscription.cancel();
        }))
    }
}
