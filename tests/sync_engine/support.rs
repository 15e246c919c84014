//! Shared helpers: record builders, a polling wait, render counters and a
//! store whose reads and writes can be held open.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use booking_sync::{
    ChangeBus, KeyValueStore, MemoryContext, MemoryStorage, RecordCollection, StoreError,
    SyncedCollection, Watcher,
};
use serde_json::{json, Value};

pub const PATIENCE: Duration = Duration::from_secs(5);

pub fn collection(value: Value) -> RecordCollection {
    RecordCollection::try_from(value).unwrap()
}

/// Bookings with ids `1..=n`.
pub fn bookings(n: u64) -> RecordCollection {
    collection(Value::Array(
        (1..=n)
            .map(|id| json!({"id": id, "status": "requested"}))
            .collect(),
    ))
}

/// Poll `check` until it holds or `PATIENCE` runs out.
pub fn wait_until(mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + PATIENCE;
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    check()
}

/// A handle in its own context on `storage`, relying on the timer alone.
pub fn timer_only(storage: &MemoryStorage, interval: Duration) -> SyncedCollection<MemoryContext> {
    SyncedCollection::builder(storage.context(), ChangeBus::new())
        .without_watcher()
        .with_reconcile_interval(interval)
        .build()
        .unwrap()
}

/// A handle in its own context on `storage`, with the storage-event watcher
/// and a timer too slow to matter during a test.
pub fn watching(storage: &MemoryStorage) -> SyncedCollection<MemoryContext> {
    SyncedCollection::builder(storage.context(), ChangeBus::new())
        .with_reconcile_interval(Duration::from_secs(600))
        .build()
        .unwrap()
}

/// Counts `on_change` deliveries.
#[derive(Clone, Default)]
pub struct RenderCount(Arc<AtomicUsize>);

impl RenderCount {
    pub fn attach<S: KeyValueStore>(handle: &SyncedCollection<S>) -> Self {
        let count = RenderCount::default();
        let inner = Arc::clone(&count.0);
        handle.on_change(move |_| {
            inner.fetch_add(1, Ordering::SeqCst);
        });
        count
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
struct GateState {
    armed: bool,
    held: bool,
}

/// Parks the next caller of [`Gate::pass`] until released.
#[derive(Clone, Default)]
pub struct Gate {
    state: Arc<(Mutex<GateState>, Condvar)>,
}

impl Gate {
    /// The next `pass` blocks until [`Gate::release`].
    pub fn arm(&self) {
        let (lock, _) = &*self.state;
        let mut state = lock.lock().unwrap();
        state.armed = true;
        state.held = false;
    }

    /// Wait until a caller is parked at the gate.
    pub fn wait_held(&self) -> bool {
        let (lock, wake) = &*self.state;
        let state = lock.lock().unwrap();
        let (state, _) = wake
            .wait_timeout_while(state, PATIENCE, |state| !state.held)
            .unwrap();
        state.held
    }

    pub fn release(&self) {
        let (lock, wake) = &*self.state;
        let mut state = lock.lock().unwrap();
        state.armed = false;
        wake.notify_all();
    }

    /// Park here if armed.
    pub fn pass(&self) {
        let (lock, wake) = &*self.state;
        let mut state = lock.lock().unwrap();
        if !state.armed {
            return;
        }
        state.held = true;
        wake.notify_all();
        let mut state = wake.wait_while(state, |state| state.armed).unwrap();
        state.held = false;
    }
}

/// Wraps a medium so a test can freeze a read or a write mid-flight.
#[derive(Clone)]
pub struct GatedStore<S> {
    inner: S,
    gate: Gate,
    write_gate: Gate,
}

impl<S: KeyValueStore> GatedStore<S> {
    pub fn new(inner: S) -> Self {
        GatedStore {
            inner,
            gate: Gate::default(),
            write_gate: Gate::default(),
        }
    }

    /// Gate in front of `get`.
    pub fn gate(&self) -> Gate {
        self.gate.clone()
    }

    /// Gate in front of `set`.
    pub fn write_gate(&self) -> Gate {
        self.write_gate.clone()
    }
}

impl<S: KeyValueStore> KeyValueStore for GatedStore<S> {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.gate.pass();
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.write_gate.pass();
        self.inner.set(key, value)
    }

    fn remove(&self, key: &str) -> Result<bool, StoreError> {
        self.inner.remove(key)
    }

    fn watcher(&self) -> Arc<dyn Watcher> {
        self.inner.watcher()
    }
}

/// A medium whose reads always fail.
#[derive(Clone, Default)]
pub struct BrokenStore {
    pub fail_reads: Arc<std::sync::atomic::AtomicBool>,
    pub inner: MemoryStorage,
}

impl KeyValueStore for BrokenStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Rejected("medium unavailable".to_string()));
        }
        self.inner.context().get(key)
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.inner.context().set(key, value)
    }

    fn remove(&self, key: &str) -> Result<bool, StoreError> {
        self.inner.context().remove(key)
    }
}
