//! Synchronized collection handle.
//!
//! The handle ties the slot adapter, the context's change bus, the medium's
//! watcher and a reconciliation timer together:
//!
//! ```text
//!   write ──► SlotAdapter::save ──► snapshot ──► ChangeBus::publish ──► sibling handles
//!                                                       ▲
//!   Watcher ─┐                                          │
//!            ├─► refresh ──► SlotAdapter::read ─────────┘
//!   Timer ───┘
//! ```
//!
//! Ordering within a context uses bus revisions. A refresh takes its
//! revision before reading and a write takes its revision after saving, and
//! a change is applied only when its revision is newer than the last one
//! applied. A read that started before a write therefore cannot overwrite
//! that write's snapshot.
//!
//! Each mount bumps the handle's generation and every callback it registers
//! carries that generation. Results from an older generation (a refresh
//! that was still reading when the handle unmounted, a timer tick in flight)
//! are discarded.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::record::{RecordCollection, Snapshot};
use crate::signal::{ChangeBus, HandleId, Listeners, SlotChange, Subscription};
use crate::store::{KeyValueStore, SlotAdapter};
use crate::timer::ReconciliationTimer;
use crate::watch::{DisabledWatcher, WatchHandle, Watcher};

/// Lifecycle of a handle's snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Never mounted.
    Uninitialized,
    /// First load in progress.
    Loading,
    /// A snapshot has been delivered. Later reloads happen in place.
    Ready,
}

/// What a refresh did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refresh {
    /// A new snapshot was applied and published.
    Applied,
    /// The slot matched the current snapshot.
    Unchanged,
    /// The handle was not mounted, or unmounted before the result was
    /// delivered.
    Discarded,
    /// A newer change was applied while the read was in flight.
    Superseded,
    /// The medium failed; the last-known snapshot stays.
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Apply {
    Applied,
    Unchanged,
    Stale,
    Inactive,
}

struct HandleState {
    phase: Phase,
    snapshot: Snapshot,
    revision: u64,
    generation: u64,
    mounted: bool,
}

struct Mounted {
    subscription: Subscription,
    watch: WatchHandle,
    timer: ReconciliationTimer,
}

impl Mounted {
    fn teardown(self) {
        self.timer.stop();
        self.watch.stop();
        self.subscription.cancel();
    }
}

struct Inner<S> {
    id: HandleId,
    slot: SlotAdapter<S>,
    bus: ChangeBus,
    watcher: Arc<dyn Watcher>,
    reconcile_interval: Duration,
    state: Mutex<HandleState>,
    renders: Listeners<Snapshot>,
    resources: Mutex<Option<Mounted>>,
}

/// A consumer's view of one synchronized slot.
///
/// Clones share state. The last clone to drop unmounts the handle.
///
/// ## Example
///
/// ```
/// use booking_sync::{ChangeBus, MemoryStorage, RecordCollection, SyncedCollection};
/// use serde_json::json;
///
/// let storage = MemoryStorage::new();
/// let handle = SyncedCollection::builder(storage.context(), ChangeBus::new())
///     .build()
///     .unwrap();
/// handle.mount().unwrap();
///
/// let bookings = RecordCollection::try_from(json!([{"id": 1}])).unwrap();
/// handle.write(bookings.clone()).unwrap();
/// assert_eq!(*handle.snapshot(), bookings);
///
/// handle.unmount();
/// ```
pub struct SyncedCollection<S> {
    inner: Arc<Inner<S>>,
}

impl<S> Clone for SyncedCollection<S> {
    fn clone(&self) -> Self {
        SyncedCollection {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Options for a [`SyncedCollection`].
pub struct SyncedCollectionBuilder<S> {
    store: S,
    bus: ChangeBus,
    config: SyncConfig,
    watcher: Option<Arc<dyn Watcher>>,
}

impl<S: KeyValueStore> SyncedCollectionBuilder<S> {
    pub fn with_config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_slot_key(mut self, key: impl Into<String>) -> Self {
        self.config.slot_key = key.into();
        self
    }

    pub fn with_reconcile_interval(mut self, interval: Duration) -> Self {
        self.config = self.config.with_reconcile_interval(interval);
        self
    }

    /// Replace the medium's own watcher.
    pub fn with_watcher(mut self, watcher: Arc<dyn Watcher>) -> Self {
        self.watcher = Some(watcher);
        self
    }

    /// Rely on the reconciliation timer alone for foreign writes.
    pub fn without_watcher(self) -> Self {
        self.with_watcher(Arc::new(DisabledWatcher))
    }

    pub fn build(self) -> Result<SyncedCollection<S>, SyncError> {
        self.config.validate()?;

        let watcher = match self.watcher {
            Some(watcher) => watcher,
            None if self.config.watch_enabled => self.store.watcher(),
            None => Arc::new(DisabledWatcher),
        };

        Ok(SyncedCollection {
            inner: Arc::new(Inner {
                id: HandleId::next(),
                slot: SlotAdapter::new(self.store, self.config.slot_key.clone()),
                bus: self.bus,
                watcher,
                reconcile_interval: self.config.reconcile_interval(),
                state: Mutex::new(HandleState {
                    phase: Phase::Uninitialized,
                    snapshot: Arc::new(RecordCollection::new()),
                    revision: 0,
                    generation: 0,
                    mounted: false,
                }),
                renders: Listeners::new(),
                resources: Mutex::new(None),
            }),
        })
    }
}

impl<S: KeyValueStore> SyncedCollection<S> {
    pub fn builder(store: S, bus: ChangeBus) -> SyncedCollectionBuilder<S> {
        SyncedCollectionBuilder {
            store,
            bus,
            config: SyncConfig::default(),
            watcher: None,
        }
    }

    /// Subscribe to the bus, start the watcher and the timer, then load the
    /// slot. Does nothing if already mounted.
    pub fn mount(&self) -> Result<(), SyncError> {
        let inner = &self.inner;
        let mut resources = inner.lock_resources();
        if resources.is_some() {
            return Ok(());
        }

        let generation = {
            let mut state = inner.lock_state();
            state.generation += 1;
            state.mounted = true;
            if state.phase == Phase::Uninitialized {
                state.phase = Phase::Loading;
            }
            state.generation
        };

        let weak = Arc::downgrade(inner);
        let subscription = inner.bus.subscribe(move |change: &SlotChange| {
            if let Some(inner) = weak.upgrade() {
                inner.receive(generation, change);
            }
        });

        let watch = match inner
            .watcher
            .start(inner.slot.key(), Arc::new(refresher(inner, generation)))
        {
            Ok(watch) => watch,
            Err(err) => {
                subscription.cancel();
                inner.deactivate();
                return Err(err);
            }
        };

        let timer =
            match ReconciliationTimer::start(refresher(inner, generation), inner.reconcile_interval)
            {
                Ok(timer) => timer,
                Err(err) => {
                    watch.stop();
                    subscription.cancel();
                    inner.deactivate();
                    return Err(err);
                }
            };

        *resources = Some(Mounted {
            subscription,
            watch,
            timer,
        });
        drop(resources);

        info!(slot = %inner.slot.key(), generation, "collection mounted");
        inner.refresh_for(generation);
        Ok(())
    }

    /// Stop every channel feeding this handle. No callback reaches the
    /// handle afterwards, including loads that were already in flight.
    pub fn unmount(&self) {
        self.inner.teardown();
    }

    /// The current snapshot. Never blocks on I/O.
    pub fn snapshot(&self) -> Snapshot {
        Arc::clone(&self.inner.lock_state().snapshot)
    }

    /// Persist `collection`, make it this handle's snapshot and publish it to
    /// the context. On failure the snapshot is left as it was.
    ///
    /// Returns `NotMounted` if the handle unmounted while the write was being
    /// saved. The slot then holds `collection` but the snapshot does not.
    pub fn write(&self, collection: RecordCollection) -> Result<Snapshot, SyncError> {
        let inner = &self.inner;
        let generation = {
            let state = inner.lock_state();
            if !state.mounted {
                return Err(SyncError::NotMounted(inner.slot.key().to_string()));
            }
            state.generation
        };

        if let Err(err) = inner.slot.save(&collection) {
            warn!(slot = %inner.slot.key(), error = %err, "write rejected");
            return Err(err.into());
        }

        let revision = inner.bus.next_revision();
        let snapshot = Arc::new(collection);
        let outcome = inner.commit(generation, revision, Arc::clone(&snapshot));
        debug!(slot = %inner.slot.key(), revision, ?outcome, "write committed");
        if outcome == Apply::Inactive {
            return Err(SyncError::NotMounted(inner.slot.key().to_string()));
        }
        Ok(snapshot)
    }

    /// Reload the slot and publish it if it changed.
    pub fn refresh(&self) -> Refresh {
        let generation = {
            let state = self.inner.lock_state();
            if !state.mounted {
                return Refresh::Discarded;
            }
            state.generation
        };
        self.inner.refresh_for(generation)
    }

    /// Register a callback run after every snapshot change, whichever
    /// channel caused it. No callback starts once `unmount` has returned; one
    /// already running when unmount begins is allowed to finish.
    pub fn on_change<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&Snapshot) + Send + Sync + 'static,
    {
        self.inner.renders.add(listener)
    }

    pub fn phase(&self) -> Phase {
        self.inner.lock_state().phase
    }

    pub fn is_mounted(&self) -> bool {
        self.inner.lock_state().mounted
    }

    pub fn key(&self) -> &str {
        self.inner.slot.key()
    }

    pub fn id(&self) -> HandleId {
        self.inner.id
    }

    pub fn store(&self) -> &S {
        self.inner.slot.store()
    }
}

fn refresher<S: KeyValueStore>(
    inner: &Arc<Inner<S>>,
    generation: u64,
) -> impl Fn() + Send + Sync + 'static {
    let weak: Weak<Inner<S>> = Arc::downgrade(inner);
    move || {
        if let Some(inner) = weak.upgrade() {
            inner.refresh_for(generation);
        }
    }
}

impl<S> Inner<S> {
    fn lock_state(&self) -> MutexGuard<'_, HandleState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_resources(&self) -> MutexGuard<'_, Option<Mounted>> {
        self.resources.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn deactivate(&self) {
        let mut state = self.lock_state();
        if state.mounted {
            state.mounted = false;
            state.generation += 1;
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        let state = self.lock_state();
        state.mounted && state.generation == generation
    }

    fn apply(&self, generation: u64, change: &SlotChange) -> Apply {
        let mut state = self.lock_state();
        if !state.mounted || state.generation != generation {
            return Apply::Inactive;
        }
        if change.revision <= state.revision {
            return Apply::Stale;
        }

        state.revision = change.revision;
        let first = state.phase != Phase::Ready;
        state.phase = Phase::Ready;
        if !first && *state.snapshot == *change.snapshot {
            return Apply::Unchanged;
        }
        state.snapshot = Arc::clone(&change.snapshot);
        Apply::Applied
    }

    /// Each render callback starts only while `generation` is still mounted.
    fn render(&self, generation: u64, snapshot: &Snapshot) {
        self.renders.emit_while(snapshot, || self.is_current(generation));
    }

    fn teardown(&self) {
        let mounted = {
            let mut resources = self.lock_resources();
            self.deactivate();
            resources.take()
        };
        if let Some(mounted) = mounted {
            mounted.teardown();
        }
    }
}

impl<S: KeyValueStore> Inner<S> {
    /// Apply a change made by this handle, render it, and tell the context.
    fn commit(&self, generation: u64, revision: u64, snapshot: Snapshot) -> Apply {
        let change = SlotChange {
            key: self.slot.key().to_string(),
            revision,
            source: self.id,
            snapshot,
        };

        let outcome = self.apply(generation, &change);
        if outcome == Apply::Applied {
            self.render(generation, &change.snapshot);
        }
        if matches!(outcome, Apply::Applied | Apply::Unchanged) {
            self.bus.publish(&change);
        }
        outcome
    }

    /// A change published on the bus by another handle in this context.
    fn receive(&self, generation: u64, change: &SlotChange) {
        if change.source == self.id || change.key != self.slot.key() {
            return;
        }
        match self.apply(generation, change) {
            Apply::Applied => {
                debug!(slot = %change.key, revision = change.revision, "applied sibling change");
                self.render(generation, &change.snapshot);
            }
            Apply::Inactive => {
                debug!(slot = %change.key, "change arrived after unmount, discarded");
            }
            Apply::Unchanged | Apply::Stale => {}
        }
    }

    fn refresh_for(&self, generation: u64) -> Refresh {
        let initial = {
            let state = self.lock_state();
            if !state.mounted || state.generation != generation {
                return Refresh::Discarded;
            }
            state.phase != Phase::Ready
        };

        let revision = self.bus.next_revision();
        let loaded = match self.slot.read() {
            Ok(loaded) => loaded,
            Err(err) if initial => {
                warn!(slot = %self.slot.key(), error = %err, "initial load failed, starting empty");
                RecordCollection::new()
            }
            Err(err) => {
                warn!(slot = %self.slot.key(), error = %err, "reload failed, keeping last snapshot");
                return Refresh::Failed;
            }
        };

        {
            let state = self.lock_state();
            if !state.mounted || state.generation != generation {
                debug!(slot = %self.slot.key(), "load completed after unmount, discarded");
                return Refresh::Discarded;
            }
            if state.phase == Phase::Ready && *state.snapshot == loaded {
                return Refresh::Unchanged;
            }
        }

        match self.commit(generation, revision, Arc::new(loaded)) {
            Apply::Applied if !self.is_current(generation) => Refresh::Discarded,
            Apply::Applied => {
                debug!(slot = %self.slot.key(), revision, "reloaded slot");
                Refresh::Applied
            }
            Apply::Unchanged => Refresh::Unchanged,
            Apply::Stale => Refresh::Superseded,
            Apply::Inactive => Refresh::Discarded,
        }
    }
}

impl<S> Drop for Inner<S> {
    fn drop(&mut self) {
        let mounted = self
            .resources
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(mounted) = mounted {
            mounted.teardown();
        }
    }
}

impl<S: KeyValueStore> fmt::Debug for SyncedCollection<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.lock_state();
        f.debug_struct("SyncedCollection")
            .field("id", &self.inner.id)
            .field("slot", &self.inner.slot.key())
            .field("phase", &state.phase)
            .field("mounted", &state.mounted)
            .field("revision", &state.revision)
            .field("records", &state.snapshot.len())
            .finish()
    }
}
