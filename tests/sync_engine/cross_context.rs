//! Several contexts sharing one medium.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use booking_sync::{
    ChangeBus, KeyValueStore, MemoryStorage, Phase, Refresh, SlotAdapter, SyncedCollection,
};

use crate::support::{bookings, timer_only, wait_until, watching, RenderCount};

#[test]
fn two_contexts_converge() {
    let storage = MemoryStorage::new();
    let tab_a = watching(&storage);
    let tab_b = timer_only(&storage, Duration::from_millis(50));
    tab_a.mount().unwrap();
    tab_b.mount().unwrap();

    // Read-after-write in the writing context.
    tab_a.write(bookings(1)).unwrap();
    assert_eq!(*tab_a.snapshot(), bookings(1));

    // B has no watcher; the timer picks it up.
    assert!(wait_until(|| *tab_b.snapshot() == bookings(1)));

    // A's storage-event watcher picks up B's write.
    tab_b.write(bookings(2)).unwrap();
    assert!(wait_until(|| *tab_a.snapshot() == bookings(2)));

    assert_eq!(tab_a.phase(), Phase::Ready);
    assert_eq!(tab_b.phase(), Phase::Ready);
}

#[test]
fn watcher_delivers_without_waiting_for_timer() {
    let storage = MemoryStorage::new();
    let reader = watching(&storage);
    let writer = watching(&storage);
    reader.mount().unwrap();
    writer.mount().unwrap();

    let renders = RenderCount::attach(&reader);
    writer.write(bookings(3)).unwrap();

    assert!(wait_until(|| renders.get() == 1));
    assert_eq!(*reader.snapshot(), bookings(3));
}

#[test]
fn own_writes_raise_no_storage_event_reload() {
    let storage = MemoryStorage::new();
    let own = storage.context();
    let other = storage.context();

    let seen = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&seen);
    let watch = own
        .watcher()
        .start(
            "bookings",
            Arc::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .unwrap();

    own.set("bookings", b"[]").unwrap();
    thread::sleep(Duration::from_millis(50));
    assert_eq!(seen.load(Ordering::SeqCst), 0);

    other.set("bookings", b"[]").unwrap();
    assert!(wait_until(|| seen.load(Ordering::SeqCst) == 1));

    watch.stop();
}

#[test]
fn stale_read_never_replaces_newer_sibling_change() {
    use crate::support::GatedStore;

    // The reader's medium lags behind the sibling's. Both share one bus.
    let lagging = MemoryStorage::new();
    let current = MemoryStorage::new();
    SlotAdapter::new(lagging.context(), "bookings")
        .save(&bookings(1))
        .unwrap();

    let bus = ChangeBus::new();
    let gated = GatedStore::new(lagging.context());
    let gate = gated.gate();
    let reader = SyncedCollection::builder(gated, bus.clone())
        .without_watcher()
        .with_reconcile_interval(Duration::from_secs(600))
        .build()
        .unwrap();
    let sibling = SyncedCollection::builder(current.context(), bus.clone())
        .without_watcher()
        .with_reconcile_interval(Duration::from_secs(600))
        .build()
        .unwrap();
    sibling.mount().unwrap();
    reader.mount().unwrap();
    assert_eq!(*reader.snapshot(), bookings(1));

    SlotAdapter::new(lagging.context(), "bookings")
        .save(&bookings(2))
        .unwrap();

    gate.arm();
    let in_flight = {
        let reader = reader.clone();
        thread::spawn(move || reader.refresh())
    };
    assert!(gate.wait_held());

    sibling.write(bookings(5)).unwrap();
    assert_eq!(*reader.snapshot(), bookings(5));

    gate.release();
    assert_eq!(in_flight.join().unwrap(), Refresh::Superseded);
    assert_eq!(*reader.snapshot(), bookings(5));
}

#[test]
fn interleaved_writers_settle_on_last_write() {
    let storage = MemoryStorage::new();
    let tab_a = watching(&storage);
    let tab_b = timer_only(&storage, Duration::from_millis(20));
    tab_a.mount().unwrap();
    tab_b.mount().unwrap();

    for n in 1..=10 {
        let writer = if n % 2 == 0 { &tab_a } else { &tab_b };
        writer.write(bookings(n)).unwrap();
    }

    let settled = SlotAdapter::new(storage.context(), "bookings").load();
    assert_eq!(settled, bookings(10));
    assert!(wait_until(|| {
        *tab_a.snapshot() == settled && *tab_b.snapshot() == settled
    }));
}
