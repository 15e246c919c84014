//! Mount, unmount and the loads that straddle them.

use std::thread;
use std::time::Duration;

use booking_sync::{
    ChangeBus, MemoryStorage, Phase, Refresh, SlotAdapter, SyncError, SyncedCollection,
};

use crate::support::{bookings, timer_only, watching, Gate, GatedStore, RenderCount};

#[test]
fn load_finishing_after_unmount_is_discarded() {
    let storage = MemoryStorage::new();
    let gated = GatedStore::new(storage.context());
    let gate = gated.gate();
    let handle = SyncedCollection::builder(gated, ChangeBus::new())
        .without_watcher()
        .with_reconcile_interval(Duration::from_secs(600))
        .build()
        .unwrap();
    handle.mount().unwrap();
    let renders = RenderCount::attach(&handle);

    SlotAdapter::new(storage.context(), "bookings")
        .save(&bookings(2))
        .unwrap();

    gate.arm();
    let in_flight = {
        let handle = handle.clone();
        thread::spawn(move || handle.refresh())
    };
    assert!(gate.wait_held());

    handle.unmount();
    gate.release();

    assert_eq!(in_flight.join().unwrap(), Refresh::Discarded);
    assert!(handle.snapshot().is_empty());
    assert_eq!(renders.get(), 0);
}

#[test]
fn render_callbacks_stop_once_unmount_returns() {
    let storage = MemoryStorage::new();
    let handle = timer_only(&storage, Duration::from_secs(600));
    let parked = Gate::default();
    {
        let parked = parked.clone();
        handle.on_change(move |_| parked.pass());
    }
    let later = RenderCount::attach(&handle);
    handle.mount().unwrap();
    assert_eq!(later.get(), 1);

    SlotAdapter::new(storage.context(), "bookings")
        .save(&bookings(2))
        .unwrap();

    parked.arm();
    let in_flight = {
        let handle = handle.clone();
        thread::spawn(move || handle.refresh())
    };
    assert!(parked.wait_held());

    handle.unmount();
    parked.release();

    assert_eq!(in_flight.join().unwrap(), Refresh::Discarded);
    assert_eq!(later.get(), 1);
    assert!(!handle.is_mounted());
}

#[test]
fn write_interrupted_by_unmount_reports_not_mounted() {
    let storage = MemoryStorage::new();
    let gated = GatedStore::new(storage.context());
    let saving = gated.write_gate();
    let handle = SyncedCollection::builder(gated, ChangeBus::new())
        .without_watcher()
        .with_reconcile_interval(Duration::from_secs(600))
        .build()
        .unwrap();
    handle.mount().unwrap();

    saving.arm();
    let in_flight = {
        let handle = handle.clone();
        thread::spawn(move || handle.write(bookings(1)))
    };
    assert!(saving.wait_held());

    handle.unmount();
    saving.release();

    let err = in_flight.join().unwrap().unwrap_err();
    assert!(matches!(err, SyncError::NotMounted(key) if key == "bookings"));
    assert!(handle.snapshot().is_empty());
    assert_eq!(
        SlotAdapter::new(storage.context(), "bookings").load(),
        bookings(1)
    );
}

#[test]
fn racing_mount_and_unmount_leave_a_usable_handle() {
    let storage = MemoryStorage::new();
    let handle = timer_only(&storage, Duration::from_secs(600));

    for round in 0..100u64 {
        handle.mount().unwrap();
        let unmounting = {
            let handle = handle.clone();
            thread::spawn(move || handle.unmount())
        };
        let mounting = {
            let handle = handle.clone();
            thread::spawn(move || handle.mount())
        };
        unmounting.join().unwrap();
        mounting.join().unwrap().unwrap();

        handle.mount().unwrap();
        assert!(handle.is_mounted(), "round {round}");
        handle.write(bookings(round % 3 + 1)).unwrap();
        handle.unmount();
    }
}

#[test]
fn unmounted_handle_ignores_every_channel() {
    let storage = MemoryStorage::new();
    let handle = watching(&storage);
    let writer = timer_only(&storage, Duration::from_secs(600));
    handle.mount().unwrap();
    writer.mount().unwrap();
    let renders = RenderCount::attach(&handle);

    handle.unmount();
    writer.write(bookings(4)).unwrap();
    thread::sleep(Duration::from_millis(50));

    assert!(handle.snapshot().is_empty());
    assert_eq!(renders.get(), 0);
    assert_eq!(handle.refresh(), Refresh::Discarded);
}

#[test]
fn unmount_stops_the_timer() {
    let storage = MemoryStorage::new();
    let handle = timer_only(&storage, Duration::from_millis(10));
    handle.mount().unwrap();
    handle.unmount();

    SlotAdapter::new(storage.context(), "bookings")
        .save(&bookings(1))
        .unwrap();
    thread::sleep(Duration::from_millis(100));
    assert!(handle.snapshot().is_empty());
}

#[test]
fn mount_cycles_release_every_subscription() {
    let storage = MemoryStorage::new();
    let bus = ChangeBus::new();
    let handle = SyncedCollection::builder(storage.context(), bus.clone())
        .with_reconcile_interval(Duration::from_millis(5))
        .build()
        .unwrap();

    for _ in 0..20 {
        handle.mount().unwrap();
        handle.mount().unwrap();
        assert_eq!(bus.subscriber_count(), 1);
        assert_eq!(storage.events().subscriber_count(), 1);
        handle.unmount();
    }

    assert_eq!(bus.subscriber_count(), 0);
    assert_eq!(storage.events().subscriber_count(), 0);
}

#[test]
fn remount_catches_up_with_missed_writes() {
    let storage = MemoryStorage::new();
    let handle = watching(&storage);
    let writer = watching(&storage);
    handle.mount().unwrap();
    writer.mount().unwrap();

    handle.unmount();
    writer.write(bookings(3)).unwrap();
    handle.mount().unwrap();

    assert_eq!(handle.phase(), Phase::Ready);
    assert_eq!(*handle.snapshot(), bookings(3));
}

#[test]
fn dropping_a_mounted_handle_detaches_it() {
    let storage = MemoryStorage::new();
    let bus = ChangeBus::new();
    {
        let handle = SyncedCollection::builder(storage.context(), bus.clone())
            .with_reconcile_interval(Duration::from_secs(600))
            .build()
            .unwrap();
        handle.mount().unwrap();
        assert_eq!(bus.subscriber_count(), 1);
    }

    assert_eq!(bus.subscriber_count(), 0);
    assert_eq!(storage.events().subscriber_count(), 0);
}
