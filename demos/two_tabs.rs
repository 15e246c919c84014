//! Two "browser tabs" sharing one booking slot.
//!
//! Tab A has the storage-event watcher; tab B relies on its reconciliation
//! timer. Run with `cargo run --example two_tabs`.

use std::thread;
use std::time::{Duration, Instant};

use booking_sync::logging::init_logging;
use booking_sync::{
    AccessPolicy, Authenticator, ChangeBus, Identity, MemoryStorage, Record, RecordCollection,
    Role, SyncConfig, SyncError, SyncedCollection,
};
use serde_json::{json, Value};
use tracing::info;

struct SignedIn(Identity);

impl Authenticator for SignedIn {
    fn verify(&self) -> Option<Identity> {
        Some(self.0.clone())
    }
}

fn booking(value: Value) -> Record {
    match value {
        Value::Object(record) => record,
        _ => Record::new(),
    }
}

fn wait_for(label: &str, mut check: impl FnMut() -> bool) {
    let started = Instant::now();
    while !check() {
        if started.elapsed() > Duration::from_secs(5) {
            info!(label, "gave up waiting");
            return;
        }
        thread::sleep(Duration::from_millis(10));
    }
    info!(label, waited_ms = started.elapsed().as_millis() as u64, "converged");
}

fn main() -> Result<(), SyncError> {
    init_logging();

    let policy = AccessPolicy::allow([Role::Photographer, Role::Admin]);
    let user = policy.authorize(&SignedIn(Identity {
        user_id: "photographer-7".to_string(),
        role: Role::Photographer,
    }))?;
    info!(user = %user.user_id, role = %user.role, "session verified");

    let config = SyncConfig::from_env()?.with_reconcile_interval(Duration::from_millis(250));
    let storage = MemoryStorage::new();

    let tab_a = SyncedCollection::builder(storage.context(), ChangeBus::new())
        .with_config(config.clone())
        .build()?;
    let tab_b = SyncedCollection::builder(storage.context(), ChangeBus::new())
        .with_config(config)
        .without_watcher()
        .build()?;

    tab_a.on_change(|snapshot| info!(tab = "a", records = snapshot.len(), "render"));
    tab_b.on_change(|snapshot| info!(tab = "b", records = snapshot.len(), "render"));
    tab_a.mount()?;
    tab_b.mount()?;

    let first = RecordCollection::new().with_record(booking(json!({
        "id": 1, "student": "s-101", "slot": "2026-05-14T10:00", "status": "requested"
    })));
    tab_a.write(first.clone())?;
    wait_for("tab b sees tab a's booking", || *tab_b.snapshot() == first);

    let second = first.clone().with_record(booking(json!({
        "id": 2, "student": "s-102", "slot": "2026-05-14T11:00", "status": "confirmed"
    })));
    tab_b.write(second.clone())?;
    wait_for("tab a sees tab b's booking", || *tab_a.snapshot() == second);

    tab_a.unmount();
    tab_b.unmount();
    Ok(())
}
