//! Local synchronization of booking records across execution contexts.
//!
//! Several contexts (browser-tab-like processes, or components within one
//! process) share one persisted slot and write to it without coordination.
//! Each consumer holds a [`SyncedCollection`] whose snapshot is kept current
//! by three independent channels:
//!
//! - the context's [`ChangeBus`], fired synchronously after a local write;
//! - the medium's [`Watcher`], fired when another context writes the slot;
//! - a [`ReconciliationTimer`], firing unconditionally as a backstop.
//!
//! The medium is last-writer-wins. There is no server and no push.

mod collection;
mod config;
mod error;
pub mod logging;
mod record;
mod session;
pub mod signal;
mod store;
mod timer;
pub mod watch;

pub use collection::{Phase, Refresh, SyncedCollection, SyncedCollectionBuilder};
pub use config::SyncConfig;
pub use error::{PersistenceError, StoreError, SyncError};
pub use record::{Record, RecordCollection, Snapshot};
pub use session::{AccessPolicy, Authenticator, Identity, Role};
pub use signal::{
    ChangeBus, ChangeSignal, ContextId, Listeners, SlotChange, StorageEvent, StorageEvents,
    Subscription,
};
#[cfg(feature = "file")]
pub use store::FileStorage;
pub use store::{KeyValueStore, MemoryContext, MemoryStorage, SlotAdapter};
pub use timer::ReconciliationTimer;
pub use watch::{DisabledWatcher, WatchHandle, Watcher};
