use std::fs;
use std::path::Path;
use std::sync::mpsc::{channel, RecvTimeoutError};
use std::thread;
use std::time::SystemTime;

use tracing::{debug, trace};

use super::{ForeignChange, WatchHandle, Watcher};
use crate::error::SyncError;
use crate::signal::run_isolated;
use crate::store::FileStorage;

/// Polls a slot file's length and modification time.
///
/// A file medium cannot tell who wrote a slot, so this also fires for the
/// watching context's own writes. Reloading is idempotent, so those are
/// harmless duplicates. Two writes of equal length inside one mtime tick
/// can go unnoticed; the reconciliation timer covers that case.
#[derive(Clone, Debug)]
pub struct FileWatcher {
    storage: FileStorage,
}

type Fingerprint = Option<(u64, Option<SystemTime>)>;

fn fingerprint(path: &Path) -> Fingerprint {
    fs::metadata(path)
        .ok()
        .map(|meta| (meta.len(), meta.modified().ok()))
}

impl FileWatcher {
    pub fn new(storage: FileStorage) -> Self {
        FileWatcher { storage }
    }
}

impl Watcher for FileWatcher {
    fn start(&self, key: &str, on_foreign_change: ForeignChange) -> Result<WatchHandle, SyncError> {
        let path = self.storage.slot_path(key);
        let interval = self.storage.poll_interval();
        let (stop_tx, stop_rx) = channel::<()>();
        let mut last = fingerprint(&path);

        thread::Builder::new()
            .name("sync-watch".to_string())
            .spawn(move || {
                loop {
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }

                    let current = fingerprint(&path);
                    if current != last {
                        trace!(path = %path.display(), "slot file changed");
                        last = current;
                        run_isolated("foreign change", || on_foreign_change());
                    }
                }
                debug!(path = %path.display(), "file watcher exited");
            })
            .map_err(|source| SyncError::Spawn {
                name: "sync-watch",
                source,
            })?;

        Ok(WatchHandle::new(move || {
            let _ = stop_tx.send(());
        }))
    }
}
