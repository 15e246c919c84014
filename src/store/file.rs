use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tempfile::NamedTempFile;
use tracing::trace;

use super::KeyValueStore;
use crate::config::SyncConfig;
use crate::error::StoreError;
use crate::watch::{FileWatcher, Watcher};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Medium backed by a directory, one file per slot. Several processes (or
/// several `FileStorage` values) opened on the same directory share slots.
///
/// Each write lands in a temp file next to the slot and is renamed over it,
/// so a reader sees either the old or the new contents, never a mix.
#[derive(Clone, Debug)]
pub struct FileStorage {
    root: PathBuf,
    poll_interval: Duration,
}

impl FileStorage {
    /// Open (and create if needed) a storage directory.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(FileStorage {
            root,
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    /// Open a storage directory using the configured watch poll interval.
    pub fn open_with_config(
        root: impl Into<PathBuf>,
        config: &SyncConfig,
    ) -> Result<Self, StoreError> {
        Ok(Self::open(root)?.with_poll_interval(config.watch_poll_interval()))
    }

    /// How often the watcher checks slot files for foreign writes.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn slot_path(&self, key: &str) -> PathBuf {
        self.root.join(file_name(key))
    }
}

fn file_name(key: &str) -> String {
    let mut name: String = key
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '.' | '_' | '-' => c,
            _ => '_',
        })
        .collect();
    if name.is_empty() || name.starts_with('.') {
        name.insert(0, '_');
    }
    name.push_str(".json");
    name
}

impl KeyValueStore for FileStorage {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        match fs::read(self.slot_path(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        let path = self.slot_path(key);
        let mut staged = NamedTempFile::new_in(&self.root)?;
        staged.write_all(value)?;
        staged.as_file().sync_all()?;
        staged.persist(&path).map_err(|err| StoreError::Io(err.error))?;
        trace!(slot = key, path = %path.display(), bytes = value.len(), "slot file written");
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool, StoreError> {
        match fs::remove_file(self.slot_path(key)) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    fn watcher(&self) -> Arc<dyn Watcher> {
        Arc::new(FileWatcher::new(self.clone()))
    }
}
