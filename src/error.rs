use std::io;

use thiserror::Error;

/// Failure reported by a storage medium.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage quota exceeded writing {key}: {needed} bytes needed, {quota} byte limit")]
    QuotaExceeded {
        key: String,
        needed: usize,
        quota: usize,
    },
    #[error("storage io error: {0}")]
    Io(#[from] io::Error),
    #[error("storage lock poisoned during {0}")]
    LockPoisoned(&'static str),
    #[error("storage rejected write: {0}")]
    Rejected(String),
}

/// A write to a slot did not reach the medium.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("failed to persist slot {key}: {source}")]
    Rejected {
        key: String,
        #[source]
        source: StoreError,
    },
    #[error("failed to encode slot {key}: {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

impl PersistenceError {
    pub fn key(&self) -> &str {
        match self {
            PersistenceError::Rejected { key, .. } | PersistenceError::Encode { key, .. } => key,
        }
    }
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error("handle for slot {0} is not mounted")]
    NotMounted(String),
    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        #[source]
        source: io::Error,
    },
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("access denied: {0}")]
    AccessDenied(String),
}
