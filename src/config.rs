//! Deployment configuration for a synchronized collection.
//!
//! Values come from a TOML file, environment overrides, or the `with_*`
//! builders, in that order of precedence from lowest to highest.
//!
//! ```toml
//! slot_key = "bookings"
//! reconcile_interval_ms = 10000
//! watch_enabled = true
//! watch_poll_interval_ms = 500
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::SyncError;

pub const ENV_SLOT_KEY: &str = "BOOKING_SYNC_SLOT_KEY";
pub const ENV_RECONCILE_INTERVAL_MS: &str = "BOOKING_SYNC_RECONCILE_INTERVAL_MS";
pub const ENV_WATCH_ENABLED: &str = "BOOKING_SYNC_WATCH_ENABLED";
pub const ENV_WATCH_POLL_INTERVAL_MS: &str = "BOOKING_SYNC_WATCH_POLL_INTERVAL_MS";

/// Intervals are stored in whole milliseconds.
const MIN_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Name of the slot holding the collection.
    #[serde(default = "default_slot_key")]
    pub slot_key: String,
    /// Backstop reload period. Trades staleness against reload cost.
    #[serde(default = "default_reconcile_interval_ms")]
    pub reconcile_interval_ms: u64,
    /// Start the medium's cross-context watcher on mount.
    #[serde(default = "default_watch_enabled")]
    pub watch_enabled: bool,
    /// Poll period for media whose watcher polls (file storage).
    #[serde(default = "default_watch_poll_interval_ms")]
    pub watch_poll_interval_ms: u64,
}

fn default_slot_key() -> String {
    "bookings".to_string()
}

fn default_reconcile_interval_ms() -> u64 {
    10_000
}

fn default_watch_enabled() -> bool {
    true
}

fn default_watch_poll_interval_ms() -> u64 {
    500
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            slot_key: default_slot_key(),
            reconcile_interval_ms: default_reconcile_interval_ms(),
            watch_enabled: default_watch_enabled(),
            watch_poll_interval_ms: default_watch_poll_interval_ms(),
        }
    }
}

impl SyncConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, SyncError> {
        toml::from_str(content).map_err(|err| SyncError::Config(err.to_string()))
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, SyncError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|err| SyncError::Config(format!("{}: {}", path.display(), err)))?;
        Self::from_toml_str(&content)
    }

    /// Defaults, overridden by any `BOOKING_SYNC_*` variables, validated.
    pub fn from_env() -> Result<Self, SyncError> {
        let mut config = Self::default();
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) -> Result<(), SyncError> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), SyncError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup(ENV_SLOT_KEY) {
            self.slot_key = key;
        }
        if let Some(value) = lookup(ENV_RECONCILE_INTERVAL_MS) {
            self.reconcile_interval_ms = parse_var(ENV_RECONCILE_INTERVAL_MS, &value)?;
        }
        if let Some(value) = lookup(ENV_WATCH_ENABLED) {
            self.watch_enabled = parse_var(ENV_WATCH_ENABLED, &value)?;
        }
        if let Some(value) = lookup(ENV_WATCH_POLL_INTERVAL_MS) {
            self.watch_poll_interval_ms = parse_var(ENV_WATCH_POLL_INTERVAL_MS, &value)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), SyncError> {
        if self.slot_key.trim().is_empty() {
            return Err(SyncError::Config("slot_key must not be empty".to_string()));
        }
        if self.reconcile_interval_ms == 0 {
            return Err(SyncError::Config(
                "reconcile_interval_ms must be at least 1 ms".to_string(),
            ));
        }
        if self.watch_poll_interval_ms == 0 {
            return Err(SyncError::Config(
                "watch_poll_interval_ms must be at least 1 ms".to_string(),
            ));
        }
        Ok(())
    }

    pub fn with_slot_key(mut self, key: impl Into<String>) -> Self {
        self.slot_key = key.into();
        self
    }

    pub fn with_reconcile_interval(mut self, interval: Duration) -> Self {
        self.reconcile_interval_ms = whole_millis(interval);
        self
    }

    pub fn with_watch_enabled(mut self, enabled: bool) -> Self {
        self.watch_enabled = enabled;
        self
    }

    pub fn with_watch_poll_interval(mut self, interval: Duration) -> Self {
        self.watch_poll_interval_ms = whole_millis(interval);
        self
    }

    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_millis(self.reconcile_interval_ms)
    }

    pub fn watch_poll_interval(&self) -> Duration {
        Duration::from_millis(self.watch_poll_interval_ms)
    }
}

/// Sub-millisecond intervals map to 0, which `validate` rejects. Intervals
/// too large for `u64` milliseconds saturate.
fn whole_millis(interval: Duration) -> u64 {
    if interval < MIN_INTERVAL {
        return 0;
    }
    u64::try_from(interval.as_millis()).unwrap_or(u64::MAX)
}

fn parse_var<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, SyncError>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|err| SyncError::Config(format!("{}={:?}: {}", name, value, err)))
}
