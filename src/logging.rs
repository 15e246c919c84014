//! Subscriber setup for binaries, demos and tests.
//!
//! The library only emits `tracing` events; installing a subscriber is the
//! application's call. Both initializers respect `RUST_LOG` and are safe to
//! call more than once.

use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_FILTER: &str = "info,booking_sync=debug";

/// Compact human-readable output on stdout.
pub fn init_logging() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let _ = fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .with_writer(std::io::stdout)
        .try_init();
}

/// One JSON object per event, for log collectors.
pub fn init_logging_json() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let _ = fmt()
        .with_env_filter(env_filter)
        .with_thread_names(true)
        .json()
        .with_writer(std::io::stdout)
        .try_init();
}
