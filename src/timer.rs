//! Reconciliation timer.
//!
//! A background thread that fires a callback every interval, whether or not
//! any change signal fired. It bounds how long a missed notification can
//! leave a context stale.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{channel, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use tracing::{debug, trace};

use crate::error::SyncError;
use crate::signal::run_isolated;

/// A running periodic trigger, owned by whoever started it.
///
/// ## Example
///
/// ```
/// use booking_sync::ReconciliationTimer;
/// use std::time::Duration;
///
/// let timer = ReconciliationTimer::start(|| {}, Duration::from_secs(10)).unwrap();
/// assert!(timer.is_running());
/// timer.stop();
/// assert!(!timer.is_running());
/// ```
pub struct ReconciliationTimer {
    stop_tx: Mutex<Option<Sender<()>>>,
    stopped: Arc<AtomicBool>,
    ticks: Arc<AtomicU64>,
    interval: Duration,
}

impl ReconciliationTimer {
    /// Spawn the timer thread. `on_tick` first runs one `interval` after
    /// start.
    pub fn start<F>(on_tick: F, interval: Duration) -> Result<Self, SyncError>
    where
        F: Fn() + Send + 'static,
    {
        let (stop_tx, stop_rx) = channel::<()>();
        let stopped = Arc::new(AtomicBool::new(false));
        let ticks = Arc::new(AtomicU64::new(0));

        let thread_stopped = Arc::clone(&stopped);
        let thread_ticks = Arc::clone(&ticks);
        thread::Builder::new()
            .name("sync-reconcile".to_string())
            .spawn(move || {
                loop {
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                    if thread_stopped.load(Ordering::SeqCst) {
                        break;
                    }

                    let tick = thread_ticks.fetch_add(1, Ordering::SeqCst) + 1;
                    trace!(tick, "reconciliation tick");
                    run_isolated("reconciliation tick", &on_tick);
                }
                debug!("reconciliation timer exited");
            })
            .map_err(|source| SyncError::Spawn {
                name: "sync-reconcile",
                source,
            })?;

        Ok(ReconciliationTimer {
            stop_tx: Mutex::new(Some(stop_tx)),
            stopped,
            ticks,
            interval,
        })
    }

    /// Signal the thread to exit without waiting for it. A tick already in
    /// progress finishes; no new tick starts. Idempotent.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        let stop_tx = self
            .stop_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(stop_tx) = stop_tx {
            let _ = stop_tx.send(());
        }
    }

    pub fn is_running(&self) -> bool {
        !self.stopped.load(Ordering::SeqCst)
    }

    /// Ticks fired so far.
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::SeqCst)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl Drop for ReconciliationTimer {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for ReconciliationTimer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReconciliationTimer")
            .field("interval", &self.interval)
            .field("running", &self.is_running())
            .field("ticks", &self.ticks())
            .finish()
    }
}
