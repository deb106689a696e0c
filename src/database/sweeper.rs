//! Background sweeper - periodic limit enforcement.
//!
//! The sweeper thread holds only a `Weak` handle to the cache state, so it
//! never keeps a dropped cache alive. It exits when stopped or once the
//! state is gone.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Condvar, Mutex, MutexGuard};

use super::DatabaseCacheState;
use crate::{Error, Result};

struct Shared {
    /// Set when the sweeper should exit.
    shutdown: Mutex<bool>,
    cond: Condvar,
    passes: AtomicU64,
}

/// Handle to a running sweeper thread. Dropping it stops the thread.
pub struct CacheSweeper {
    shared: Arc<Shared>,
    interval: Duration,
    thread_handle: Option<JoinHandle<()>>,
}

impl CacheSweeper {
    /// Spawn a thread that sweeps `state` every `interval`.
    pub fn start(state: &Arc<DatabaseCacheState>, interval: Duration) -> Result<Self> {
        let shared = Arc::new(Shared {
            shutdown: Mutex::new(false),
            cond: Condvar::new(),
            passes: AtomicU64::new(0),
        });

        let weak = Arc::downgrade(state);
        let this = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name("rowcache-sweeper".to_string())
            .spawn(move || sweep_loop(&this, &weak, interval))
            .map_err(|e| Error::internal(format!("failed to spawn sweeper thread: {}", e)))?;

        tracing::info!("Started cache sweeper every {:?}", interval);
        Ok(Self {
            shared,
            interval,
            thread_handle: Some(handle),
        })
    }

    /// Interval between sweeps.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Number of sweeps completed so far.
    pub fn passes(&self) -> u64 {
        self.shared.passes.load(Ordering::SeqCst)
    }

    /// Check if the sweeper thread is still running.
    pub fn is_running(&self) -> bool {
        self.thread_handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Stop the sweeper and wait for its thread to exit.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        {
            let mut shutdown = self.shared.shutdown.lock();
            *shutdown = true;
            self.shared.cond.notify_all();
        }

        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for CacheSweeper {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for CacheSweeper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheSweeper")
            .field("interval", &self.interval)
            .field("passes", &self.passes())
            .finish()
    }
}

fn sweep_loop(shared: &Shared, state: &Weak<DatabaseCacheState>, interval: Duration) {
    let mut shutdown = shared.shutdown.lock();
    while !*shutdown {
        shared.cond.wait_for(&mut shutdown, interval);
        if *shutdown {
            break;
        }

        // Sweep without holding the shutdown lock so stop() never waits on it.
        let alive = MutexGuard::unlocked(&mut shutdown, || {
            let Some(state) = state.upgrade() else {
                return false;
            };
            let report = state.sweep();
            shared.passes.fetch_add(1, Ordering::SeqCst);
            if !report.is_empty() {
                tracing::debug!(
                    "Sweep at {} evicted {} rows",
                    report.tick,
                    report.total_evicted()
                );
            }
            true
        });
        if !alive {
            tracing::debug!("Cache state dropped, sweeper exiting");
            break;
        }
    }
}
