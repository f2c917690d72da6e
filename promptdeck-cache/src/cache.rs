//! Thread-based prompt cache front-end.
//!
//! Wraps the shared cache core with a dedicated background worker thread
//! that periodically refreshes stale entries via their stored callbacks.
//! The worker starts lazily on the first callback-carrying call (`set` or
//! `get_with`), holds only a weak reference
//! to the core so a dropped cache cannot be kept alive by its own worker,
//! and shuts down with a bounded join.

use std::path::Path;
use std::sync::mpsc;
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use promptdeck_core::{ConfigError, DeckResult};
use tracing::{debug, warn};

use crate::config::CacheConfig;
use crate::core::CacheCore;
use crate::metrics::MetricsSnapshot;
use crate::traits::{CacheValue, RefreshFn};

/// How long `shutdown` waits for the worker to acknowledge before detaching.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// Worker plumbing
// ============================================================================

/// Interruptible sleep: the worker parks on the condvar so `shutdown` can
/// wake it immediately instead of waiting out a full refresh interval.
struct StopSignal {
    stopped: Mutex<bool>,
    cond: Condvar,
}

impl StopSignal {
    fn new() -> Self {
        Self {
            stopped: Mutex::new(false),
            cond: Condvar::new(),
        }
    }

    fn signal(&self) {
        *self.stopped.lock() = true;
        self.cond.notify_all();
    }

    /// Sleep up to `timeout`; returns true if a stop was signalled.
    fn wait_for(&self, timeout: Duration) -> bool {
        let mut stopped = self.stopped.lock();
        if !*stopped {
            self.cond.wait_for(&mut stopped, timeout);
        }
        *stopped
    }
}

struct WorkerHandle {
    stop: Arc<StopSignal>,
    done_rx: mpsc::Receiver<()>,
    handle: thread::JoinHandle<()>,
}

fn worker_loop<V: CacheValue>(
    weak: Weak<CacheCore<V, RefreshFn<V>>>,
    stop: Arc<StopSignal>,
    done_tx: mpsc::Sender<()>,
) {
    loop {
        // Re-read the interval each tick so reconfiguration takes effect.
        let interval = match weak.upgrade() {
            Some(core) => core.refresh_interval(),
            None => break,
        };
        if stop.wait_for(interval) {
            break;
        }
        let Some(core) = weak.upgrade() else {
            break;
        };
        let due = core.stale_snapshot();
        for (key, refresh_fn) in due {
            // Callback invocation happens outside the core lock.
            match refresh_fn(&key) {
                Ok(value) => core.set_refreshed(&key, value, refresh_fn.clone()),
                Err(e) => {
                    core.record_refresh_error();
                    debug!(key = %key, error = %e, "background refresh failed, keeping stale value");
                }
            }
        }
        // Drop the strong reference before sleeping again.
        drop(core);
    }
    let _ = done_tx.send(());
}

// ============================================================================
// PromptCache
// ============================================================================

/// Thread-safe prompt cache with TTL staleness, background refresh, and
/// write-through filesystem persistence.
///
/// Cheap to share behind an [`Arc`]; all methods take `&self`.
pub struct PromptCache<V: CacheValue> {
    shared: Arc<CacheCore<V, RefreshFn<V>>>,
    worker: Mutex<Option<WorkerHandle>>,
}

impl<V: CacheValue> PromptCache<V> {
    /// Create a cache, validating the configuration and warming any
    /// persisted entries from disk.
    pub fn new(config: CacheConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            shared: Arc::new(CacheCore::new(config)),
            worker: Mutex::new(None),
        })
    }

    /// Get a cached value. Stale values are returned as-is (refresh happens
    /// in the background); expired values read as a miss.
    pub fn get(&self, key: &str) -> Option<V> {
        self.shared.get(key, None)
    }

    /// Get a cached value, reattaching a refresh callback to the entry so
    /// the background worker can refresh it (cold-loaded entries have none).
    ///
    /// Also starts the worker if needed: a warmed process that only ever
    /// reads still gets its stale entries refreshed.
    pub fn get_with(&self, key: &str, refresh_fn: RefreshFn<V>) -> Option<V> {
        let value = self.shared.get(key, Some(refresh_fn));
        self.maybe_start_worker();
        value
    }

    /// Insert or replace a value without a refresh callback.
    pub fn set(&self, key: &str, value: V) {
        self.shared.set(key, value, None);
        self.maybe_start_worker();
    }

    /// Insert or replace a value with a refresh callback for background
    /// revalidation once the entry goes stale.
    pub fn set_with(&self, key: &str, value: V, refresh_fn: RefreshFn<V>) {
        self.shared.set(key, value, Some(refresh_fn));
        self.maybe_start_worker();
    }

    /// Remove a single entry from memory and disk.
    pub fn invalidate(&self, key: &str) {
        self.shared.invalidate(key);
    }

    /// Remove all entries from memory and disk.
    pub fn clear(&self) {
        self.shared.clear();
    }

    /// Whether an in-memory entry exists and is past its TTL.
    pub fn is_stale(&self, key: &str) -> bool {
        self.shared.is_stale(key)
    }

    /// Number of entries currently in memory.
    pub fn len(&self) -> usize {
        self.shared.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.is_empty()
    }

    /// Serialize the whole cache to a single JSON document at `path`.
    pub fn dump(&self, path: impl AsRef<Path>) -> DeckResult<()> {
        self.shared.dump(path.as_ref())
    }

    /// Load a bulk dump, inserting up to capacity. Returns entries loaded.
    pub fn load(&self, path: impl AsRef<Path>) -> usize {
        self.shared.load(path.as_ref())
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.shared.metrics()
    }

    pub fn reset_metrics(&self) {
        self.shared.reset_metrics();
    }

    /// Replace the configuration at runtime.
    ///
    /// The worker is stopped, the new config swapped in (evicting down to
    /// any reduced capacity), and the worker restarted if it was running and
    /// is still eligible under the new config.
    pub fn configure(&self, config: CacheConfig) -> Result<(), ConfigError> {
        config.validate()?;
        let was_running = self.worker.lock().is_some();
        self.shutdown();
        self.shared.reconfigure(config);
        if was_running {
            self.maybe_start_worker();
        }
        Ok(())
    }

    /// Stop the background worker. Idempotent; the cache itself remains
    /// usable (a later `set` restarts the worker).
    pub fn shutdown(&self) {
        let Some(worker) = self.worker.lock().take() else {
            return;
        };
        worker.stop.signal();
        match worker.done_rx.recv_timeout(SHUTDOWN_TIMEOUT) {
            Ok(()) => {
                let _ = worker.handle.join();
            }
            Err(_) => {
                // A callback is wedged mid-refresh; detach rather than hang.
                warn!("cache refresh worker did not stop in time, detaching");
            }
        }
    }

    /// Start the worker if refresh makes sense and it is not already running.
    fn maybe_start_worker(&self) {
        if !self.shared.ttl().is_finite() || !self.shared.is_enabled() {
            return;
        }
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return;
        }
        let stop = Arc::new(StopSignal::new());
        let (done_tx, done_rx) = mpsc::channel();
        let weak = Arc::downgrade(&self.shared);
        let thread_stop = Arc::clone(&stop);
        let handle = match thread::Builder::new()
            .name("promptdeck-refresh".to_string())
            .spawn(move || worker_loop(weak, thread_stop, done_tx))
        {
            Ok(handle) => handle,
            Err(e) => {
                // Cache still works without refresh; the next set retries.
                warn!(error = %e, "failed to spawn cache refresh worker");
                return;
            }
        };
        *worker = Some(WorkerHandle {
            stop,
            done_rx,
            handle,
        });
        debug!("started cache refresh worker");
    }
}

impl<V: CacheValue> Drop for PromptCache<V> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
