//! Tokio-based prompt cache front-end.
//!
//! Same cache core as [`PromptCache`](crate::PromptCache), but the refresh
//! driver is a spawned task instead of a dedicated thread, and callbacks are
//! async. Storage I/O stays synchronous: per-entry files are small and the
//! write happens under the core lock anyway, so the blocking window is tiny.

use std::path::Path;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use promptdeck_core::{ConfigError, DeckResult};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::CacheConfig;
use crate::core::CacheCore;
use crate::metrics::MetricsSnapshot;
use crate::traits::{AsyncRefreshFn, CacheValue};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

struct TaskHandle {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

async fn refresh_task<V: CacheValue>(
    weak: Weak<CacheCore<V, AsyncRefreshFn<V>>>,
    cancel: CancellationToken,
) {
    loop {
        let interval = match weak.upgrade() {
            Some(core) => core.refresh_interval(),
            None => break,
        };
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
        let Some(core) = weak.upgrade() else {
            break;
        };
        let due = core.stale_snapshot();
        for (key, refresh_fn) in due {
            match refresh_fn(key.clone()).await {
                Ok(value) => core.set_refreshed(&key, value, refresh_fn.clone()),
                Err(e) => {
                    core.record_refresh_error();
                    debug!(key = %key, error = %e, "background refresh failed, keeping stale value");
                }
            }
        }
        drop(core);
    }
}

/// Async prompt cache for event-loop callers.
///
/// Get/set are synchronous and lock-bounded; only refresh callbacks and
/// shutdown are async.
pub struct AsyncPromptCache<V: CacheValue> {
    shared: Arc<CacheCore<V, AsyncRefreshFn<V>>>,
    task: Mutex<Option<TaskHandle>>,
}

impl<V: CacheValue> AsyncPromptCache<V> {
    /// Create a cache, validating the configuration and warming any
    /// persisted entries from disk.
    pub fn new(config: CacheConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            shared: Arc::new(CacheCore::new(config)),
            task: Mutex::new(None),
        })
    }

    pub fn get(&self, key: &str) -> Option<V> {
        self.shared.get(key, None)
    }

    /// Get, reattaching an async refresh callback to the entry. Starts the
    /// refresh task if needed, so a read-only warmed process still refreshes.
    pub fn get_with(&self, key: &str, refresh_fn: AsyncRefreshFn<V>) -> Option<V> {
        let value = self.shared.get(key, Some(refresh_fn));
        self.maybe_start_task();
        value
    }

    pub fn set(&self, key: &str, value: V) {
        self.shared.set(key, value, None);
        self.maybe_start_task();
    }

    pub fn set_with(&self, key: &str, value: V, refresh_fn: AsyncRefreshFn<V>) {
        self.shared.set(key, value, Some(refresh_fn));
        self.maybe_start_task();
    }

    pub fn invalidate(&self, key: &str) {
        self.shared.invalidate(key);
    }

    pub fn clear(&self) {
        self.shared.clear();
    }

    pub fn is_stale(&self, key: &str) -> bool {
        self.shared.is_stale(key)
    }

    pub fn len(&self) -> usize {
        self.shared.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.is_empty()
    }

    pub fn dump(&self, path: impl AsRef<Path>) -> DeckResult<()> {
        self.shared.dump(path.as_ref())
    }

    pub fn load(&self, path: impl AsRef<Path>) -> usize {
        self.shared.load(path.as_ref())
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.shared.metrics()
    }

    pub fn reset_metrics(&self) {
        self.shared.reset_metrics();
    }

    /// Replace the configuration at runtime; restarts the refresh task if it
    /// was running and is still eligible.
    pub async fn configure(&self, config: CacheConfig) -> Result<(), ConfigError> {
        config.validate()?;
        let was_running = self.task.lock().is_some();
        self.stop().await;
        self.shared.reconfigure(config);
        if was_running {
            self.maybe_start_task();
        }
        Ok(())
    }

    /// Stop the refresh task with a bounded wait. Idempotent.
    pub async fn stop(&self) {
        let Some(task) = self.task.lock().take() else {
            return;
        };
        task.cancel.cancel();
        if tokio::time::timeout(SHUTDOWN_TIMEOUT, task.handle)
            .await
            .is_err()
        {
            warn!("cache refresh task did not stop in time, detaching");
        }
    }

    fn maybe_start_task(&self) {
        if !self.shared.ttl().is_finite() || !self.shared.is_enabled() {
            return;
        }
        let mut task = self.task.lock();
        if task.is_some() {
            return;
        }
        // set() may be called off-runtime; refresh then waits for a caller
        // with a runtime context.
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!("no tokio runtime, skipping cache refresh task start");
            return;
        };
        let cancel = CancellationToken::new();
        let weak = Arc::downgrade(&self.shared);
        let handle = runtime.spawn(refresh_task(weak, cancel.clone()));
        *task = Some(TaskHandle { cancel, handle });
        debug!("started cache refresh task");
    }
}

impl<V: CacheValue> Drop for AsyncPromptCache<V> {
    fn drop(&mut self) {
        // Cannot await in Drop; cancellation alone is enough since the task
        // holds only a weak core reference.
        if let Some(task) = self.task.lock().take() {
            task.cancel.cancel();
        }
    }
}
