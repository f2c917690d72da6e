//! The cache core: ordered LRU store + staleness policy + persistence
//! behind a single mutual-exclusion boundary.
//!
//! Generic over the cached value `V` and the stored refresh callback `F`.
//! The core stores callbacks but never invokes them; only the front-end
//! refresh drivers do, and always outside the lock, so a slow remote fetch
//! can never block readers or writers.

use std::path::Path;
use std::time::Duration;

use chrono::Utc;
use lru::LruCache;
use parking_lot::Mutex;
use promptdeck_core::{DeckResult, Timestamp};
use tracing::{debug, warn};

use crate::config::CacheConfig;
use crate::entry::CacheEntry;
use crate::freshness::Ttl;
use crate::metrics::{CacheMetrics, MetricsSnapshot};
use crate::persist::{self, PersistDir};
use crate::traits::CacheValue;

/// Mutable state guarded by the core lock.
struct CoreState<V, F> {
    config: CacheConfig,
    /// Unbounded at the container level: capacity policy lives in the core
    /// so every eviction can mirror a delete to disk.
    store: LruCache<String, CacheEntry<V, F>>,
    persist: PersistDir,
}

impl<V: CacheValue, F: Clone> CoreState<V, F> {
    fn enabled(&self) -> bool {
        self.config.max_size > 0
    }

    /// Evict LRU entries (memory + disk) until there is room for one more.
    fn make_room(&mut self, metrics: &CacheMetrics) {
        while self.store.len() >= self.config.max_size {
            let Some((evicted_key, _)) = self.store.pop_lru() else {
                break;
            };
            self.persist.remove_entry(&evicted_key);
            metrics.record_eviction();
            debug!(key = %evicted_key, "evicted least-recently-used cache entry");
        }
    }

    /// Remove an observed-expired entry from memory and disk.
    fn purge_expired(&mut self, key: &str) {
        self.store.pop(key);
        self.persist.remove_entry(key);
        debug!(key, "purged expired cache entry");
    }

    /// Attempt a cold load from disk into memory. Returns whether the key is
    /// now present.
    fn cold_load(&mut self, key: &str, metrics: &CacheMetrics, now: Timestamp) -> bool {
        let Some((value, created_at, last_accessed_at)) = self.persist.read_entry::<V>(key) else {
            return false;
        };
        if crate::freshness::is_expired(created_at, now, self.config.max_stale) {
            self.persist.remove_entry(key);
            return false;
        }
        self.make_room(metrics);
        self.store.put(
            key.to_string(),
            CacheEntry::from_persisted(value, created_at, last_accessed_at, None),
        );
        debug!(key, "cold-loaded cache entry from disk");
        true
    }
}

/// Thread-safe cache core shared by a front-end and its refresh driver.
pub(crate) struct CacheCore<V, F> {
    state: Mutex<CoreState<V, F>>,
    metrics: CacheMetrics,
}

impl<V: CacheValue, F: Clone> CacheCore<V, F> {
    /// Build the core, create the persistence directory, and warm from disk.
    ///
    /// A disabled cache (`max_size == 0`) does no file I/O at all.
    pub fn new(config: CacheConfig) -> Self {
        let persist = PersistDir::new(config.persist_path.clone());
        let mut state = CoreState {
            store: LruCache::unbounded(),
            persist,
            config,
        };
        if state.enabled() {
            state.persist.ensure_dir();
            warm(&mut state);
        }
        Self {
            state: Mutex::new(state),
            metrics: CacheMetrics::default(),
        }
    }

    /// Get a value, optionally reattaching a refresh callback on hit.
    ///
    /// Stale entries are returned as-is; refresh happens in the background.
    /// Expired entries are purged and read as a miss. On an in-memory miss
    /// the persisted file is consulted before declaring a true miss.
    pub fn get(&self, key: &str, refresh_fn: Option<F>) -> Option<V> {
        let mut state = self.state.lock();
        if !state.enabled() {
            self.metrics.record_miss();
            return None;
        }
        let now = Utc::now();

        if !state.store.contains(key) && !state.cold_load(key, &self.metrics, now) {
            self.metrics.record_miss();
            return None;
        }

        let max_stale = state.config.max_stale;
        if state
            .store
            .peek(key)
            .is_some_and(|entry| entry.is_expired(now, max_stale))
        {
            state.purge_expired(key);
            self.metrics.record_miss();
            return None;
        }

        // get_mut doubles as the LRU touch: the entry moves to the MRU slot.
        let entry = state.store.get_mut(key)?;
        entry.last_accessed_at = now;
        if let Some(f) = refresh_fn {
            entry.refresh_fn = Some(f);
        }
        let value = entry.value.clone();
        self.metrics.record_hit();
        Some(value)
    }

    /// Insert or replace an entry with fresh timestamps, evicting the LRU
    /// entry if a brand-new key would exceed capacity. Write-through to disk
    /// happens before returning.
    pub fn set(&self, key: &str, value: V, refresh_fn: Option<F>) {
        let mut state = self.state.lock();
        if !state.enabled() {
            return;
        }
        if !state.store.contains(key) {
            state.make_room(&self.metrics);
        }
        let entry = CacheEntry::new(value, refresh_fn);
        state
            .persist
            .write_entry(key, &entry.value, entry.created_at, entry.last_accessed_at);
        state.store.put(key.to_string(), entry);
    }

    /// `set` on behalf of a successful background refresh.
    pub fn set_refreshed(&self, key: &str, value: V, refresh_fn: F) {
        self.set(key, value, Some(refresh_fn));
        self.metrics.record_refresh();
        debug!(key, "refreshed cache entry");
    }

    /// Remove an entry from memory and disk; no-op if absent.
    pub fn invalidate(&self, key: &str) {
        let mut state = self.state.lock();
        if !state.enabled() {
            return;
        }
        state.store.pop(key);
        state.persist.remove_entry(key);
    }

    /// Remove all entries from memory and delete all persisted files.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.store.clear();
        if state.enabled() {
            state.persist.clear();
        }
    }

    /// Number of entries currently in memory.
    pub fn len(&self) -> usize {
        self.state.lock().store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether an in-memory entry exists and is past its TTL.
    pub fn is_stale(&self, key: &str) -> bool {
        let state = self.state.lock();
        let ttl = state.config.ttl;
        state
            .store
            .peek(key)
            .is_some_and(|entry| entry.is_stale(Utc::now(), ttl))
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn reset_metrics(&self) {
        self.metrics.reset();
    }

    pub fn record_refresh_error(&self) {
        self.metrics.record_refresh_error();
    }

    /// Current refresh interval (read per tick so reconfiguration applies
    /// without restarting the driver mid-flight).
    pub fn refresh_interval(&self) -> Duration {
        self.state.lock().config.refresh_interval
    }

    pub fn ttl(&self) -> Ttl {
        self.state.lock().config.ttl
    }

    pub fn is_enabled(&self) -> bool {
        self.state.lock().enabled()
    }

    /// Snapshot the stale entries due for a refresh attempt, marking each
    /// attempt under the lock. The returned callbacks are invoked by the
    /// driver after the lock is released.
    pub fn stale_snapshot(&self) -> Vec<(String, F)> {
        let mut state = self.state.lock();
        let now = Utc::now();
        let ttl = state.config.ttl;
        let interval = state.config.refresh_interval;
        if !ttl.is_finite() {
            return Vec::new();
        }
        let mut due = Vec::new();
        for (key, entry) in state.store.iter_mut() {
            if !entry.is_stale(now, ttl) || !entry.refresh_due(now, interval) {
                continue;
            }
            let Some(f) = entry.refresh_fn.clone() else {
                // Cold-loaded entries have no callback until a live caller
                // reattaches one.
                continue;
            };
            entry.refresh_attempted_at = Some(now);
            due.push((key.clone(), f));
        }
        due
    }

    /// Serialize the entire in-memory store to one JSON document, MRU first,
    /// via the same atomic temp-file-then-rename technique as write-through.
    pub fn dump(&self, path: &Path) -> DeckResult<()> {
        let entries = {
            let state = self.state.lock();
            let mut entries = serde_json::Map::with_capacity(state.store.len());
            for (key, entry) in state.store.iter() {
                match serde_json::to_value(&entry.value) {
                    Ok(value) => {
                        entries.insert(key.clone(), value);
                    }
                    Err(e) => {
                        warn!(key = %key, error = %e, "skipping unserializable cache entry in dump");
                    }
                }
            }
            entries
        };
        // File I/O outside the lock; the document is already built.
        persist::write_dump(path, entries)?;
        Ok(())
    }

    /// Load a bulk dump document, inserting entries in document order up to
    /// capacity. Loaded entries are treated as freshly fetched. Returns the
    /// number of entries loaded; a missing or corrupt document loads zero.
    pub fn load(&self, path: &Path) -> usize {
        let entries = persist::read_dump(path);
        let mut state = self.state.lock();
        if !state.enabled() {
            return 0;
        }
        let mut loaded = 0;
        for (key, value) in entries {
            if state.store.len() >= state.config.max_size {
                debug!(loaded, "reached max cache size, stopping load");
                break;
            }
            let value: V = match serde_json::from_value(value) {
                Ok(value) => value,
                Err(e) => {
                    warn!(key = %key, error = %e, "failed to load cache entry from dump");
                    continue;
                }
            };
            let entry = CacheEntry::new(value, None);
            state
                .persist
                .write_entry(&key, &entry.value, entry.created_at, entry.last_accessed_at);
            state.store.put(key, entry);
            loaded += 1;
        }
        debug!(loaded, path = %path.display(), "loaded cache entries from dump");
        loaded
    }

    /// Swap in a new (already validated) configuration, evicting down to any
    /// reduced capacity. Remaining entries are retained; a cache enabled
    /// from the disabled state gets its directory created and warmed, since
    /// construction skipped both.
    pub fn reconfigure(&self, config: CacheConfig) {
        let mut state = self.state.lock();
        let was_enabled = state.enabled();
        let dir_changed = state.config.persist_path != config.persist_path;
        state.config = config;
        if state.enabled() {
            if dir_changed {
                state.persist = PersistDir::new(state.config.persist_path.clone());
            }
            if dir_changed || !was_enabled {
                state.persist.ensure_dir();
            }
            if !was_enabled {
                warm(&mut state);
            }
            while state.store.len() > state.config.max_size {
                if let Some((evicted_key, _)) = state.store.pop_lru() {
                    state.persist.remove_entry(&evicted_key);
                    self.metrics.record_eviction();
                }
            }
        } else {
            state.store.clear();
        }
    }

    /// Backdate an entry's creation time, for staleness tests.
    #[cfg(test)]
    pub fn backdate(&self, key: &str, age: Duration) {
        let mut state = self.state.lock();
        if let Some(entry) = state.store.peek_mut(key) {
            entry.created_at = Utc::now() - chrono::Duration::from_std(age).unwrap();
        }
    }
}

/// Populate the store from the persistence directory at startup, dropping
/// entries (and their files) that are already expired.
fn warm<V: CacheValue, F: Clone>(state: &mut CoreState<V, F>) {
    let now = Utc::now();
    let scanned = state.persist.scan::<V>();
    let mut warmed = 0usize;
    for (key, value, created_at, last_accessed_at) in scanned {
        if crate::freshness::is_expired(created_at, now, state.config.max_stale) {
            state.persist.remove_entry(&key);
            continue;
        }
        if state.store.len() >= state.config.max_size {
            // At capacity: skip the insert but keep scanning, so expired
            // files later in directory order still get unlinked.
            continue;
        }
        state.store.put(
            key,
            CacheEntry::from_persisted(value, created_at, last_accessed_at, None),
        );
        warmed += 1;
    }
    if warmed > 0 {
        debug!(warmed, "warmed cache from filesystem");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    type TestCore = CacheCore<String, Arc<String>>;

    fn core_with(tmp: &TempDir, config: CacheConfig) -> TestCore {
        CacheCore::new(config.with_persist_path(tmp.path()))
    }

    fn small_config() -> CacheConfig {
        CacheConfig::new()
            .with_max_size(2)
            .with_ttl(Duration::from_secs(300))
    }

    #[test]
    fn test_round_trip() {
        let tmp = TempDir::new().unwrap();
        let core = core_with(&tmp, CacheConfig::new());
        core.set("k", "v".to_string(), None);
        assert_eq!(core.get("k", None), Some("v".to_string()));
        let snap = core.metrics();
        assert_eq!(snap.hits, 1);
        assert_eq!(snap.misses, 0);
    }

    #[test]
    fn test_example_scenario_capacity_two() {
        let tmp = TempDir::new().unwrap();
        let core = core_with(&tmp, small_config());
        core.set("a", "1".to_string(), None);
        core.set("b", "2".to_string(), None);
        core.set("c", "3".to_string(), None);

        assert_eq!(core.len(), 2);
        assert_eq!(core.get("b", None), Some("2".to_string()));
        assert_eq!(core.get("c", None), Some("3".to_string()));
        // "a" is gone from memory AND from disk, so no cold load revives it.
        assert_eq!(core.get("a", None), None);
        assert_eq!(core.metrics().evictions, 1);
    }

    #[test]
    fn test_get_protects_from_eviction() {
        let tmp = TempDir::new().unwrap();
        let core = core_with(&tmp, small_config());
        core.set("a", "1".to_string(), None);
        core.set("b", "2".to_string(), None);
        // Touch "a" so "b" becomes the LRU victim.
        assert!(core.get("a", None).is_some());
        core.set("c", "3".to_string(), None);

        assert!(core.get("a", None).is_some());
        assert!(core.get("b", None).is_none());
        assert!(core.get("c", None).is_some());
    }

    #[test]
    fn test_disabled_cache_no_io() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("never-created");
        let core: TestCore =
            CacheCore::new(CacheConfig::new().with_max_size(0).with_persist_path(&dir));
        core.set("k", "v".to_string(), None);
        assert_eq!(core.get("k", None), None);
        assert_eq!(core.metrics().misses, 1);
        assert!(!dir.exists(), "disabled cache must not touch the filesystem");
    }

    #[test]
    fn test_stale_still_served_expired_purged() {
        let tmp = TempDir::new().unwrap();
        let core = core_with(
            &tmp,
            CacheConfig::new()
                .with_ttl(Duration::from_secs(10))
                .with_max_stale(Duration::from_secs(100)),
        );
        core.set("k", "v".to_string(), None);

        // Stale but within max_stale: still served.
        core.backdate("k", Duration::from_secs(50));
        assert!(core.is_stale("k"));
        assert_eq!(core.get("k", None), Some("v".to_string()));

        // Past max_stale: purged from memory and disk.
        core.backdate("k", Duration::from_secs(200));
        assert_eq!(core.get("k", None), None);
        assert_eq!(core.len(), 0);
        let revived = core.get("k", None);
        assert_eq!(revived, None, "expired entry must not cold-load back");
    }

    #[test]
    fn test_cold_load_after_restart() {
        let tmp = TempDir::new().unwrap();
        {
            let core = core_with(&tmp, CacheConfig::new());
            core.set("k", "v".to_string(), None);
        }
        let core = core_with(&tmp, CacheConfig::new());
        // Warming already brought it into memory.
        assert_eq!(core.len(), 1);
        assert_eq!(core.get("k", None), Some("v".to_string()));
        assert_eq!(core.metrics().hits, 1);
    }

    #[test]
    fn test_warming_drops_expired_files() {
        let tmp = TempDir::new().unwrap();
        let persist = crate::persist::PersistDir::new(tmp.path().to_path_buf());
        persist.ensure_dir();
        let now = Utc::now();
        let old = now - chrono::Duration::seconds(500);
        persist.write_entry("expired", &"x".to_string(), old, old);
        persist.write_entry("fresh", &"y".to_string(), now, now);

        let core = core_with(
            &tmp,
            CacheConfig::new().with_max_stale(Duration::from_secs(100)),
        );
        assert_eq!(core.len(), 1);
        assert!(core.get("fresh", None).is_some());
        // The expired file was deleted during warming, so no cold load either.
        assert_eq!(core.get("expired", None), None);
    }

    #[test]
    fn test_invalidate_removes_memory_and_disk() {
        let tmp = TempDir::new().unwrap();
        let core = core_with(&tmp, CacheConfig::new());
        core.set("k", "v".to_string(), None);
        core.invalidate("k");
        assert_eq!(core.len(), 0);
        assert_eq!(core.get("k", None), None, "file must be gone too");
    }

    #[test]
    fn test_clear_removes_everything() {
        let tmp = TempDir::new().unwrap();
        let core = core_with(&tmp, CacheConfig::new());
        core.set("a", "1".to_string(), None);
        core.set("b", "2".to_string(), None);
        core.clear();
        assert!(core.is_empty());
        assert_eq!(core.get("a", None), None);
        assert_eq!(core.get("b", None), None);
    }

    #[test]
    fn test_stale_snapshot_marks_attempts() {
        let tmp = TempDir::new().unwrap();
        let core = core_with(
            &tmp,
            CacheConfig::new()
                .with_ttl(Duration::from_secs(10))
                .with_refresh_interval(Duration::from_secs(60)),
        );
        let cb = Arc::new("cb".to_string());
        core.set("k", "v".to_string(), Some(cb));
        core.backdate("k", Duration::from_secs(30));

        let first = core.stale_snapshot();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].0, "k");

        // Throttled: a second snapshot within the interval is empty.
        let second = core.stale_snapshot();
        assert!(second.is_empty());
    }

    #[test]
    fn test_stale_snapshot_skips_entries_without_callback() {
        let tmp = TempDir::new().unwrap();
        let core = core_with(&tmp, CacheConfig::new().with_ttl(Duration::from_secs(10)));
        core.set("k", "v".to_string(), None);
        core.backdate("k", Duration::from_secs(30));
        assert!(core.stale_snapshot().is_empty());
    }

    #[test]
    fn test_dump_and_load_respect_capacity() {
        let tmp = TempDir::new().unwrap();
        let core = core_with(&tmp, CacheConfig::new());
        core.set("a", "1".to_string(), None);
        core.set("b", "2".to_string(), None);
        core.set("c", "3".to_string(), None);

        let dump_path = tmp.path().join("dump.json");
        core.dump(&dump_path).unwrap();

        let tmp2 = TempDir::new().unwrap();
        let small: TestCore = CacheCore::new(
            CacheConfig::new()
                .with_max_size(2)
                .with_persist_path(tmp2.path()),
        );
        let loaded = small.load(&dump_path);
        assert_eq!(loaded, 2, "load stops at capacity");
        assert_eq!(small.len(), 2);
        // MRU-first dump order: "c" then "b" survive.
        assert!(small.get("c", None).is_some());
        assert!(small.get("b", None).is_some());
    }

    #[test]
    fn test_load_missing_dump_is_zero() {
        let tmp = TempDir::new().unwrap();
        let core = core_with(&tmp, CacheConfig::new());
        assert_eq!(core.load(&tmp.path().join("absent.json")), 0);
    }

    #[test]
    fn test_reconfigure_enable_creates_dir_and_warms() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("cache");
        let core: TestCore =
            CacheCore::new(CacheConfig::new().with_max_size(0).with_persist_path(&dir));
        assert!(!dir.exists());

        core.reconfigure(CacheConfig::new().with_max_size(10).with_persist_path(&dir));
        core.set("k", "v".to_string(), None);
        assert!(dir.exists(), "enabling must create the persist directory");

        // Write-through worked: a fresh core warms the entry back.
        let revived: TestCore = CacheCore::new(CacheConfig::new().with_persist_path(&dir));
        assert_eq!(revived.get("k", None), Some("v".to_string()));
    }

    #[test]
    fn test_reconfigure_enable_picks_up_existing_files() {
        let tmp = TempDir::new().unwrap();
        {
            let core = core_with(&tmp, CacheConfig::new());
            core.set("persisted", "v".to_string(), None);
        }
        let core: TestCore = CacheCore::new(
            CacheConfig::new()
                .with_max_size(0)
                .with_persist_path(tmp.path()),
        );
        assert!(core.is_empty());

        core.reconfigure(
            CacheConfig::new()
                .with_max_size(10)
                .with_persist_path(tmp.path()),
        );
        assert_eq!(core.get("persisted", None), Some("v".to_string()));
    }

    #[test]
    fn test_warming_purges_expired_past_capacity() {
        let tmp = TempDir::new().unwrap();
        let persist = crate::persist::PersistDir::new(tmp.path().to_path_buf());
        persist.ensure_dir();
        let now = Utc::now();
        let old = now - chrono::Duration::seconds(500);
        persist.write_entry("a", &"1".to_string(), now, now);
        persist.write_entry("b", &"2".to_string(), now, now);
        persist.write_entry("expired", &"x".to_string(), old, old);

        let core = core_with(
            &tmp,
            CacheConfig::new()
                .with_max_size(1)
                .with_max_stale(Duration::from_secs(100)),
        );
        assert_eq!(core.len(), 1);
        // The expired file is unlinked regardless of where the capacity cap
        // landed in directory order.
        let expired_path = tmp.path().join(crate::persist::filename_for("expired"));
        assert!(!expired_path.exists());
    }

    #[test]
    fn test_reconfigure_shrinks_capacity() {
        let tmp = TempDir::new().unwrap();
        let core = core_with(&tmp, CacheConfig::new());
        for i in 0..5 {
            core.set(&format!("k{i}"), i.to_string(), None);
        }
        core.reconfigure(
            CacheConfig::new()
                .with_max_size(2)
                .with_persist_path(tmp.path()),
        );
        assert_eq!(core.len(), 2);
        // Most recent survive.
        assert!(core.get("k4", None).is_some());
        assert!(core.get("k3", None).is_some());
    }
}
