//! A single cache entry with metadata for TTL tracking.

use std::time::Duration;

use chrono::Utc;
use promptdeck_core::Timestamp;

use crate::freshness::{self, Ttl};

/// The unit of storage: a value plus timestamps and a transient refresh
/// callback.
///
/// `F` is the stored callback type (sync or async, chosen by the front-end);
/// the core never invokes it, only the refresh drivers do. The callback is
/// never persisted - a cold-loaded entry has none until a live caller
/// reattaches one via `set`/`get_with`.
pub(crate) struct CacheEntry<V, F> {
    pub value: V,
    /// Set on insert, successful refresh, or bulk load.
    pub created_at: Timestamp,
    /// Updated on every successful get.
    pub last_accessed_at: Timestamp,
    /// When a background refresh was last attempted; throttles re-attempts
    /// to one per refresh-interval window.
    pub refresh_attempted_at: Option<Timestamp>,
    pub refresh_fn: Option<F>,
}

impl<V, F> CacheEntry<V, F> {
    /// New entry with fresh timestamps.
    pub fn new(value: V, refresh_fn: Option<F>) -> Self {
        let now = Utc::now();
        Self {
            value,
            created_at: now,
            last_accessed_at: now,
            refresh_attempted_at: None,
            refresh_fn,
        }
    }

    /// Reconstruct an entry from persisted timestamps (cold load / warming).
    pub fn from_persisted(
        value: V,
        created_at: Timestamp,
        last_accessed_at: Timestamp,
        refresh_fn: Option<F>,
    ) -> Self {
        Self {
            value,
            created_at,
            last_accessed_at,
            refresh_attempted_at: None,
            refresh_fn,
        }
    }

    /// Past its TTL: needs a background refresh but is still servable.
    pub fn is_stale(&self, now: Timestamp, ttl: Ttl) -> bool {
        freshness::is_stale(self.created_at, now, ttl)
    }

    /// Too old to serve even as stale data.
    pub fn is_expired(&self, now: Timestamp, max_stale: Duration) -> bool {
        freshness::is_expired(self.created_at, now, max_stale)
    }

    /// Whether a refresh should be attempted now, given the throttle window.
    pub fn refresh_due(&self, now: Timestamp, interval: Duration) -> bool {
        match self.refresh_attempted_at {
            None => true,
            Some(attempted) => freshness::age(attempted, now) > interval,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_entry_has_no_refresh_attempt() {
        let entry: CacheEntry<i32, ()> = CacheEntry::new(7, None);
        assert!(entry.refresh_attempted_at.is_none());
        assert_eq!(entry.created_at, entry.last_accessed_at);
    }

    #[test]
    fn test_refresh_due_throttles_within_window() {
        let mut entry: CacheEntry<i32, ()> = CacheEntry::new(7, None);
        let now = Utc::now();
        let interval = Duration::from_secs(60);

        assert!(entry.refresh_due(now, interval));

        entry.refresh_attempted_at = Some(now);
        assert!(!entry.refresh_due(now, interval));

        entry.refresh_attempted_at = Some(now - chrono::Duration::seconds(120));
        assert!(entry.refresh_due(now, interval));
    }

    #[test]
    fn test_persisted_entry_keeps_timestamps() {
        let created = Utc::now() - chrono::Duration::seconds(500);
        let accessed = Utc::now() - chrono::Duration::seconds(100);
        let entry: CacheEntry<i32, ()> = CacheEntry::from_persisted(1, created, accessed, None);
        assert_eq!(entry.created_at, created);
        assert_eq!(entry.last_accessed_at, accessed);
        assert!(entry.is_stale(Utc::now(), Ttl::from_secs(300)));
    }
}
