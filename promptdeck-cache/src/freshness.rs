//! Staleness policy for cache entries.
//!
//! Two independent thresholds classify an entry by age:
//!
//! - past `ttl` the entry is **stale**: still servable, but eligible for
//!   background refresh;
//! - past `max_stale` the entry is **expired**: never returned, purged from
//!   memory and disk the moment it is observed.
//!
//! `max_stale >= ttl` is assumed by configuration but not enforced; if
//! violated, entries go directly from fresh to expired.

use std::time::Duration;

use promptdeck_core::Timestamp;

/// Time-to-live before an entry is considered stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
    /// Entries go stale after this duration and get background-refreshed.
    Finite(Duration),
    /// Offline/static mode: entries never go stale and the background
    /// refresher never starts. Eviction happens only by LRU capacity or
    /// explicit invalidation.
    Infinite,
}

impl Ttl {
    /// Finite TTL from whole seconds.
    pub fn from_secs(secs: u64) -> Self {
        Self::Finite(Duration::from_secs(secs))
    }

    /// Returns true for a finite TTL.
    pub fn is_finite(&self) -> bool {
        matches!(self, Self::Finite(_))
    }

    /// The underlying duration, or None for infinite.
    pub fn as_duration(&self) -> Option<Duration> {
        match self {
            Self::Finite(d) => Some(*d),
            Self::Infinite => None,
        }
    }
}

/// Age of an entry created at `created_at`, as of `now`.
///
/// Clock skew that puts `created_at` in the future reads as zero age.
pub(crate) fn age(created_at: Timestamp, now: Timestamp) -> Duration {
    now.signed_duration_since(created_at)
        .to_std()
        .unwrap_or(Duration::ZERO)
}

/// True if an entry created at `created_at` is past its TTL.
pub(crate) fn is_stale(created_at: Timestamp, now: Timestamp, ttl: Ttl) -> bool {
    match ttl {
        Ttl::Finite(d) => age(created_at, now) > d,
        Ttl::Infinite => false,
    }
}

/// True if an entry created at `created_at` is too old to serve at all.
pub(crate) fn is_expired(created_at: Timestamp, now: Timestamp, max_stale: Duration) -> bool {
    age(created_at, now) > max_stale
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_fresh_entry_is_neither_stale_nor_expired() {
        let now = Utc::now();
        assert!(!is_stale(now, now, Ttl::from_secs(300)));
        assert!(!is_expired(now, now, Duration::from_secs(86400)));
    }

    #[test]
    fn test_stale_but_not_expired() {
        let now = Utc::now();
        let created = now - chrono::Duration::seconds(600);
        assert!(is_stale(created, now, Ttl::from_secs(300)));
        assert!(!is_expired(created, now, Duration::from_secs(86400)));
    }

    #[test]
    fn test_expired() {
        let now = Utc::now();
        let created = now - chrono::Duration::days(2);
        assert!(is_expired(created, now, Duration::from_secs(86400)));
    }

    #[test]
    fn test_infinite_ttl_never_stale() {
        let now = Utc::now();
        let created = now - chrono::Duration::days(365);
        assert!(!is_stale(created, now, Ttl::Infinite));
        // Expiry is independent of TTL.
        assert!(is_expired(created, now, Duration::from_secs(86400)));
    }

    #[test]
    fn test_future_created_at_reads_as_zero_age() {
        let now = Utc::now();
        let created = now + chrono::Duration::seconds(30);
        assert_eq!(age(created, now), Duration::ZERO);
        assert!(!is_stale(created, now, Ttl::from_secs(1)));
    }

    #[test]
    fn test_ttl_accessors() {
        assert!(Ttl::from_secs(60).is_finite());
        assert!(!Ttl::Infinite.is_finite());
        assert_eq!(
            Ttl::from_secs(60).as_duration(),
            Some(Duration::from_secs(60))
        );
        assert_eq!(Ttl::Infinite.as_duration(), None);
    }
}
