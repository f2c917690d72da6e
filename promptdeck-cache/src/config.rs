//! Cache configuration with builder methods and synchronous validation.

use std::path::PathBuf;
use std::time::Duration;

use promptdeck_core::ConfigError;

use crate::freshness::Ttl;

/// Maximum entries held in memory before LRU eviction.
pub const DEFAULT_MAX_SIZE: usize = 100;
/// Time before an entry is considered stale (5 minutes).
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);
/// Hard expiry: stale data older than this is never served (24 hours).
pub const DEFAULT_MAX_STALE: Duration = Duration::from_secs(86_400);
/// How often the background refresher scans for stale entries (1 minute).
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

/// The default persistence directory: `~/.promptdeck/prompt_cache`.
///
/// Falls back to a relative path when no home directory can be resolved
/// (containers, bare service accounts).
pub fn default_persist_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".promptdeck")
        .join("prompt_cache")
}

/// Configuration for a prompt cache instance.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum entries in memory. `0` fully disables the cache: every get
    /// misses, set is a no-op, and no file I/O happens.
    pub max_size: usize,
    /// Staleness threshold. [`Ttl::Infinite`] disables staleness detection
    /// and the background refresher entirely.
    pub ttl: Ttl,
    /// Hard expiry threshold. Assumed (not enforced) to be >= `ttl`; pass
    /// `Duration::MAX` for parity with serving stale data indefinitely.
    pub max_stale: Duration,
    /// Background refresher wake interval, also the per-entry refresh
    /// attempt throttle window.
    pub refresh_interval: Duration,
    /// Directory for write-through JSON files.
    pub persist_path: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_MAX_SIZE,
            ttl: Ttl::Finite(DEFAULT_TTL),
            max_stale: DEFAULT_MAX_STALE,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            persist_path: default_persist_path(),
        }
    }
}

impl CacheConfig {
    /// Create a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of in-memory entries.
    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    /// Set a finite TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Ttl::Finite(ttl);
        self
    }

    /// Infinite TTL: offline/static mode, no background refresh.
    pub fn with_infinite_ttl(mut self) -> Self {
        self.ttl = Ttl::Infinite;
        self
    }

    /// Set the hard expiry threshold.
    pub fn with_max_stale(mut self, max_stale: Duration) -> Self {
        self.max_stale = max_stale;
        self
    }

    /// Set the background refresh interval.
    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    /// Set the persistence directory.
    pub fn with_persist_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.persist_path = path.into();
        self
    }

    /// Validate the configuration.
    ///
    /// Invalid durations are programmer error and fail hard, unlike the
    /// environmental failures the cache swallows at runtime.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.refresh_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "refresh_interval".to_string(),
                value: format!("{:?}", self.refresh_interval),
                reason: "must be positive".to_string(),
            });
        }
        if self.max_stale.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "max_stale".to_string(),
                value: format!("{:?}", self.max_stale),
                reason: "must be positive; use max_size = 0 to disable caching".to_string(),
            });
        }
        Ok(())
    }
}
