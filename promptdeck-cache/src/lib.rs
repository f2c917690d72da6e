//! PROMPTDECK Cache - Client-Side Prompt Cache
//!
//! A bounded, thread-safe LRU cache for immutable-by-version prompt commits,
//! with TTL-based staleness, background stale-while-revalidate refresh, and
//! write-through filesystem persistence.
//!
//! # Design Philosophy
//!
//! Reads never wait on the network. `get` returns whatever is cached (fresh
//! or stale) immediately; a background refresher revalidates stale entries
//! out of band and writes fresh values back through the cache. Entries past
//! their hard `max_stale` threshold are never served and are purged on sight.
//!
//! Availability beats freshness: every persistence failure is logged and
//! swallowed, and the in-memory cache stays authoritative even on a
//! read-only or corrupted disk.
//!
//! # Front-Ends
//!
//! Two front-ends share one core:
//!
//! - [`PromptCache`] - for synchronous clients; refresh runs on a dedicated
//!   worker thread with an interruptible sleep.
//! - [`AsyncPromptCache`] - for async clients; refresh runs as a tokio task
//!   cancelled via token.
//!
//! # Example
//!
//! ```ignore
//! let cache = PromptCache::new(CacheConfig::default())?;
//! let fetch: RefreshFn<PromptCommit> =
//!     Arc::new(|key| client.pull_prompt_commit(key));
//!
//! cache.set_with("acme/summarizer:abc123", commit, fetch.clone());
//! let cached = cache.get_with("acme/summarizer:abc123", fetch);
//! ```

pub mod config;
pub mod freshness;
pub mod metrics;
pub mod singleton;
pub mod traits;

mod async_cache;
mod cache;
mod core;
mod entry;
mod persist;

pub use async_cache::AsyncPromptCache;
pub use cache::PromptCache;
pub use config::{default_persist_path, CacheConfig};
pub use freshness::Ttl;
pub use metrics::MetricsSnapshot;
pub use singleton::{get_or_create_default, shutdown_default};
pub use traits::{AsyncRefreshFn, CacheValue, RefreshFn, RefreshFuture};

// Re-export the shared types callers need at the API boundary.
pub use promptdeck_core::{
    ConfigError, DeckError, DeckResult, PersistError, PromptCommit, RefreshError,
};
