//! Process-wide default cache instance.
//!
//! Most clients want exactly one cache of [`PromptCommit`] values with the
//! default configuration. The default is created on first use and can be
//! shut down explicitly at process exit.

use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use promptdeck_core::{DeckResult, PromptCommit};

use crate::cache::PromptCache;
use crate::config::CacheConfig;

static DEFAULT: Lazy<RwLock<Option<Arc<PromptCache<PromptCommit>>>>> =
    Lazy::new(|| RwLock::new(None));

/// Get the process-wide default cache, creating it on first call.
pub fn get_or_create_default() -> DeckResult<Arc<PromptCache<PromptCommit>>> {
    if let Some(cache) = DEFAULT.read().as_ref() {
        return Ok(Arc::clone(cache));
    }
    let mut slot = DEFAULT.write();
    // Double-checked: another thread may have won the race for the write lock.
    if let Some(cache) = slot.as_ref() {
        return Ok(Arc::clone(cache));
    }
    let cache = Arc::new(PromptCache::new(CacheConfig::default())?);
    *slot = Some(Arc::clone(&cache));
    Ok(cache)
}

/// Stop the default cache's refresh worker and drop the default instance.
///
/// A later [`get_or_create_default`] creates a new instance.
pub fn shutdown_default() {
    if let Some(cache) = DEFAULT.write().take() {
        cache.shutdown();
    }
}
