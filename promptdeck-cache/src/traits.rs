//! Value contract and refresh-callback types.
//!
//! The cache is generic over the cached value `V`; the only requirement is
//! deterministic (de)serialization for persistence plus the usual thread
//! bounds. Refresh callbacks are supplied per call by the owning client,
//! bound to its own authenticated transport - the cache never constructs
//! requests itself.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use promptdeck_core::RefreshError;
use serde::{de::DeserializeOwned, Serialize};

/// Marker trait for types that can be cached.
///
/// Blanket-implemented for anything serializable, cloneable, and sendable.
/// [`PromptCommit`](promptdeck_core::PromptCommit) is the canonical value
/// type, but the cache works with any conforming payload.
pub trait CacheValue: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> CacheValue for T where T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

/// Synchronous refresh callback: fetch a fresh value for `key`.
///
/// Invoked by the background worker outside the cache lock. Errors are
/// counted and logged; the stale value stays in place.
pub type RefreshFn<V> = Arc<dyn Fn(&str) -> Result<V, RefreshError> + Send + Sync>;

/// Boxed future returned by async refresh callbacks.
pub type RefreshFuture<V> = Pin<Box<dyn Future<Output = Result<V, RefreshError>> + Send>>;

/// Asynchronous refresh callback: fetch a fresh value for `key`.
pub type AsyncRefreshFn<V> = Arc<dyn Fn(String) -> RefreshFuture<V> + Send + Sync>;
