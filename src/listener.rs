//! Eviction listener: a callback invoked whenever an entry is displaced by
//! capacity pressure.
//!
//! Explicit removals (`remove`, `clear`, a `compute`/`merge` closure that
//! returns `None`) never reach the listener.
//!
//! # Example
//! ```
//! use lrumap::LruCache;
//! use std::sync::{Arc, Mutex};
//!
//! let log: Arc<Mutex<Vec<u64>>> = Arc::new(Mutex::new(Vec::new()));
//! let log2 = Arc::clone(&log);
//!
//! let cache: LruCache<u64, u64> = LruCache::builder(2)
//!     .eviction_listener(move |key: &u64, _val| {
//!         log2.lock().unwrap().push(*key);
//!     })
//!     .build()
//!     .unwrap();
//!
//! cache.insert(1, 10);
//! cache.insert(2, 20);
//! cache.insert(3, 30); // evicts 1
//! cache.remove(&2); // explicit, not reported
//! assert_eq!(*log.lock().unwrap(), vec![1]);
//! ```

use std::any::Any;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// EvictionListener trait
// ---------------------------------------------------------------------------

/// A callback invoked exactly once per evicted entry.
///
/// The callback receives the evicted key and value.  By the time it runs the
/// entry is already unreachable through the cache, and no internal lock is
/// held, so a slow listener only delays the call that triggered the eviction.
///
/// A panicking listener is caught, logged and counted in
/// [`Metrics::listener_panics`](crate::Metrics::listener_panics); see
/// [`CacheBuilder::propagate_listener_panics`](crate::CacheBuilder::propagate_listener_panics)
/// to rethrow instead.
pub trait EvictionListener<K, V>: Send + Sync + 'static {
    fn on_evict(&self, key: &K, value: Arc<V>);
}

/// An [`EvictionListener`] backed by a closure.
///
/// Created via [`CacheBuilder::eviction_listener`](crate::CacheBuilder::eviction_listener).
pub struct FnListener<F>(pub F);

impl<K, V, F> EvictionListener<K, V> for FnListener<F>
where
    F: Fn(&K, Arc<V>) + Send + Sync + 'static,
{
    fn on_evict(&self, key: &K, value: Arc<V>) {
        (self.0)(key, value)
    }
}

/// Best-effort rendering of a panic payload for logging.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "<non-string panic payload>"
    }
}
