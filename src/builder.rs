use std::hash::Hash;
use std::sync::Arc;

use crate::cache::{CacheConfig, LruCache};
use crate::error::{CacheError, Result};
use crate::listener::{EvictionListener, FnListener};
use crate::recency::buffer::DEFAULT_TOUCH_BUFFER_CAPACITY;

/// Lower bound for the default compaction slack.
const MIN_COMPACTION_SLACK: usize = 64;

/// Builder for configuring and constructing an [`LruCache`].
///
/// Nothing is validated until [`build`](CacheBuilder::build).
///
/// # Example
/// ```
/// use lrumap::CacheBuilder;
///
/// let cache: lrumap::LruCache<String, String> = CacheBuilder::new(1_000)
///     .num_shards(16)
///     .build()
///     .unwrap();
/// assert_eq!(cache.capacity(), 1_000);
/// ```
pub struct CacheBuilder<K, V> {
    capacity: usize,
    num_shards: usize,
    touch_buffer_capacity: usize,
    compaction_slack: Option<usize>,
    listener: Option<Box<dyn EvictionListener<K, V>>>,
    propagate_listener_panics: bool,
}

impl<K: 'static, V: 'static> CacheBuilder<K, V> {
    pub fn new(capacity: usize) -> Self {
        CacheBuilder {
            capacity,
            num_shards: 64,
            touch_buffer_capacity: DEFAULT_TOUCH_BUFFER_CAPACITY,
            compaction_slack: None,
            listener: None,
            propagate_listener_panics: false,
        }
    }

    /// Set the number of internal shards (must be a power of two; default: 64).
    pub fn num_shards(mut self, n: usize) -> Self {
        self.num_shards = n;
        self
    }

    /// Number of read-hit use events buffered before a reader has to take
    /// the maintenance lock (default: 128).
    pub fn touch_buffer_capacity(mut self, n: usize) -> Self {
        self.touch_buffer_capacity = n;
        self
    }

    /// How many stale use events the recency queue may hold above the live
    /// entry count before it is compacted (default: `max(capacity, 64)`).
    ///
    /// Purely a memory/time trade-off; it never changes which entry is
    /// evicted.
    pub fn compaction_slack(mut self, n: usize) -> Self {
        self.compaction_slack = Some(n);
        self
    }

    /// Register an eviction listener closure.
    ///
    /// The closure runs on the thread whose insertion caused the eviction,
    /// after the entry has been removed and with no cache lock held.
    ///
    /// # Example
    /// ```
    /// use lrumap::CacheBuilder;
    ///
    /// let cache: lrumap::LruCache<u64, String> = CacheBuilder::new(10)
    ///     .eviction_listener(|key: &u64, val| {
    ///         println!("evicted {key} => {val}");
    ///     })
    ///     .build()
    ///     .unwrap();
    /// ```
    pub fn eviction_listener<F>(mut self, f: F) -> Self
    where
        F: Fn(&K, Arc<V>) + Send + Sync + 'static,
    {
        self.listener = Some(Box::new(FnListener(f)));
        self
    }

    /// Register an eviction listener via the [`EvictionListener`] trait.
    pub fn eviction_listener_impl<L: EvictionListener<K, V>>(mut self, l: L) -> Self {
        self.listener = Some(Box::new(l));
        self
    }

    /// When `true`, a panic raised by the eviction listener is resumed on the
    /// calling thread once all evictions of that call have been dispatched.
    /// When `false` (the default) the panic is logged and swallowed.
    ///
    /// Either way the cache stays consistent: the victim is removed before
    /// the listener runs.
    pub fn propagate_listener_panics(mut self, propagate: bool) -> Self {
        self.propagate_listener_panics = propagate;
        self
    }
}

impl<K, V> CacheBuilder<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    pub fn build(self) -> Result<LruCache<K, V>> {
        if self.capacity == 0 {
            return Err(CacheError::InvalidCapacity(self.capacity));
        }
        if self.num_shards == 0 || !self.num_shards.is_power_of_two() {
            return Err(CacheError::InvalidShardCount(self.num_shards));
        }
        if self.touch_buffer_capacity == 0 {
            return Err(CacheError::InvalidTouchBufferCapacity);
        }
        let compaction_slack = match self.compaction_slack {
            Some(0) => return Err(CacheError::InvalidCompactionSlack),
            Some(n) => n,
            None => self.capacity.max(MIN_COMPACTION_SLACK),
        };

        Ok(LruCache::from_config(CacheConfig {
            capacity: self.capacity,
            num_shards: self.num_shards,
            touch_buffer_capacity: self.touch_buffer_capacity,
            compaction_slack,
            listener: self.listener,
            propagate_listener_panics: self.propagate_listener_panics,
        }))
    }
}
