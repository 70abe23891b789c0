use std::fmt;
use std::hash::Hash;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error, trace, warn};

use crate::builder::CacheBuilder;
use crate::error::Result;
use crate::listener::{panic_message, EvictionListener};
use crate::metrics::stats::{Metrics, StatsCounter};
use crate::recency::buffer::TouchBuffer;
use crate::recency::{RecencyQueue, StampClock, UseEvent};
use crate::store::sharded::{ShardMut, ShardedStore};
use crate::view::{Entries, Keys, Values};

// ---------------------------------------------------------------------------
// Construction parameters
// ---------------------------------------------------------------------------

/// Validated settings handed over by [`CacheBuilder::build`].
pub(crate) struct CacheConfig<K, V> {
    pub(crate) capacity: usize,
    pub(crate) num_shards: usize,
    pub(crate) touch_buffer_capacity: usize,
    pub(crate) compaction_slack: usize,
    pub(crate) listener: Option<Box<dyn EvictionListener<K, V>>>,
    pub(crate) propagate_listener_panics: bool,
}

// ---------------------------------------------------------------------------
// Closure decisions
// ---------------------------------------------------------------------------

/// What an update closure wants done with one key.
pub(crate) enum Decision<V> {
    /// Leave the key as it is (present or absent).
    Keep,
    /// Store this value, inserting or overwriting.
    Store(V),
    /// Remove the key.  Explicit removal: the listener is not called.
    Remove,
}

/// Before/after values of one [`LruCache::apply`] call.
pub(crate) struct Applied<V> {
    pub(crate) previous: Option<Arc<V>>,
    pub(crate) current: Option<Arc<V>>,
}

impl<V> Applied<V> {
    fn absent() -> Self {
        Applied {
            previous: None,
            current: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Cache interior
// ---------------------------------------------------------------------------

/// Shared interior of an [`LruCache`].
///
/// Lock order is `recency` before any shard lock.  Code holding a shard lock
/// never waits for `recency`.
pub(crate) struct Inner<K, V> {
    pub(crate) store: ShardedStore<K, V>,
    /// The maintenance lock.  Growth, eviction and compaction happen while
    /// holding it.
    pub(crate) recency: Mutex<RecencyQueue<K>>,
    pub(crate) touches: TouchBuffer<K>,
    pub(crate) clock: StampClock,
    pub(crate) capacity: usize,
    pub(crate) compaction_slack: usize,
    /// Optional eviction listener.  `None` if the user didn't register one.
    pub(crate) listener: Option<Box<dyn EvictionListener<K, V>>>,
    pub(crate) propagate_listener_panics: bool,
    pub(crate) metrics: StatsCounter,
}

// ---------------------------------------------------------------------------
// Cache handle
// ---------------------------------------------------------------------------

/// A bounded, concurrent map that evicts its least-recently-used entry when
/// an insertion would exceed capacity.
///
/// Handles are cheap to clone and share the same entries.
///
/// # Example
/// ```
/// use lrumap::LruCache;
///
/// let cache: LruCache<u32, &str> = LruCache::new(2).unwrap();
/// cache.insert(1, "one");
/// cache.insert(2, "two");
/// cache.get(&1);          // 1 is now the most recently used
/// cache.insert(3, "three"); // evicts 2
/// assert!(cache.contains_key(&1));
/// assert!(!cache.contains_key(&2));
/// ```
pub struct LruCache<K, V> {
    inner: Arc<Inner<K, V>>,
}

impl<K, V> Clone for LruCache<K, V> {
    fn clone(&self) -> Self {
        LruCache {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> fmt::Debug for LruCache<K, V>
where
    K: Hash + Eq + Clone,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LruCache")
            .field("capacity", &self.inner.capacity)
            .field("len", &self.inner.store.len())
            .finish_non_exhaustive()
    }
}

impl<K, V> LruCache<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// Creates a cache holding at most `capacity` entries, without a listener.
    pub fn new(capacity: usize) -> Result<Self> {
        CacheBuilder::new(capacity).build()
    }

    /// Creates a cache that reports every capacity eviction to `listener`.
    pub fn with_listener<F>(capacity: usize, listener: F) -> Result<Self>
    where
        F: Fn(&K, Arc<V>) + Send + Sync + 'static,
    {
        CacheBuilder::new(capacity).eviction_listener(listener).build()
    }

    /// Returns a [`CacheBuilder`] for constructing a new cache.
    pub fn builder(capacity: usize) -> CacheBuilder<K, V> {
        CacheBuilder::new(capacity)
    }

    pub(crate) fn from_config(config: CacheConfig<K, V>) -> Self {
        debug!(
            capacity = config.capacity,
            shards = config.num_shards,
            touch_buffer = config.touch_buffer_capacity,
            compaction_slack = config.compaction_slack,
            listener = config.listener.is_some(),
            "creating LRU cache"
        );
        LruCache {
            inner: Arc::new(Inner {
                store: ShardedStore::new(config.num_shards),
                recency: Mutex::new(RecencyQueue::new()),
                touches: TouchBuffer::new(config.touch_buffer_capacity),
                clock: StampClock::new(),
                capacity: config.capacity,
                compaction_slack: config.compaction_slack,
                listener: config.listener,
                propagate_listener_panics: config.propagate_listener_panics,
                metrics: StatsCounter::new(),
            }),
        }
    }

    // -----------------------------------------------------------------------
    // Hot-path: reads
    // -----------------------------------------------------------------------

    /// Returns the value for `key` and marks it most recently used.
    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        let Some(value) = self.inner.store.get(key) else {
            self.inner.metrics.record_miss();
            return None;
        };
        self.inner.metrics.record_hit();
        self.touch(key);
        Some(value)
    }

    /// Returns the value for `key` without affecting its recency or the
    /// hit/miss counters.
    pub fn peek(&self, key: &K) -> Option<Arc<V>> {
        self.inner.store.get(key)
    }

    /// Returns `true` if `key` is live.  Does not count as a use.
    pub fn contains_key(&self, key: &K) -> bool {
        self.inner.store.contains(key)
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    /// Inserts `value` for `key`, returning the previous value.
    ///
    /// Overwriting a live key never evicts.  A new key that takes the cache
    /// over capacity evicts the least-recently-used other entry.
    pub fn insert(&self, key: K, value: V) -> Option<Arc<V>> {
        self.apply(key, |_, _| Decision::Store(value)).previous
    }

    /// Inserts `value` only if `key` is absent.
    ///
    /// Returns the existing value when the key was already live; in that case
    /// nothing is written and the key's recency is left alone.
    pub fn insert_if_absent(&self, key: K, value: V) -> Option<Arc<V>> {
        self.apply(key, |_, current| match current {
            Some(_) => Decision::Keep,
            None => Decision::Store(value),
        })
        .previous
    }

    /// Returns the value for `key`, computing and inserting it on a miss.
    ///
    /// `supplier` runs with no lock held.  Two threads missing on the same key
    /// may both run their supplier; only the first result to be committed is
    /// kept and returned to both.  A supplier returning `None` stores nothing.
    pub fn get_or_insert_with<F>(&self, key: K, supplier: F) -> Option<Arc<V>>
    where
        F: FnOnce() -> Option<V>,
    {
        if let Some(value) = self.get(&key) {
            return Some(value);
        }
        let value = supplier()?;
        self.apply(key, |_, current| match current {
            Some(_) => Decision::Keep,
            None => Decision::Store(value),
        })
        .current
    }

    /// Recomputes the value of a live key.
    ///
    /// `Some` replaces the value, `None` removes the entry without notifying
    /// the eviction listener.  Does nothing if `key` is absent.  The closure
    /// runs under the key's shard lock and must not call back into the cache.
    pub fn compute_if_present<F>(&self, key: &K, remapping: F) -> Option<Arc<V>>
    where
        F: FnOnce(&K, &V) -> Option<V>,
    {
        let mut shard = self.inner.store.write(key);
        let current = shard.get(key)?;
        match remapping(key, &*current) {
            Some(value) => {
                let value = Arc::new(value);
                shard.replace(key, Arc::clone(&value));
                drop(shard);
                self.touch_after_write(key);
                Some(value)
            }
            None => {
                shard.remove(key);
                None
            }
        }
    }

    /// Computes the new value of `key` from its current value, if any.
    ///
    /// Creating a key follows the same growth rules as [`insert`](Self::insert);
    /// returning `None` for a live key removes it without notifying the
    /// listener.  The closure must not call back into the cache.
    pub fn compute<F>(&self, key: K, remapping: F) -> Option<Arc<V>>
    where
        F: FnOnce(&K, Option<&V>) -> Option<V>,
    {
        self.apply(key, |k, current| match remapping(k, current) {
            Some(value) => Decision::Store(value),
            None if current.is_some() => Decision::Remove,
            None => Decision::Keep,
        })
        .current
    }

    /// Stores `value` if `key` is absent, otherwise `combine(old, value)`.
    ///
    /// A `None` from `combine` removes the entry without notifying the
    /// listener.  The closure must not call back into the cache.
    pub fn merge<F>(&self, key: K, value: V, combine: F) -> Option<Arc<V>>
    where
        F: FnOnce(&V, V) -> Option<V>,
    {
        self.apply(key, |_, current| match current {
            None => Decision::Store(value),
            Some(old) => match combine(old, value) {
                Some(merged) => Decision::Store(merged),
                None => Decision::Remove,
            },
        })
        .current
    }

    /// Replaces the value of a live key, returning the old value.
    pub fn replace(&self, key: &K, value: V) -> Option<Arc<V>> {
        let previous = self.inner.store.write(key).replace(key, Arc::new(value));
        if previous.is_some() {
            self.touch_after_write(key);
        }
        previous
    }

    /// Replaces the value of `key` only if it currently equals `expected`.
    pub fn replace_if_eq(&self, key: &K, expected: &V, value: V) -> bool
    where
        V: PartialEq,
    {
        let mut shard = self.inner.store.write(key);
        match shard.get(key) {
            Some(current) if *current == *expected => {
                shard.replace(key, Arc::new(value));
                drop(shard);
                self.touch_after_write(key);
                true
            }
            _ => false,
        }
    }

    /// Removes `key` only if its value currently equals `expected`.  The
    /// eviction listener is not called.
    pub fn remove_if_eq(&self, key: &K, expected: &V) -> bool
    where
        V: PartialEq,
    {
        let mut shard = self.inner.store.write(key);
        match shard.get(key) {
            Some(current) if *current == *expected => shard.remove(key).is_some(),
            _ => false,
        }
    }

    /// Removes `key`, returning its value.  The eviction listener is not
    /// called.
    pub fn remove(&self, key: &K) -> Option<Arc<V>> {
        self.inner.store.remove(key)
    }

    /// Removes every entry.  The eviction listener is not called.
    pub fn clear(&self) {
        let mut queue = self.inner.recency.lock();
        self.inner.store.clear();
        self.inner.touches.clear();
        queue.clear();
    }

    // -----------------------------------------------------------------------
    // Views
    // -----------------------------------------------------------------------

    /// A snapshot of the live keys.
    pub fn keys(&self) -> Keys<'_, K, V> {
        Keys::new(self, self.inner.store.snapshot())
    }

    /// A snapshot of the live values.
    pub fn values(&self) -> Values<'_, K, V> {
        Values::new(self, self.inner.store.snapshot())
    }

    /// A snapshot of the live entries whose values can be updated in place.
    pub fn entries(&self) -> Entries<'_, K, V> {
        Entries::new(self, self.inner.store.snapshot())
    }

    // -----------------------------------------------------------------------
    // Introspection
    // -----------------------------------------------------------------------

    /// Number of live entries.  Never exceeds [`capacity`](Self::capacity).
    pub fn len(&self) -> usize {
        self.inner.store.len()
    }

    /// Returns `true` if the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of entries, as passed to the builder.
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// A point-in-time snapshot of the hit, miss and eviction counters.
    pub fn stats(&self) -> Metrics {
        self.inner.metrics.snapshot()
    }

    /// Zeroes every counter reported by [`stats`](Self::stats).  Entries and
    /// recency are not affected.
    pub fn reset_stats(&self) {
        self.inner.metrics.reset();
    }

    /// Number of recorded use events not yet discarded, stale ones included.
    pub fn recency_queue_len(&self) -> usize {
        let queue = self.inner.recency.lock();
        queue.len() + self.inner.touches.len()
    }

    // -----------------------------------------------------------------------
    // Update core
    // -----------------------------------------------------------------------

    /// Runs `decide` against the current value of `key` and applies its
    /// decision.  `decide` is called exactly once.
    pub(crate) fn apply<F>(&self, key: K, decide: F) -> Applied<V>
    where
        F: FnOnce(&K, Option<&V>) -> Decision<V>,
    {
        // Fast path: the key is live, so nothing this call does can grow the
        // cache and the maintenance lock is not needed.
        {
            let mut shard = self.inner.store.write(&key);
            if let Some(current) = shard.get(&key) {
                let (applied, stored) = Self::apply_to_live(&mut shard, &key, current, decide);
                drop(shard);
                if stored {
                    self.touch_after_write(&key);
                }
                return applied;
            }
        }
        self.apply_growing(key, decide)
    }

    /// Slow path of [`apply`](Self::apply): the key looked absent, so the
    /// call may grow the cache and has to run under the maintenance lock.
    fn apply_growing<F>(&self, key: K, decide: F) -> Applied<V>
    where
        F: FnOnce(&K, Option<&V>) -> Decision<V>,
    {
        let mut queue = self.inner.recency.lock();
        self.inner.touches.drain_into(&mut queue);

        {
            let mut shard = self.inner.store.write(&key);
            if let Some(current) = shard.get(&key) {
                // Another writer created the key in the meantime.
                let (applied, stored) = Self::apply_to_live(&mut shard, &key, current, decide);
                if stored {
                    let stamp = self.inner.clock.tick();
                    queue.push_back(UseEvent {
                        key: key.clone(),
                        stamp,
                    });
                    shard.raise_stamp(&key, stamp);
                }
                return applied;
            }
        }

        // Absent keys are only created under the maintenance lock, so the key
        // stays absent until we insert it below.
        let value = match decide(&key, None) {
            Decision::Store(value) => Arc::new(value),
            Decision::Keep | Decision::Remove => return Applied::absent(),
        };

        // Make room first so `len` never exceeds capacity, even while this
        // call is still in flight.
        let evicted = self.evict_to_fit(&mut queue);

        let stamp = self.inner.clock.tick();
        queue.push_back(UseEvent {
            key: key.clone(),
            stamp,
        });
        self.inner
            .store
            .write(&key)
            .insert_new(key, Arc::clone(&value), stamp);

        self.compact_if_needed(&mut queue);
        drop(queue);

        self.dispatch_evictions(evicted);
        Applied {
            previous: None,
            current: Some(value),
        }
    }

    /// Applies `decide` to a key known to be live in `shard`.
    ///
    /// Returns the outcome and whether a new value was stored.
    fn apply_to_live<F>(
        shard: &mut ShardMut<'_, K, V>,
        key: &K,
        current: Arc<V>,
        decide: F,
    ) -> (Applied<V>, bool)
    where
        F: FnOnce(&K, Option<&V>) -> Decision<V>,
    {
        match decide(key, Some(&*current)) {
            Decision::Keep => (
                Applied {
                    previous: Some(Arc::clone(&current)),
                    current: Some(current),
                },
                false,
            ),
            Decision::Store(value) => {
                let value = Arc::new(value);
                shard.replace(key, Arc::clone(&value));
                (
                    Applied {
                        previous: Some(current),
                        current: Some(value),
                    },
                    true,
                )
            }
            Decision::Remove => {
                shard.remove(key);
                (
                    Applied {
                        previous: Some(current),
                        current: None,
                    },
                    false,
                )
            }
        }
    }

    // -----------------------------------------------------------------------
    // Recency bookkeeping
    // -----------------------------------------------------------------------

    /// Records a use of `key`.
    ///
    /// The event is queued before the store's stamp is raised, so a live
    /// entry always has a queued event carrying its current stamp.
    fn touch(&self, key: &K) {
        let stamp = self.inner.clock.tick();
        let event = UseEvent {
            key: key.clone(),
            stamp,
        };
        if let Err(event) = self.inner.touches.push(event) {
            let mut queue = self.inner.recency.lock();
            self.inner.touches.drain_into(&mut queue);
            queue.push_back(event);
            self.compact_if_needed(&mut queue);
        }
        self.inner.store.raise_stamp(key, stamp);
    }

    fn touch_after_write(&self, key: &K) {
        self.touch(key);
        if self.inner.touches.needs_drain() {
            self.try_maintain();
        }
    }

    fn try_maintain(&self) {
        let Some(mut queue) = self.inner.recency.try_lock() else { return };
        self.inner.touches.drain_into(&mut queue);
        self.compact_if_needed(&mut queue);
    }

    /// Drops stale events once the queue holds more than `compaction_slack`
    /// events beyond the live entry count.
    fn compact_if_needed(&self, queue: &mut RecencyQueue<K>) {
        let live = self.inner.store.len();
        let queued = queue.len();
        if queued <= live.saturating_add(self.inner.compaction_slack) {
            return;
        }
        let store = &self.inner.store;
        let dropped = queue.compact(|e| store.is_current(&e.key, e.stamp));
        self.inner.metrics.record_compaction();
        debug!(
            before = queued,
            after = queue.len(),
            dropped,
            live,
            "compacted recency queue"
        );
    }

    // -----------------------------------------------------------------------
    // Eviction
    // -----------------------------------------------------------------------

    /// Evicts least-recently-used entries until one more entry fits.
    ///
    /// Evicted entries are already unreachable when this returns; the caller
    /// reports them to the listener after releasing the maintenance lock.
    fn evict_to_fit(&self, queue: &mut RecencyQueue<K>) -> Vec<(K, Arc<V>)> {
        let mut evicted = Vec::new();

        while self.inner.store.len() >= self.inner.capacity {
            let Some(event) = queue.pop_front() else {
                if self.inner.touches.drain_into(queue) > 0 {
                    continue;
                }
                // Every live entry has a queued event, so this means the
                // bookkeeping is broken.  Still honour the capacity bound.
                warn!(
                    len = self.inner.store.len(),
                    capacity = self.inner.capacity,
                    "recency queue exhausted while at capacity"
                );
                let Some(key) = self.inner.store.any_key() else {
                    break;
                };
                if let Some(value) = self.inner.store.remove(&key) {
                    evicted.push((key, value));
                }
                continue;
            };

            if let Some(value) = self.inner.store.evict_if_unchanged(&event.key, event.stamp) {
                trace!(stamp = event.stamp, "evicting least-recently-used entry");
                evicted.push((event.key, value));
            }
        }
        evicted
    }

    /// Reports evicted entries to the listener, isolating listener panics.
    fn dispatch_evictions(&self, evicted: Vec<(K, Arc<V>)>) {
        if evicted.is_empty() {
            return;
        }
        self.inner.metrics.record_eviction(evicted.len() as u64);
        let Some(listener) = &self.inner.listener else { return };

        let mut first_panic = None;
        for (key, value) in evicted {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| listener.on_evict(&key, value)));
            if let Err(payload) = outcome {
                self.inner.metrics.record_listener_panic();
                error!(
                    panic = panic_message(payload.as_ref()),
                    "eviction listener panicked"
                );
                if self.inner.propagate_listener_panics && first_panic.is_none() {
                    first_panic = Some(payload);
                }
            }
        }
        if let Some(payload) = first_panic {
            panic::resume_unwind(payload);
        }
    }
}
