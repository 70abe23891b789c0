use std::hash::Hash;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use ahash::{AHashMap, RandomState};
use parking_lot::{RwLock, RwLockWriteGuard};

// ---------------------------------------------------------------------------
// StoreEntry
// ---------------------------------------------------------------------------

/// A single live entry.
///
/// `stamp` is the most recent use stamp recorded for this entry.  It only
/// ever grows (`fetch_max`), so it can be bumped under the shard's read lock
/// on the `get` hot path.
pub(crate) struct StoreEntry<V> {
    pub(crate) value: Arc<V>,
    pub(crate) stamp: AtomicU64,
}

impl<V> StoreEntry<V> {
    fn new(value: Arc<V>, stamp: u64) -> Self {
        StoreEntry {
            value,
            stamp: AtomicU64::new(stamp),
        }
    }

    #[inline]
    fn stamp(&self) -> u64 {
        self.stamp.load(Ordering::Acquire)
    }
}

// ---------------------------------------------------------------------------
// Shard
// ---------------------------------------------------------------------------

/// Cache-line padding to prevent false sharing between shards.
#[repr(align(64))]
pub(crate) struct Shard<K, V> {
    pub(crate) map: RwLock<AHashMap<K, StoreEntry<V>>>,
}

/// Exclusive access to the shard that owns one key.
///
/// Structural changes go through this guard so the store-wide live counter
/// is adjusted while the shard lock is still held.
pub(crate) struct ShardMut<'a, K, V> {
    map: RwLockWriteGuard<'a, AHashMap<K, StoreEntry<V>>>,
    len: &'a AtomicUsize,
}

impl<K: Hash + Eq, V> ShardMut<'_, K, V> {
    pub(crate) fn get(&self, key: &K) -> Option<Arc<V>> {
        self.map.get(key).map(|e| Arc::clone(&e.value))
    }

    /// Swaps the value of a live entry, returning the old one.
    pub(crate) fn replace(&mut self, key: &K, value: Arc<V>) -> Option<Arc<V>> {
        self.map
            .get_mut(key)
            .map(|e| std::mem::replace(&mut e.value, value))
    }

    /// Inserts an entry for a key that is known to be absent.
    pub(crate) fn insert_new(&mut self, key: K, value: Arc<V>, stamp: u64) {
        let prev = self.map.insert(key, StoreEntry::new(value, stamp));
        debug_assert!(prev.is_none(), "insert_new called for a live key");
        if prev.is_none() {
            self.len.fetch_add(1, Ordering::AcqRel);
        }
    }

    pub(crate) fn remove(&mut self, key: &K) -> Option<Arc<V>> {
        let removed = self.map.remove(key)?;
        self.len.fetch_sub(1, Ordering::AcqRel);
        Some(removed.value)
    }

    pub(crate) fn raise_stamp(&self, key: &K, stamp: u64) {
        if let Some(entry) = self.map.get(key) {
            entry.stamp.fetch_max(stamp, Ordering::AcqRel);
        }
    }
}

// ---------------------------------------------------------------------------
// ShardedStore
// ---------------------------------------------------------------------------

/// A thread-safe key-value store backed by `N` independently-locked shards.
///
/// Reads use a shared lock, writes use an exclusive lock, both per-shard.
/// The number of live entries is tracked in a single atomic so `len` is O(1)
/// and can be consulted by the eviction loop without visiting every shard.
pub(crate) struct ShardedStore<K, V> {
    shards: Box<[Shard<K, V>]>,
    /// Always `shards.len() - 1`; shards.len() is a power of two.
    shard_mask: usize,
    /// Hasher used only to compute shard indices.
    build_hasher: RandomState,
    len: AtomicUsize,
}

impl<K: Hash + Eq + Clone, V> ShardedStore<K, V> {
    pub(crate) fn new(num_shards: usize) -> Self {
        debug_assert!(num_shards.is_power_of_two());
        let shards = (0..num_shards)
            .map(|_| Shard {
                map: RwLock::new(AHashMap::new()),
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();

        ShardedStore {
            shards,
            shard_mask: num_shards - 1,
            build_hasher: RandomState::new(),
            len: AtomicUsize::new(0),
        }
    }

    #[inline]
    fn shard_index(&self, key: &K) -> usize {
        let h = self.build_hasher.hash_one(key);
        // Use the high bits (better avalanche from ahash).
        ((h >> 32) as usize) & self.shard_mask
    }

    // -----------------------------------------------------------------------
    // Read path
    // -----------------------------------------------------------------------

    pub(crate) fn get(&self, key: &K) -> Option<Arc<V>> {
        let idx = self.shard_index(key);
        self.shards[idx]
            .map
            .read()
            .get(key)
            .map(|e| Arc::clone(&e.value))
    }

    pub(crate) fn contains(&self, key: &K) -> bool {
        let idx = self.shard_index(key);
        self.shards[idx].map.read().contains_key(key)
    }

    /// Records that `key` was used at `stamp`.  No-op if the key is gone.
    pub(crate) fn raise_stamp(&self, key: &K, stamp: u64) {
        let idx = self.shard_index(key);
        if let Some(entry) = self.shards[idx].map.read().get(key) {
            entry.stamp.fetch_max(stamp, Ordering::AcqRel);
        }
    }

    /// Returns `true` if a use event `(key, stamp)` still describes the
    /// latest recorded use of a live entry.
    pub(crate) fn is_current(&self, key: &K, stamp: u64) -> bool {
        let idx = self.shard_index(key);
        self.shards[idx]
            .map
            .read()
            .get(key)
            .is_some_and(|e| e.stamp() <= stamp)
    }

    // -----------------------------------------------------------------------
    // Write path
    // -----------------------------------------------------------------------

    /// Locks the shard that owns `key` for writing.
    pub(crate) fn write(&self, key: &K) -> ShardMut<'_, K, V> {
        let idx = self.shard_index(key);
        ShardMut {
            map: self.shards[idx].map.write(),
            len: &self.len,
        }
    }

    pub(crate) fn remove(&self, key: &K) -> Option<Arc<V>> {
        self.write(key).remove(key)
    }

    /// Removes `key` only if it has not been used after `stamp`.
    ///
    /// This is the eviction primitive: the check and the removal happen under
    /// one shard lock, so an entry touched or removed concurrently is never
    /// handed to the eviction listener.
    pub(crate) fn evict_if_unchanged(&self, key: &K, stamp: u64) -> Option<Arc<V>> {
        let mut shard = self.write(key);
        let unchanged = shard.map.get(key).is_some_and(|e| e.stamp() <= stamp);
        if unchanged {
            shard.remove(key)
        } else {
            None
        }
    }

    /// Returns some live key, if any.
    pub(crate) fn any_key(&self) -> Option<K> {
        self.shards
            .iter()
            .find_map(|shard| shard.map.read().keys().next().cloned())
    }

    /// Copies every live entry, shard by shard.
    ///
    /// The result is not an atomic snapshot of the whole store: entries
    /// written to a shard after it was visited are not included.
    pub(crate) fn snapshot(&self) -> Vec<(K, Arc<V>)> {
        let mut out = Vec::with_capacity(self.len());
        for shard in self.shards.iter() {
            out.extend(
                shard
                    .map
                    .read()
                    .iter()
                    .map(|(k, e)| (k.clone(), Arc::clone(&e.value))),
            );
        }
        out
    }

    /// Returns the total number of entries across all shards.
    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    /// Removes all entries from every shard.
    pub(crate) fn clear(&self) {
        for shard in self.shards.iter() {
            let mut map = shard.map.write();
            let n = map.len();
            map.clear();
            self.len.fetch_sub(n, Ordering::AcqRel);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_new_and_remove_track_len() {
        let store: ShardedStore<u32, &str> = ShardedStore::new(4);
        store.write(&1).insert_new(1, Arc::new("a"), 1);
        store.write(&2).insert_new(2, Arc::new("b"), 2);
        assert_eq!(store.len(), 2);
        assert_eq!(store.remove(&1).as_deref(), Some(&"a"));
        assert_eq!(store.remove(&1), None);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn evict_if_unchanged_skips_touched_entries() {
        let store: ShardedStore<u32, u32> = ShardedStore::new(1);
        store.write(&7).insert_new(7, Arc::new(70), 3);
        store.raise_stamp(&7, 9);

        assert!(!store.is_current(&7, 3));
        assert_eq!(store.evict_if_unchanged(&7, 3), None);
        assert!(store.is_current(&7, 9));
        assert_eq!(store.evict_if_unchanged(&7, 9).as_deref(), Some(&70));
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn raise_stamp_never_lowers() {
        let store: ShardedStore<u32, u32> = ShardedStore::new(1);
        store.write(&1).insert_new(1, Arc::new(1), 10);
        store.raise_stamp(&1, 4);
        assert!(store.is_current(&1, 10));
        assert!(!store.is_current(&1, 9));
    }

    #[test]
    fn clear_resets_len() {
        let store: ShardedStore<u32, u32> = ShardedStore::new(8);
        for i in 0..100 {
            store.write(&i).insert_new(i, Arc::new(i), u64::from(i));
        }
        assert_eq!(store.len(), 100);
        assert_eq!(store.snapshot().len(), 100);
        store.clear();
        assert_eq!(store.len(), 0);
        assert!(store.any_key().is_none());
    }
}
