//! Snapshot views over the live entries of an [`LruCache`].
//!
//! Views are taken shard by shard and do not track later changes.  They can
//! remove entries through the cache, and [`EntryRef::set_value`] writes
//! through it, but adding through a view is rejected: a view has no way to
//! run the growth and eviction bookkeeping of an insertion.
//!
//! The module is public so the view types can be named in signatures.
//!
//! # Example
//! ```
//! use lrumap::{CacheError, LruCache};
//!
//! let cache: LruCache<&str, u32> = LruCache::new(8).unwrap();
//! cache.insert("a", 1);
//!
//! let mut keys = cache.keys();
//! assert!(matches!(keys.add("b"), Err(CacheError::UnsupportedOperation(_))));
//!
//! for mut entry in cache.entries() {
//!     let doubled = **entry.value() * 2;
//!     entry.set_value(doubled);
//! }
//! assert_eq!(cache.get(&"a").as_deref(), Some(&2));
//! ```

use std::hash::Hash;
use std::sync::Arc;

use crate::cache::{Decision, LruCache};
use crate::error::{CacheError, Result};

// ---------------------------------------------------------------------------
// Keys
// ---------------------------------------------------------------------------

/// Snapshot of the live keys, returned by [`LruCache::keys`].
pub struct Keys<'a, K, V> {
    cache: &'a LruCache<K, V>,
    keys: Vec<K>,
}

impl<'a, K, V> Keys<'a, K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    pub(crate) fn new(cache: &'a LruCache<K, V>, snapshot: Vec<(K, Arc<V>)>) -> Self {
        Keys {
            cache,
            keys: snapshot.into_iter().map(|(k, _)| k).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, K> {
        self.keys.iter()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.keys.contains(key)
    }

    /// Removes `key` from the cache and from this view.
    pub fn remove(&mut self, key: &K) -> bool {
        self.keys.retain(|k| k != key);
        self.cache.remove(key).is_some()
    }

    /// Always fails: keys cannot be added without a value.
    pub fn add(&mut self, _key: K) -> Result<bool> {
        Err(CacheError::UnsupportedOperation("add on a keys view"))
    }
}

impl<K, V> IntoIterator for Keys<'_, K, V> {
    type Item = K;
    type IntoIter = std::vec::IntoIter<K>;

    fn into_iter(self) -> Self::IntoIter {
        self.keys.into_iter()
    }
}

// ---------------------------------------------------------------------------
// Values
// ---------------------------------------------------------------------------

/// Snapshot of the live values, returned by [`LruCache::values`].
pub struct Values<'a, K, V> {
    cache: &'a LruCache<K, V>,
    keys: Vec<K>,
    values: Vec<Arc<V>>,
}

impl<'a, K, V> Values<'a, K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    pub(crate) fn new(cache: &'a LruCache<K, V>, snapshot: Vec<(K, Arc<V>)>) -> Self {
        let (keys, values) = snapshot.into_iter().unzip();
        Values {
            cache,
            keys,
            values,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Arc<V>> {
        self.values.iter()
    }

    pub fn contains(&self, value: &V) -> bool
    where
        V: PartialEq,
    {
        self.values.iter().any(|v| **v == *value)
    }

    /// Removes the first entry holding `value` from the cache and this view.
    ///
    /// The cache entry is only removed if it still holds `value`; an entry
    /// overwritten since the view was taken is left alone and `false` is
    /// returned.
    pub fn remove(&mut self, value: &V) -> bool
    where
        V: PartialEq,
    {
        let Some(pos) = self.values.iter().position(|v| **v == *value) else {
            return false;
        };
        if !self.cache.remove_if_eq(&self.keys[pos], value) {
            return false;
        }
        self.values.remove(pos);
        self.keys.remove(pos);
        true
    }

    /// Always fails: values cannot be added without a key.
    pub fn add(&mut self, _value: V) -> Result<bool> {
        Err(CacheError::UnsupportedOperation("add on a values view"))
    }
}

impl<K, V> IntoIterator for Values<'_, K, V> {
    type Item = Arc<V>;
    type IntoIter = std::vec::IntoIter<Arc<V>>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.into_iter()
    }
}

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

/// One entry yielded by an [`Entries`] view.
pub struct EntryRef<'a, K, V> {
    cache: &'a LruCache<K, V>,
    key: K,
    value: Arc<V>,
}

impl<K, V> EntryRef<'_, K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    pub fn key(&self) -> &K {
        &self.key
    }

    /// The value at the time the view was taken, or the last value set
    /// through this handle.
    pub fn value(&self) -> &Arc<V> {
        &self.value
    }

    /// Writes `value` through to the cache.
    ///
    /// Behaves exactly like [`LruCache::insert`] for this key: the entry
    /// becomes most recently used, and if it was removed since the view was
    /// taken it is inserted again under the usual eviction rules.
    pub fn set_value(&mut self, value: V) -> Option<Arc<V>> {
        let applied = self
            .cache
            .apply(self.key.clone(), |_, _| Decision::Store(value));
        if let Some(current) = applied.current {
            self.value = current;
        }
        applied.previous
    }
}

/// Snapshot of the live entries, returned by [`LruCache::entries`].
pub struct Entries<'a, K, V> {
    entries: Vec<EntryRef<'a, K, V>>,
}

impl<'a, K, V> Entries<'a, K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    pub(crate) fn new(cache: &'a LruCache<K, V>, snapshot: Vec<(K, Arc<V>)>) -> Self {
        Entries {
            entries: snapshot
                .into_iter()
                .map(|(key, value)| EntryRef { cache, key, value })
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, EntryRef<'a, K, V>> {
        self.entries.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, EntryRef<'a, K, V>> {
        self.entries.iter_mut()
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.entries.iter().any(|e| e.key == *key)
    }

    /// Removes `key` from the cache and from this view.
    pub fn remove(&mut self, key: &K) -> bool {
        let Some(pos) = self.entries.iter().position(|e| e.key == *key) else {
            return false;
        };
        let entry = self.entries.remove(pos);
        entry.cache.remove(key).is_some()
    }

    /// Always fails: use [`LruCache::insert`] to add entries.
    pub fn add(&mut self, _key: K, _value: V) -> Result<bool> {
        Err(CacheError::UnsupportedOperation("add on an entries view"))
    }
}

impl<'a, K, V> IntoIterator for Entries<'a, K, V> {
    type Item = EntryRef<'a, K, V>;
    type IntoIter = std::vec::IntoIter<EntryRef<'a, K, V>>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}
