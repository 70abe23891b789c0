//! Recency bookkeeping for LRU victim selection.
//!
//! Every use of a key (insert, overwrite, read hit) appends a [`UseEvent`]
//! stamped from a monotonic clock.  Old events for the same key are never
//! searched for and unlinked; they stay in the queue until eviction or
//! compaction pops them and finds that the store holds a newer stamp.
//!
//! The queue is a hint.  Whether a key is live, and which of its events is
//! current, is always decided by the store.

pub(crate) mod buffer;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

/// "`key` was used at logical time `stamp`."
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct UseEvent<K> {
    pub(crate) key: K,
    pub(crate) stamp: u64,
}

/// Source of use stamps.  Stamps start at 1 and are unique per clock.
pub(crate) struct StampClock {
    next: AtomicU64,
}

impl StampClock {
    pub(crate) fn new() -> Self {
        StampClock {
            next: AtomicU64::new(1),
        }
    }

    #[inline]
    pub(crate) fn tick(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

/// FIFO of use events, oldest at the front.
///
/// Owned by the cache's maintenance lock; never touched concurrently.
pub(crate) struct RecencyQueue<K> {
    events: VecDeque<UseEvent<K>>,
}

impl<K> RecencyQueue<K> {
    pub(crate) fn new() -> Self {
        RecencyQueue {
            events: VecDeque::new(),
        }
    }

    #[inline]
    pub(crate) fn push_back(&mut self, event: UseEvent<K>) {
        self.events.push_back(event);
    }

    #[inline]
    pub(crate) fn pop_front(&mut self) -> Option<UseEvent<K>> {
        self.events.pop_front()
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.events.len()
    }

    /// Drops every event for which `is_current` returns `false`, keeping
    /// the relative order of the survivors.  Returns the number dropped.
    pub(crate) fn compact<F>(&mut self, mut is_current: F) -> usize
    where
        F: FnMut(&UseEvent<K>) -> bool,
    {
        let before = self.events.len();
        self.events.retain(|e| is_current(e));
        if self.events.capacity() > 2 * self.events.len().max(16) {
            self.events.shrink_to(self.events.len() * 2);
        }
        before - self.events.len()
    }

    pub(crate) fn clear(&mut self) {
        self.events.clear();
    }
}

impl<K> Default for RecencyQueue<K> {
    fn default() -> Self {
        Self::new()
    }
}
