//! Bounded MPSC touch buffer backed by a lock-free `ArrayQueue`.
//!
//! Read hits enqueue their use event here so the hot read path never blocks
//! on the maintenance mutex.  Whoever holds the mutex drains the buffer into
//! the [`RecencyQueue`] before looking for eviction victims.
//!
//! If the buffer is full when a push is attempted, the event is returned to
//! the caller as `Err(event)` so it can be applied synchronously.  Touches
//! must never be lost: the store only records a stamp after its event was
//! queued, and an entry whose current stamp has no event could never be
//! chosen as a victim.

use crossbeam_queue::ArrayQueue;

use super::{RecencyQueue, UseEvent};

/// Default capacity of the touch buffer.
pub(crate) const DEFAULT_TOUCH_BUFFER_CAPACITY: usize = 128;

pub(crate) struct TouchBuffer<K> {
    queue: ArrayQueue<UseEvent<K>>,
}

impl<K: Send> TouchBuffer<K> {
    pub(crate) fn new(capacity: usize) -> Self {
        TouchBuffer {
            queue: ArrayQueue::new(capacity),
        }
    }

    /// Enqueues `event`.
    ///
    /// Returns `Err(event)` if the buffer is full.  The caller **must not
    /// drop** a returned `Err`.
    #[inline]
    pub(crate) fn push(&self, event: UseEvent<K>) -> Result<(), UseEvent<K>> {
        self.queue.push(event)
    }

    /// `true` once at least half the slots are taken.
    #[inline]
    pub(crate) fn needs_drain(&self) -> bool {
        self.queue.len() * 2 >= self.queue.capacity()
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.queue.len()
    }

    /// Moves every pending event to the back of `out`, in FIFO order.
    ///
    /// Called only while holding the maintenance lock.
    pub(crate) fn drain_into(&self, out: &mut RecencyQueue<K>) -> usize {
        let mut n = 0;
        while let Some(event) = self.queue.pop() {
            out.push_back(event);
            n += 1;
        }
        n
    }

    pub(crate) fn clear(&self) {
        while self.queue.pop().is_some() {}
    }
}
