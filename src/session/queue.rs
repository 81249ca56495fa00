//! Dispatch Queue
//!
//! Bounded circular buffer handing newly registered sessions from the
//! intake thread to the session-worker pool.

use parking_lot::Mutex;

use crate::sync::Semaphore;

/// Slot storage plus cursors, guarded by the queue mutex
struct Ring<T> {
    slots: Vec<Option<T>>,
    produce: usize,
    consume: usize,
    len: usize,
    closed: bool,
}

/// Classic bounded-buffer producer/consumer queue.
///
/// `empty` counts free slots, `filled` counts occupied ones; until the
/// queue is closed, `empty + filled == capacity` whenever no push/pop is
/// mid-flight.
pub struct DispatchQueue<T> {
    ring: Mutex<Ring<T>>,
    empty: Semaphore,
    filled: Semaphore,
    capacity: usize,
}

impl<T> DispatchQueue<T> {
    /// Create a queue with `capacity` slots (at least 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            ring: Mutex::new(Ring {
                slots: (0..capacity).map(|_| None).collect(),
                produce: 0,
                consume: 0,
                len: 0,
                closed: false,
            }),
            empty: Semaphore::new(capacity),
            filled: Semaphore::new(0),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of items waiting to be consumed
    pub fn len(&self) -> usize {
        self.ring.lock().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append an item, blocking while every slot is taken.
    ///
    /// Hands the item back if the queue has been closed.
    pub fn push(&self, item: T) -> Result<(), T> {
        self.empty.acquire();

        let mut ring = self.ring.lock();
        if ring.closed {
            // Pass the close() wake-up on to the next blocked producer.
            drop(ring);
            self.empty.release();
            return Err(item);
        }
        let at = ring.produce;
        ring.slots[at] = Some(item);
        ring.produce = (at + 1) % self.capacity;
        ring.len += 1;
        drop(ring);

        self.filled.release();
        Ok(())
    }

    /// Take the oldest item, blocking while the queue is empty.
    ///
    /// Returns `None` once the queue is closed and drained.
    pub fn pop(&self) -> Option<T> {
        self.filled.acquire();

        let mut ring = self.ring.lock();
        if ring.len == 0 {
            // Only the close() wake-up gets here; pass it on to the next consumer.
            drop(ring);
            self.filled.release();
            return None;
        }
        let at = ring.consume;
        let item = ring.slots[at].take();
        ring.consume = (at + 1) % self.capacity;
        ring.len -= 1;
        drop(ring);

        self.empty.release();
        item
    }

    /// Stop accepting items.
    ///
    /// Blocked producers wake and get their item back. Blocked consumers
    /// wake once the remaining items are drained.
    pub fn close(&self) {
        let mut ring = self.ring.lock();
        if ring.closed {
            return;
        }
        ring.closed = true;
        drop(ring);
        self.empty.release();
        self.filled.release();
    }

    pub fn is_closed(&self) -> bool {
        self.ring.lock().closed
    }
}
