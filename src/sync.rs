//! Blocking synchronization primitives
//!
//! A counting semaphore built on parking_lot's `Mutex` + `Condvar`, used by
//! the dispatch queue (empty/filled slots) and the backup limiter.

use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

/// Counting semaphore.
///
/// `acquire` blocks while the count is zero; `release` increments the count
/// and wakes one waiter.
#[derive(Debug)]
pub struct Semaphore {
    permits: Mutex<usize>,
    available: Condvar,
}

impl Semaphore {
    pub fn new(permits: usize) -> Self {
        Self {
            permits: Mutex::new(permits),
            available: Condvar::new(),
        }
    }

    /// Wait until a permit is available, then take it.
    pub fn acquire(&self) {
        let mut permits = self.permits.lock();
        while *permits == 0 {
            self.available.wait(&mut permits);
        }
        *permits -= 1;
    }

    /// Take a permit if one is available right now.
    pub fn try_acquire(&self) -> bool {
        let mut permits = self.permits.lock();
        if *permits == 0 {
            return false;
        }
        *permits -= 1;
        true
    }

    /// Return a permit.
    pub fn release(&self) {
        let mut permits = self.permits.lock();
        *permits += 1;
        self.available.notify_one();
    }

    /// Current number of free permits.
    pub fn available_permits(&self) -> usize {
        *self.permits.lock()
    }

    /// Acquire a permit that is returned when the guard drops.
    ///
    /// The guard owns an `Arc` so it can move to another thread.
    pub fn acquire_owned(self: &Arc<Self>) -> SemaphorePermit {
        self.acquire();
        SemaphorePermit {
            semaphore: Arc::clone(self),
        }
    }
}

/// RAII permit from [`Semaphore::acquire_owned`].
#[derive(Debug)]
pub struct SemaphorePermit {
    semaphore: Arc<Semaphore>,
}

impl Drop for SemaphorePermit {
    fn drop(&mut self) {
        self.semaphore.release();
    }
}
