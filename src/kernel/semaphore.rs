// Binary semaphore used as a plain lock
//
// take/give are separate calls (not a guard-only API) because the task
// interface exposes lock()/unlock() pairs that may straddle function
// boundaries. Not reentrant: a second take from the holder blocks.
// give() on a free semaphore is a no-op.

use parking_lot::{Condvar, Mutex, const_mutex};

use super::timeout;

pub struct BinarySemaphore {
    taken: Mutex<bool>,
    freed: Condvar,
}

impl BinarySemaphore {
    pub const fn new() -> Self {
        Self {
            taken: const_mutex(false),
            freed: Condvar::new(),
        }
    }

    /// Acquire, waiting up to `timeout_ms` ([`timeout::FOREVER`] blocks).
    pub fn take(&self, timeout_ms: u32) -> bool {
        let deadline = timeout::deadline(timeout_ms);
        let mut taken = self.taken.lock();
        while *taken {
            match deadline {
                None => self.freed.wait(&mut taken),
                Some(at) => {
                    if self.freed.wait_until(&mut taken, at).timed_out() && *taken {
                        return false;
                    }
                }
            }
        }
        *taken = true;
        true
    }

    pub fn give(&self) {
        let mut taken = self.taken.lock();
        if *taken {
            *taken = false;
            self.freed.notify_one();
        }
    }

    #[cfg(test)]
    fn is_taken(&self) -> bool {
        *self.taken.lock()
    }
}

impl Default for BinarySemaphore {
    fn default() -> Self {
        Self::new()
    }
}

/// Releases the borrowed semaphore when dropped.
pub struct SemaphoreGuard<'a> {
    sem: &'a BinarySemaphore,
}

impl<'a> SemaphoreGuard<'a> {
    pub fn acquire(sem: &'a BinarySemaphore, timeout_ms: u32) -> Option<Self> {
        sem.take(timeout_ms).then(|| Self { sem })
    }
}

impl Drop for SemaphoreGuard<'_> {
    fn drop(&mut self) {
        self.sem.give();
    }
}
