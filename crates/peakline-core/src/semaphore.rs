//! Counting semaphore bounding concurrent subprocess invocations.
//!
//! `Mutex + Condvar` from std — no external dependencies.

use std::sync::{Condvar, Mutex};

/// A counting semaphore limiting how many external tools run at once.
pub struct Semaphore {
    permits: Mutex<usize>,
    cond: Condvar,
}

/// RAII guard that returns one permit on drop.
pub struct SemaphoreGuard<'a>(&'a Semaphore);

impl Semaphore {
    pub fn new(permits: usize) -> Self {
        Self {
            permits: Mutex::new(permits),
            cond: Condvar::new(),
        }
    }

    /// Block until a permit is available, then take it.
    pub fn acquire(&self) -> SemaphoreGuard<'_> {
        let mut count = self.permits.lock().unwrap();
        while *count == 0 {
            count = self.cond.wait(count).unwrap();
        }
        *count -= 1;
        SemaphoreGuard(self)
    }

    /// Take a permit if one is free, without blocking.
    pub fn try_acquire(&self) -> Option<SemaphoreGuard<'_>> {
        let mut count = self.permits.lock().unwrap();
        if *count == 0 {
            return None;
        }
        *count -= 1;
        Some(SemaphoreGuard(self))
    }
}

impl Drop for SemaphoreGuard<'_> {
    fn drop(&mut self) {
        let mut count = self.0.permits.lock().unwrap();
        *count += 1;
        self.0.cond.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn acquire_and_release() {
        let sem = Semaphore::new(2);
        let g1 = sem.acquire();
        let _g2 = sem.acquire();
        assert!(sem.try_acquire().is_none());
        drop(g1);
        assert!(sem.try_acquire().is_some());
    }

    #[test]
    fn blocking_acquire_unblocks() {
        let sem = Arc::new(Semaphore::new(1));
        let guard = sem.acquire();

        let sem2 = sem.clone();
        let handle = std::thread::spawn(move || {
            let _g = sem2.acquire();
            42
        });

        // Give the thread time to block on the semaphore
        std::thread::sleep(std::time::Duration::from_millis(50));
        drop(guard);

        assert_eq!(handle.join().unwrap(), 42);
    }
}
