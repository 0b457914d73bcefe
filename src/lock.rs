//! # Cross-Process Lock
//!
//! A binary lock over the superpage lock word. The word lives in shared
//! memory, so any process that has the space mapped contends on the same
//! atomic. Acquisition is a compare-exchange of 0 to 1 with `Acquire`
//! ordering; release stores 0 with `Release`, which publishes the
//! holder's store writes to the next acquirer.
//!
//! Waiters spin briefly, then sleep 1 ms between retries. Holders never
//! sleep; critical sections are one store scan plus one payload copy.
//!
//! A holder that dies leaves the space locked. Recovering from that
//! requires destroying the space; there is no deadlock detection here.

use std::sync::atomic::{AtomicU32, Ordering};
use std::thread;

use crate::config::LOCK_RETRY_INTERVAL;

const UNLOCKED: u32 = 0;
const LOCKED: u32 = 1;

const SPIN_LIMIT: u32 = 64;

/// Holds the space lock for its lifetime. Releases on drop, so every
/// exit path of a critical section unlocks.
pub(crate) struct SpaceLockGuard<'a> {
    word: &'a AtomicU32,
}

impl<'a> SpaceLockGuard<'a> {
    /// Blocks until the lock word is won.
    pub(crate) fn acquire(word: &'a AtomicU32) -> Self {
        let mut spins = 0u32;
        loop {
            if word
                .compare_exchange(UNLOCKED, LOCKED, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                return Self { word };
            }
            if spins < SPIN_LIMIT {
                spins += 1;
                std::hint::spin_loop();
            } else {
                thread::sleep(LOCK_RETRY_INTERVAL);
            }
        }
    }
}

impl Drop for SpaceLockGuard<'_> {
    fn drop(&mut self) {
        self.word.store(UNLOCKED, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Barrier;
    use std::time::Duration;

    #[test]
    fn guard_releases_on_drop() {
        let word = AtomicU32::new(UNLOCKED);

        {
            let _guard = SpaceLockGuard::acquire(&word);
            assert_eq!(word.load(Ordering::Relaxed), LOCKED);
        }

        assert_eq!(word.load(Ordering::Relaxed), UNLOCKED);
    }

    #[test]
    fn lock_is_mutually_exclusive_under_contention() {
        let word = AtomicU32::new(UNLOCKED);
        let holders = AtomicU32::new(0);
        let barrier = Barrier::new(4);

        thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    barrier.wait();
                    for _ in 0..50 {
                        let _guard = SpaceLockGuard::acquire(&word);
                        let inside = holders.fetch_add(1, Ordering::SeqCst);
                        assert_eq!(inside, 0, "two threads inside the lock");
                        thread::sleep(Duration::from_micros(10));
                        holders.fetch_sub(1, Ordering::SeqCst);
                    }
                });
            }
        });

        assert_eq!(word.load(Ordering::Relaxed), UNLOCKED);
    }

    #[test]
    fn acquire_waits_for_release() {
        let word = AtomicU32::new(LOCKED);

        thread::scope(|s| {
            s.spawn(|| {
                thread::sleep(Duration::from_millis(5));
                word.store(UNLOCKED, Ordering::Release);
            });

            let _guard = SpaceLockGuard::acquire(&word);
            assert_eq!(word.load(Ordering::Relaxed), LOCKED);
        });
    }
}
