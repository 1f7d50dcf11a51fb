//! Exponential backoff for the bounded spins of the queues.
//!
//! A queue spins only while another thread finishes a publication it has already
//! started: a node link, a chunk link or an element store. Those windows are a few
//! instructions long unless the publishing thread gets preempted, so [`Backoff`]
//! spins first and starts yielding the time slice once spinning stops paying off.
use crate::hints::likely;
use crate::loom_bindings::hint::spin_loop;
use crate::loom_bindings::thread::yield_now;
use std::cell::Cell;
use std::fmt;

const SPIN_LIMIT: u32 = 6;
const YIELD_LIMIT: u32 = 10;

/// Performs exponential backoff in spin loops.
///
/// Each step spins about twice as long as the previous one. After a few steps
/// [`snooze`](Backoff::snooze) yields to the OS scheduler instead.
///
/// # Examples
///
/// ```
/// use ferroq::Backoff;
/// use std::sync::atomic::{AtomicBool, Ordering};
///
/// fn wait_until_set(flag: &AtomicBool) {
///     let backoff = Backoff::new();
///
///     while !flag.load(Ordering::Acquire) {
///         backoff.snooze();
///     }
/// }
///
/// let flag = AtomicBool::new(true);
/// wait_until_set(&flag);
/// ```
pub struct Backoff {
    step: Cell<u32>,
}

impl Backoff {
    /// Creates a new `Backoff`.
    #[inline]
    pub const fn new() -> Self {
        Self { step: Cell::new(0) }
    }

    /// Resets the backoff to its first step.
    #[inline]
    pub fn reset(&self) {
        self.step.set(0);
    }

    /// Backs off in a lock-free loop that retries after losing a race.
    ///
    /// It never yields the thread.
    #[inline]
    pub fn spin(&self) {
        for _ in 0..1 << self.step.get().min(SPIN_LIMIT) {
            spin_loop();
        }

        if self.step.get() <= SPIN_LIMIT {
            self.step.set(self.step.get() + 1);
        }
    }

    /// Backs off while waiting for another thread to finish a publication.
    ///
    /// It spins for the first steps and yields the time slice afterwards.
    #[inline]
    pub fn snooze(&self) {
        if likely(self.step.get() <= SPIN_LIMIT) {
            for _ in 0..1 << self.step.get() {
                spin_loop();
            }
        } else {
            yield_now();
        }

        if self.step.get() <= YIELD_LIMIT {
            self.step.set(self.step.get() + 1);
        }
    }

    /// Returns `true` when backing off any further is unlikely to help.
    ///
    /// Callers that own some other way of waiting should switch to it then.
    #[inline]
    pub fn is_completed(&self) -> bool {
        self.step.get() > YIELD_LIMIT
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Backoff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Backoff")
            .field("step", &self.step.get())
            .field("is_completed", &self.is_completed())
            .finish()
    }
}

/// Spins until `ready` returns `Some`, backing off in between.
///
/// Used for the bubbles of the linked, chunked and Xadd queues.
#[inline]
pub(crate) fn spin_until<R>(mut ready: impl FnMut() -> Option<R>) -> R {
    let backoff = Backoff::new();

    loop {
        if let Some(value) = ready() {
            return value;
        }

        backoff.snooze();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_completes() {
        let backoff = Backoff::new();

        for _ in 0..=YIELD_LIMIT {
            assert!(!backoff.is_completed());
            backoff.snooze();
        }

        assert!(backoff.is_completed());

        backoff.reset();

        assert!(!backoff.is_completed());
    }

    #[test]
    fn test_spin_until() {
        let mut attempts = 0;
        let value = spin_until(|| {
            attempts += 1;

            (attempts == 5).then_some(attempts * 2)
        });

        assert_eq!(value, 10);
    }
}
