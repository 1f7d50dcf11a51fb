//! Wait strategies and exit conditions of the forever-draining and filling loops.
//!
//! The queues never park a thread. [`Consumer::drain_forever`](crate::Consumer::drain_forever)
//! and [`Producer::fill_forever`](crate::Producer::fill_forever) call a [`WaitStrategy`]
//! whenever a round moved nothing and stop once the [`ExitCondition`] says so.
use crate::backoff::Backoff;
use crate::loom_bindings::hint::spin_loop;
use crate::loom_bindings::thread::yield_now;
use std::sync::atomic::{AtomicBool, Ordering};

/// Decides what to do when a round of a forever-loop moved nothing.
pub trait WaitStrategy {
    /// Waits a little.
    ///
    /// `idle_counter` is `0` after a productive round and is whatever the previous
    /// call returned otherwise. The returned value is passed to the next call.
    fn idle(&mut self, idle_counter: u32) -> u32;
}

impl<F: FnMut(u32) -> u32> WaitStrategy for F {
    #[inline]
    fn idle(&mut self, idle_counter: u32) -> u32 {
        self(idle_counter)
    }
}

/// Keeps a forever-loop running.
pub trait ExitCondition {
    /// Returns `false` once the loop should return.
    fn keep_running(&mut self) -> bool;
}

impl<F: FnMut() -> bool> ExitCondition for F {
    #[inline]
    fn keep_running(&mut self) -> bool {
        self()
    }
}

/// Runs while the flag is `true`.
impl ExitCondition for &AtomicBool {
    #[inline]
    fn keep_running(&mut self) -> bool {
        self.load(Ordering::Acquire)
    }
}

/// Spins on every idle round.
#[derive(Debug, Default, Clone, Copy)]
pub struct BusySpinWait;

impl WaitStrategy for BusySpinWait {
    #[inline]
    fn idle(&mut self, idle_counter: u32) -> u32 {
        spin_loop();

        idle_counter.saturating_add(1)
    }
}

/// Yields the time slice on every idle round.
#[derive(Debug, Default, Clone, Copy)]
pub struct YieldWait;

impl WaitStrategy for YieldWait {
    #[inline]
    fn idle(&mut self, idle_counter: u32) -> u32 {
        yield_now();

        idle_counter.saturating_add(1)
    }
}

/// Spins with exponential backoff, then yields.
///
/// The backoff starts over after every productive round.
#[derive(Debug, Default)]
pub struct BackoffWait {
    backoff: Backoff,
}

impl BackoffWait {
    /// Creates a new `BackoffWait`.
    pub const fn new() -> Self {
        Self {
            backoff: Backoff::new(),
        }
    }
}

impl WaitStrategy for BackoffWait {
    #[inline]
    fn idle(&mut self, idle_counter: u32) -> u32 {
        if idle_counter == 0 {
            self.backoff.reset();
        }

        self.backoff.snooze();

        idle_counter.saturating_add(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closures_are_strategies() {
        let mut calls = 0;
        let mut wait = |counter: u32| {
            calls += 1;

            counter + 2
        };

        assert_eq!(wait.idle(0), 2);
        assert_eq!(wait.idle(2), 4);
        assert_eq!(calls, 2);

        let mut rounds = 3;
        let mut exit = || {
            rounds -= 1;

            rounds > 0
        };

        assert!(exit.keep_running());
        assert!(exit.keep_running());
        assert!(!exit.keep_running());
    }

    #[test]
    fn test_atomic_bool_exit_condition() {
        let flag = AtomicBool::new(true);
        let mut exit = &flag;

        assert!(exit.keep_running());

        flag.store(false, Ordering::Release);

        assert!(!exit.keep_running());
    }

    #[test]
    fn test_provided_strategies_count() {
        assert_eq!(BusySpinWait.idle(0), 1);
        assert_eq!(YieldWait.idle(u32::MAX), u32::MAX);

        let mut wait = BackoffWait::new();
        let mut counter = 0;

        for _ in 0..20 {
            counter = wait.idle(counter);
        }

        assert_eq!(counter, 20);
    }
}
