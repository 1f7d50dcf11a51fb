//! Provides the [`Producer`] and the [`MultiProducer`] traits.
use crate::wait::{ExitCondition, WaitStrategy};

/// How many values a single `fill` call of the batch loops asks for.
pub const FILL_BATCH: usize = 32;

/// How many values [`Producer::fill_all`] adds to an unbounded queue at most.
pub const UNBOUNDED_FILL_LIMIT: usize = 4096;

/// A producer of a queue.
///
/// `offer` returns `Err(value)` if and only if the queue is full. `relaxed_offer` may fail
/// spuriously but never spins.
///
/// # Callbacks
///
/// The supplier of the `fill` methods is called once per claimed slot, after the slot was
/// claimed. If it panics, the claimed slot is never published: the queue stays memory-safe,
/// but a consumer may wait for that slot forever.
pub trait Producer<T> {
    /// Returns the capacity of the queue, or `None` if the queue is unbounded.
    fn capacity(&self) -> Option<usize>;

    /// Returns the number of values in the queue.
    ///
    /// Under concurrent use, it is a snapshot that may be stale the moment it returns.
    fn len(&self) -> usize;

    /// Returns whether the queue is empty.
    #[inline]
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Adds a value to the queue or returns it back if the queue is full.
    fn offer(&mut self, value: T) -> Result<(), T>;

    /// Adds a value to the queue. It may return the value back even when the queue isn't
    /// full, but it never spins.
    fn relaxed_offer(&mut self, value: T) -> Result<(), T>;

    /// Adds up to `limit` values taken from `supplier`. Returns how many were added.
    ///
    /// `supplier` is only called for a slot that is already claimed, and it stops early
    /// when the queue is full.
    fn fill<S: FnMut() -> T>(&mut self, supplier: S, limit: usize) -> usize;

    /// Fills the queue in batches of [`FILL_BATCH`] until a batch adds nothing or the
    /// capacity ([`UNBOUNDED_FILL_LIMIT`] for an unbounded queue) has been added.
    ///
    /// Returns how many values were added.
    fn fill_all<S: FnMut() -> T>(&mut self, mut supplier: S) -> usize {
        let limit = self.capacity().unwrap_or(UNBOUNDED_FILL_LIMIT);
        let mut filled = 0;

        while filled < limit {
            let added = self.fill(&mut supplier, FILL_BATCH.min(limit - filled));

            if added == 0 {
                break;
            }

            filled += added;
        }

        filled
    }

    /// Fills the queue until `exit` says to stop, calling `wait` after each round that
    /// added nothing.
    fn fill_forever<S, W, E>(&mut self, mut supplier: S, mut wait: W, mut exit: E)
    where
        S: FnMut() -> T,
        W: WaitStrategy,
        E: ExitCondition,
    {
        let mut idle_counter = 0;

        while exit.keep_running() {
            if self.fill(&mut supplier, FILL_BATCH) == 0 {
                idle_counter = wait.idle(idle_counter);
            } else {
                idle_counter = 0;
            }
        }
    }
}

/// A producer of a queue that many producers share.
///
/// Clone it to get another producer.
pub trait MultiProducer<T>: Producer<T> + Clone + Send + Sync {}
