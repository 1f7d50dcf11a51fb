//! Provides the [`Consumer`], the [`SingleConsumer`] and the [`MultiConsumer`] traits.
use crate::producer::FILL_BATCH;
use crate::wait::{ExitCondition, WaitStrategy};

/// A consumer of a queue.
///
/// `poll` returns `None` if and only if the queue is empty; it may spin for a moment while
/// a producer finishes a publication it has already started. `relaxed_poll` may return
/// `None` for a non-empty queue, but it never spins.
pub trait Consumer<T> {
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

    /// Removes the value at the head of the queue.
    fn poll(&mut self) -> Option<T>;

    /// Removes the value at the head of the queue without ever spinning.
    fn relaxed_poll(&mut self) -> Option<T>;

    /// Passes up to `limit` values to `consumer`. Returns how many were passed.
    ///
    /// It stops early when [`relaxed_poll`](Consumer::relaxed_poll) finds nothing.
    ///
    /// # Callbacks
    ///
    /// A value is removed from the queue before it is passed, so a panicking `consumer`
    /// loses only the value it was handed.
    fn drain<C: FnMut(T)>(&mut self, mut consumer: C, limit: usize) -> usize {
        for i in 0..limit {
            match self.relaxed_poll() {
                Some(value) => consumer(value),
                None => return i,
            }
        }

        limit
    }

    /// Drains the queue until it looks empty. A bounded queue passes at most its capacity.
    fn drain_all<C: FnMut(T)>(&mut self, consumer: C) -> usize {
        let limit = self.capacity().unwrap_or(usize::MAX);

        self.drain(consumer, limit)
    }

    /// Drains the queue until `exit` says to stop, calling `wait` after each round that
    /// found nothing.
    fn drain_forever<C, W, E>(&mut self, mut consumer: C, mut wait: W, mut exit: E)
    where
        C: FnMut(T),
        W: WaitStrategy,
        E: ExitCondition,
    {
        let mut idle_counter = 0;

        while exit.keep_running() {
            if self.drain(&mut consumer, FILL_BATCH) == 0 {
                idle_counter = wait.idle(idle_counter);
            } else {
                idle_counter = 0;
            }
        }
    }

    /// Removes every value.
    ///
    /// Values offered concurrently may survive.
    fn clear(&mut self) {
        while self.poll().is_some() {}
    }
}

/// The only consumer of a queue.
///
/// Being the only one that removes values, it can look at the head value in place.
pub trait SingleConsumer<T>: Consumer<T> {
    /// Calls `f` with the head value without removing it.
    ///
    /// Returns `None` if and only if the queue is empty.
    fn peek_with<R, F: FnOnce(&T) -> R>(&self, f: F) -> Option<R>;

    /// Calls `f` with the head value without removing it.
    ///
    /// It may return `None` for a non-empty queue, but it never spins.
    fn relaxed_peek_with<R, F: FnOnce(&T) -> R>(&self, f: F) -> Option<R>;

    /// Returns a clone of the head value.
    #[inline]
    fn peek(&self) -> Option<T>
    where
        T: Clone,
    {
        self.peek_with(T::clone)
    }

    /// Returns a clone of the head value without ever spinning.
    #[inline]
    fn relaxed_peek(&self) -> Option<T>
    where
        T: Clone,
    {
        self.relaxed_peek_with(T::clone)
    }
}

/// A consumer of a queue that many consumers share.
///
/// Clone it to get another consumer.
///
/// # Peeking
///
/// Another consumer may remove the head value at any moment, so a peek copies the value
/// out and returns the copy only if no consumer moved past it meanwhile. Under heavy reuse
/// of pooled chunks, the copy is a value that was at the head at some instant of the call.
pub trait MultiConsumer<T>: Consumer<T> + Clone + Send + Sync {
    /// Returns a copy of the head value.
    fn peek(&self) -> Option<T>
    where
        T: Copy;

    /// Returns a copy of the head value. It may return `None` for a non-empty queue.
    fn relaxed_peek(&self) -> Option<T>
    where
        T: Copy;
}
