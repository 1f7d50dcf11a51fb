//! This module provides the multi-producer, multi-consumer bounded ring.
#![allow(
    clippy::cast_possible_truncation,
    reason = "Batch sizes are bounded by a `usize` limit."
)]
use crate::access::{self, offset, IndexAccess, Slot};
use crate::cache_padded::CachePadded;
use crate::config::round_capacity;
use crate::errors::QueueConfigError;
use crate::handles::{multi_consumer_handle, multi_producer_handle};
use crate::light_arc::LightArc;
use crate::loom_bindings::hint::spin_loop;
use crate::loom_bindings::sync::atomic::AtomicU64;

/// The longest run of indices a batch claims with one compare-and-swap.
const MAX_LOOK_AHEAD_STEP: usize = 4096;

/// The multi-producer, multi-consumer ring-based _bounded_ queue.
///
/// Both indices are claimed with a compare-and-swap. Each slot carries a sequence that
/// tells which lap it belongs to:
///
/// * a slot is writable for index `p` when its sequence is `p`, and the writer sets it to
///   `p + 1`;
/// * it is readable for index `c` when its sequence is `c + 1`, and the reader sets it
///   to `c + capacity`.
///
/// So neither side reads the other side's index on the fast path.
#[repr(C)]
pub struct MPMCBoundedQueue<T> {
    buffer: Box<[Slot<T>]>,
    sequences: Box<[AtomicU64]>,
    mask: usize,
    look_ahead_step: usize,
    producer_index: CachePadded<AtomicU64>,
    consumer_index: CachePadded<AtomicU64>,
}

impl<T> MPMCBoundedQueue<T> {
    /// Creates a queue for at least `capacity` values.
    ///
    /// The capacity must be at least 2 and is rounded up to a power of two.
    pub fn new(capacity: usize) -> Result<Self, QueueConfigError> {
        let capacity = round_capacity(capacity, 2)?;

        Ok(Self {
            buffer: Slot::new_buffer(capacity),
            sequences: (0..capacity as u64).map(AtomicU64::new).collect(),
            mask: capacity - 1,
            look_ahead_step: (capacity / 4).clamp(2, MAX_LOOK_AHEAD_STEP),
            producer_index: CachePadded::new(AtomicU64::new(0)),
            consumer_index: CachePadded::new(AtomicU64::new(0)),
        })
    }

    #[inline(always)]
    fn slot(&self, index: u64) -> &Slot<T> {
        unsafe { self.buffer.get_unchecked(offset(index, self.mask)) }
    }

    #[inline(always)]
    fn sequence(&self, index: u64) -> &AtomicU64 {
        unsafe { self.sequences.get_unchecked(offset(index, self.mask)) }
    }

    /// Returns the capacity of the queue.
    #[inline]
    pub fn capacity(&self) -> Option<usize> {
        Some(self.mask + 1)
    }

    /// Returns the number of values in the queue.
    #[inline]
    pub fn len(&self) -> usize {
        access::size(&self.consumer_index, &self.producer_index, 0, self.capacity())
    }

    /// Returns whether the queue is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        access::is_empty(&self.consumer_index, &self.producer_index)
    }

    /// Returns how many indices producers have claimed so far.
    pub fn current_producer_index(&self) -> u64 {
        self.producer_index.load_volatile()
    }

    /// Returns how many indices consumers have claimed so far.
    pub fn current_consumer_index(&self) -> u64 {
        self.consumer_index.load_volatile()
    }

    /// Writes the value of a claimed producer index.
    #[inline(always)]
    fn publish(&self, producer_index: u64, value: T) {
        unsafe { self.slot(producer_index).write(value) };
        self.sequence(producer_index).store_ordered(producer_index + 1);
    }

    /// Takes the value of a claimed consumer index and hands the slot to the next lap.
    #[inline(always)]
    fn consume(&self, consumer_index: u64) -> T {
        let slot = self.slot(consumer_index);
        let value = unsafe { slot.read() };

        slot.forget();
        self.sequence(consumer_index)
            .store_ordered(consumer_index + self.mask as u64 + 1);

        value
    }
}

// Producers
impl<T> MPMCBoundedQueue<T> {
    /// Pushes a value or returns it back if the queue is full.
    pub fn offer(&self, value: T) -> Result<(), T> {
        let capacity = self.mask as u64 + 1;
        // Zero makes the first fullness check read the consumer index.
        let mut consumer_index = 0;

        let producer_index = loop {
            let producer_index = self.producer_index.load_volatile();
            let sequence = self.sequence(producer_index).load_volatile();

            if sequence < producer_index {
                // The slot still holds the value of the previous lap.
                let wrapped = producer_index.wrapping_sub(capacity);

                if wrapped >= consumer_index {
                    consumer_index = self.consumer_index.load_volatile();

                    if wrapped >= consumer_index {
                        return Err(value);
                    }
                }

                continue;
            }

            if sequence == producer_index
                && self.producer_index.cas(producer_index, producer_index + 1)
            {
                break producer_index;
            }
        };

        self.publish(producer_index, value);

        Ok(())
    }

    /// Pushes a value unless the next slot still holds the value of the previous lap.
    pub fn relaxed_offer(&self, value: T) -> Result<(), T> {
        let producer_index = loop {
            let producer_index = self.producer_index.load_volatile();
            let sequence = self.sequence(producer_index).load_volatile();

            if sequence < producer_index {
                return Err(value);
            }

            if sequence == producer_index
                && self.producer_index.cas(producer_index, producer_index + 1)
            {
                break producer_index;
            }
        };

        self.publish(producer_index, value);

        Ok(())
    }

    /// Pushes up to `limit` values from `supplier`.
    ///
    /// It claims whole runs of indices with one compare-and-swap when the sequence of the
    /// last slot of the run shows the run is free, and falls back to claiming one index
    /// at a time otherwise.
    pub fn fill<S: FnMut() -> T>(&self, mut supplier: S, limit: usize) -> usize {
        let max_step = self.look_ahead_step.min(limit);
        let mut produced = 0;

        while produced < limit {
            let remaining = limit - produced;
            let step = remaining.min(max_step) as u64;
            let producer_index = self.producer_index.load_volatile();
            let look_ahead_index = producer_index + step - 1;
            let look_ahead_sequence = self.sequence(look_ahead_index).load_volatile();

            if look_ahead_sequence == look_ahead_index
                && self
                    .producer_index
                    .cas(producer_index, look_ahead_index + 1)
            {
                for index in producer_index..=look_ahead_index {
                    // A slower consumer of the previous lap may still be clearing it.
                    while self.sequence(index).load_volatile() != index {
                        spin_loop();
                    }

                    self.publish(index, supplier());
                }

                produced += step as usize;
            } else {
                if look_ahead_sequence < look_ahead_index
                    && self.sequence(producer_index).load_volatile() < producer_index
                {
                    return produced;
                }

                return produced + self.fill_one_by_one(&mut supplier, remaining);
            }
        }

        limit
    }

    fn fill_one_by_one<S: FnMut() -> T>(&self, supplier: &mut S, limit: usize) -> usize {
        for i in 0..limit {
            let producer_index = loop {
                let producer_index = self.producer_index.load_volatile();
                let sequence = self.sequence(producer_index).load_volatile();

                if sequence < producer_index {
                    return i;
                }

                if sequence == producer_index
                    && self.producer_index.cas(producer_index, producer_index + 1)
                {
                    break producer_index;
                }
            };

            self.publish(producer_index, supplier());
        }

        limit
    }
}

// Consumers
impl<T> MPMCBoundedQueue<T> {
    /// Pops the head value.
    ///
    /// It spins while a producer has claimed the head index but not written it yet.
    pub fn poll(&self) -> Option<T> {
        // Zero makes the first emptiness check read the producer index.
        let mut producer_index = 0;

        let consumer_index = loop {
            let consumer_index = self.consumer_index.load_volatile();
            let sequence = self.sequence(consumer_index).load_volatile();
            let expected = consumer_index + 1;

            if sequence < expected {
                if consumer_index >= producer_index {
                    producer_index = self.producer_index.load_volatile();

                    if consumer_index == producer_index {
                        return None;
                    }
                }

                spin_loop();

                continue;
            }

            if sequence == expected && self.consumer_index.cas(consumer_index, expected) {
                break consumer_index;
            }
        };

        Some(self.consume(consumer_index))
    }

    /// Pops the head value if it is already written.
    pub fn relaxed_poll(&self) -> Option<T> {
        let consumer_index = loop {
            let consumer_index = self.consumer_index.load_volatile();
            let sequence = self.sequence(consumer_index).load_volatile();
            let expected = consumer_index + 1;

            if sequence < expected {
                return None;
            }

            if sequence == expected && self.consumer_index.cas(consumer_index, expected) {
                break consumer_index;
            }
        };

        Some(self.consume(consumer_index))
    }

    /// Pops up to `limit` values into `consumer`, claiming whole runs at once like
    /// [`fill`](Self::fill).
    pub fn drain<C: FnMut(T)>(&self, mut consumer: C, limit: usize) -> usize {
        let max_step = self.look_ahead_step.min(limit);
        let mut consumed = 0;

        while consumed < limit {
            let remaining = limit - consumed;
            let step = remaining.min(max_step) as u64;
            let consumer_index = self.consumer_index.load_volatile();
            let look_ahead_index = consumer_index + step - 1;
            let look_ahead_sequence = self.sequence(look_ahead_index).load_volatile();

            if look_ahead_sequence == look_ahead_index + 1
                && self
                    .consumer_index
                    .cas(consumer_index, look_ahead_index + 1)
            {
                for index in consumer_index..=look_ahead_index {
                    // A slower producer may still be writing it.
                    while self.sequence(index).load_volatile() != index + 1 {
                        spin_loop();
                    }

                    consumer(self.consume(index));
                }

                consumed += step as usize;
            } else {
                if look_ahead_sequence < look_ahead_index + 1
                    && self.sequence(consumer_index).load_volatile() < consumer_index + 1
                {
                    return consumed;
                }

                return consumed + self.drain_one_by_one(&mut consumer, remaining);
            }
        }

        limit
    }

    fn drain_one_by_one<C: FnMut(T)>(&self, consumer: &mut C, limit: usize) -> usize {
        for i in 0..limit {
            match self.relaxed_poll() {
                Some(value) => consumer(value),
                None => return i,
            }
        }

        limit
    }

    /// Returns a copy of the head value.
    pub fn peek(&self) -> Option<T>
    where
        T: Copy,
    {
        let mut producer_index = 0;

        loop {
            let consumer_index = self.consumer_index.load_volatile();
            let sequence = self.sequence(consumer_index).load_volatile();
            let expected = consumer_index + 1;

            if sequence < expected {
                if consumer_index >= producer_index {
                    producer_index = self.producer_index.load_volatile();

                    if consumer_index == producer_index {
                        return None;
                    }
                }
            } else if sequence == expected {
                if let Some(value) = self
                    .slot(consumer_index)
                    .copy_validated(&self.consumer_index, consumer_index)
                {
                    return Some(value);
                }
            }
        }
    }

    /// Returns a copy of the head value if it is already written.
    pub fn relaxed_peek(&self) -> Option<T>
    where
        T: Copy,
    {
        loop {
            let consumer_index = self.consumer_index.load_volatile();
            let sequence = self.sequence(consumer_index).load_volatile();
            let expected = consumer_index + 1;

            if sequence < expected {
                return None;
            }

            if sequence == expected {
                if let Some(value) = self
                    .slot(consumer_index)
                    .copy_validated(&self.consumer_index, consumer_index)
                {
                    return Some(value);
                }
            }
        }
    }
}

unsafe impl<T: Send> Send for MPMCBoundedQueue<T> {}
unsafe impl<T: Send> Sync for MPMCBoundedQueue<T> {}

multi_producer_handle!(MPMCBoundedQueue, MPMCBoundedProducer);
multi_consumer_handle!(MPMCBoundedQueue, MPMCBoundedConsumer);

/// Creates a multi-producer, multi-consumer bounded queue for at least `capacity` values.
///
/// The capacity must be at least 2 and is rounded up to a power of two.
///
/// # Examples
///
/// ```
/// use ferroq::{mpmc, Consumer, MultiConsumer, Producer};
///
/// let (mut producer, mut consumer) = mpmc::new_bounded(2).unwrap();
///
/// assert_eq!(producer.fill(|| 7, 3), 2);
/// assert_eq!(consumer.peek(), Some(7));
/// assert_eq!(consumer.drain(|value| assert_eq!(value, 7), 8), 2);
/// assert!(mpmc::new_bounded::<u8>(1).is_err());
/// ```
pub fn new_bounded<T>(
    capacity: usize,
) -> Result<(MPMCBoundedProducer<T>, MPMCBoundedConsumer<T>), QueueConfigError> {
    let queue = LightArc::new(MPMCBoundedQueue::new(capacity)?);

    Ok((
        MPMCBoundedProducer::new(queue.clone()),
        MPMCBoundedConsumer::new(queue),
    ))
}
