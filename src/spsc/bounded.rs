//! This module provides the single-producer, single-consumer bounded ring.
use crate::access::{self, offset, IndexAccess, Slot};
use crate::cache_padded::CachePadded;
use crate::config::round_capacity;
use crate::errors::QueueConfigError;
use crate::handles::{single_consumer_handle, single_producer_handle};
use crate::hints::unlikely;
use crate::light_arc::LightArc;
use crate::loom_bindings::sync::atomic::AtomicU64;
use std::cell::Cell;

/// The longest run of slots the producer claims with one look-ahead.
const MAX_LOOK_AHEAD_STEP: usize = 4096;

struct ProducerFields {
    index: AtomicU64,
    /// Every slot below it is known to be empty.
    limit: Cell<u64>,
}

/// The single-producer, single-consumer ring-based _bounded_ queue.
///
/// It follows the FastFlow model: the consumer decides emptiness by looking at the slot,
/// never at the producer index. The producer looks `look_ahead_step` slots ahead, and if
/// that slot is empty, it writes the whole run up to it without looking at the consumer
/// side again.
///
/// It is safe to use when and only when only one thread is writing to the queue at the
/// same time, and only one thread is reading from the queue at the same time. Producer
/// methods and consumer methods are `unsafe` for that reason; [`new_bounded`] returns a
/// pair of handles that make them safe.
#[repr(C)]
pub struct SPSCBoundedQueue<T> {
    buffer: Box<[Slot<T>]>,
    mask: usize,
    look_ahead_step: u64,
    producer: CachePadded<ProducerFields>,
    consumer_index: CachePadded<AtomicU64>,
}

impl<T> SPSCBoundedQueue<T> {
    /// Creates a queue for at least `capacity` values.
    ///
    /// The capacity is raised to at least 4 and rounded up to a power of two.
    pub fn new(capacity: usize) -> Result<Self, QueueConfigError> {
        let capacity = round_capacity(capacity, 1)?.max(4);

        Ok(Self {
            buffer: Slot::new_buffer(capacity),
            mask: capacity - 1,
            look_ahead_step: (capacity / 4).min(MAX_LOOK_AHEAD_STEP) as u64,
            producer: CachePadded::new(ProducerFields {
                index: AtomicU64::new(0),
                limit: Cell::new(0),
            }),
            consumer_index: CachePadded::new(AtomicU64::new(0)),
        })
    }

    #[inline(always)]
    fn slot(&self, index: u64) -> &Slot<T> {
        unsafe { self.buffer.get_unchecked(offset(index, self.mask)) }
    }

    /// Returns the capacity of the queue.
    #[inline]
    pub fn capacity(&self) -> Option<usize> {
        Some(self.mask + 1)
    }

    /// Returns the number of values in the queue.
    #[inline]
    pub fn len(&self) -> usize {
        access::size(&self.consumer_index, &self.producer.index, 0, self.capacity())
    }

    /// Returns whether the queue is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        access::is_empty(&self.consumer_index, &self.producer.index)
    }

    /// Returns how many values have been offered so far.
    pub fn current_producer_index(&self) -> u64 {
        self.producer.index.load_volatile()
    }

    /// Returns how many values have been polled so far.
    pub fn current_consumer_index(&self) -> u64 {
        self.consumer_index.load_volatile()
    }
}

// Producer
impl<T> SPSCBoundedQueue<T> {
    /// Claims the slots up to the look-ahead slot if it is empty, otherwise checks the
    /// slot at `producer_index` alone.
    fn offer_slow_path(&self, producer_index: u64) -> bool {
        if self.slot(producer_index + self.look_ahead_step).is_empty() {
            self.producer
                .limit
                .set(producer_index + self.look_ahead_step);

            true
        } else {
            self.slot(producer_index).is_empty()
        }
    }

    /// Pushes a value or returns it back if the queue is full.
    ///
    /// # Safety
    ///
    /// The caller must be the only producer.
    #[inline]
    pub unsafe fn offer(&self, value: T) -> Result<(), T> {
        let producer_index = self.producer.index.load_plain();

        if unlikely(producer_index >= self.producer.limit.get())
            && !self.offer_slow_path(producer_index)
        {
            return Err(value);
        }

        // The consumer sees the value through the slot state, before the index moves.
        unsafe { self.slot(producer_index).write(value) };
        self.producer.index.store_ordered(producer_index + 1);

        Ok(())
    }

    /// Same as [`offer`](Self::offer); it never spins anyway.
    ///
    /// # Safety
    ///
    /// The caller must be the only producer.
    #[inline]
    pub unsafe fn relaxed_offer(&self, value: T) -> Result<(), T> {
        unsafe { self.offer(value) }
    }

    /// Pushes up to `limit` values from `supplier`.
    ///
    /// # Safety
    ///
    /// The caller must be the only producer.
    pub unsafe fn fill<S: FnMut() -> T>(&self, mut supplier: S, limit: usize) -> usize {
        let step = self.look_ahead_step as usize;
        let producer_index = self.producer.index.load_plain();
        let mut i = 0;

        while i < limit {
            let index = producer_index + i as u64;

            if self.slot(index + step as u64).is_empty() {
                let run = step.min(limit - i);

                for j in 0..run as u64 {
                    unsafe { self.slot(index + j).write(supplier()) };
                    self.producer.index.store_ordered(index + j + 1);
                }

                i += run;
            } else {
                let slot = self.slot(index);

                if !slot.is_empty() {
                    return i;
                }

                unsafe { slot.write(supplier()) };
                self.producer.index.store_ordered(index + 1);

                i += 1;
            }
        }

        limit
    }
}

// Consumer
impl<T> SPSCBoundedQueue<T> {
    /// Pops the head value.
    ///
    /// # Safety
    ///
    /// The caller must be the only consumer.
    #[inline]
    pub unsafe fn poll(&self) -> Option<T> {
        let consumer_index = self.consumer_index.load_plain();
        let slot = self.slot(consumer_index);

        // The value is published before the producer index, so an empty slot means the
        // queue was empty.
        if !slot.is_filled() {
            return None;
        }

        let value = unsafe { slot.take() };

        // The index may get ahead of a stale read of the producer index for a moment.
        self.consumer_index.store_ordered(consumer_index + 1);

        Some(value)
    }

    /// Same as [`poll`](Self::poll); it never spins anyway.
    ///
    /// # Safety
    ///
    /// The caller must be the only consumer.
    #[inline]
    pub unsafe fn relaxed_poll(&self) -> Option<T> {
        unsafe { self.poll() }
    }

    /// Pops up to `limit` values into `consumer`.
    ///
    /// # Safety
    ///
    /// The caller must be the only consumer.
    pub unsafe fn drain<C: FnMut(T)>(&self, mut consumer: C, limit: usize) -> usize {
        let consumer_index = self.consumer_index.load_plain();

        for i in 0..limit {
            let index = consumer_index + i as u64;
            let slot = self.slot(index);

            if !slot.is_filled() {
                return i;
            }

            let value = unsafe { slot.take() };

            self.consumer_index.store_ordered(index + 1);

            consumer(value);
        }

        limit
    }

    /// Calls `f` with the head value.
    ///
    /// # Safety
    ///
    /// The caller must be the only consumer.
    #[inline]
    pub unsafe fn peek_with<R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        let slot = self.slot(self.consumer_index.load_plain());

        slot.is_filled().then(|| f(unsafe { slot.value_ref() }))
    }

    /// Same as [`peek_with`](Self::peek_with).
    ///
    /// # Safety
    ///
    /// The caller must be the only consumer.
    #[inline]
    pub unsafe fn relaxed_peek_with<R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        unsafe { self.peek_with(f) }
    }
}

unsafe impl<T: Send> Send for SPSCBoundedQueue<T> {}
unsafe impl<T: Send> Sync for SPSCBoundedQueue<T> {}

single_producer_handle!(SPSCBoundedQueue, SPSCBoundedProducer);
single_consumer_handle!(SPSCBoundedQueue, SPSCBoundedConsumer);

/// Creates a single-producer, single-consumer bounded queue for at least `capacity`
/// values. Returns the [`producer`](SPSCBoundedProducer) and the
/// [`consumer`](SPSCBoundedConsumer).
///
/// The capacity is raised to at least 4 and rounded up to a power of two.
///
/// # Examples
///
/// ```
/// use ferroq::{spsc, Consumer, Producer};
///
/// let (mut producer, mut consumer) = spsc::new_bounded(16).unwrap();
///
/// for i in 0..16 {
///     producer.offer(i).unwrap();
/// }
///
/// assert_eq!(producer.offer(16), Err(16));
/// assert_eq!(consumer.poll(), Some(0));
/// ```
pub fn new_bounded<T>(
    capacity: usize,
) -> Result<(SPSCBoundedProducer<T>, SPSCBoundedConsumer<T>), QueueConfigError> {
    let queue = LightArc::new(SPSCBoundedQueue::new(capacity)?);

    Ok((
        SPSCBoundedProducer::new(queue.clone()),
        SPSCBoundedConsumer::new(queue),
    ))
}
