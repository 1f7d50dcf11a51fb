//! This module provides the multi-producer, single-consumer bounded ring.
use crate::access::{self, offset, IndexAccess, Slot};
use crate::backoff::spin_until;
use crate::cache_padded::CachePadded;
use crate::config::round_capacity;
use crate::errors::{QueueConfigError, TryOfferError};
use crate::handles::{multi_producer_handle, single_consumer_handle};
use crate::light_arc::LightArc;
use crate::loom_bindings::sync::atomic::AtomicU64;

/// The multi-producer, single-consumer ring-based _bounded_ queue.
///
/// Producers claim indices with a compare-and-swap on the producer index. They check for
/// room against a shared `producer_limit` cache and read the consumer index only once
/// the cache runs out.
///
/// A producer publishes its value after it claimed the index, so the consumer can find a
/// claimed but still empty slot. [`poll`](Self::poll) spins through that bubble;
/// [`relaxed_poll`](Self::relaxed_poll) reports the queue as empty instead.
///
/// Consumer methods are `unsafe` because there must be only one consumer.
/// [`new_bounded`] returns handles that make them safe.
#[repr(C)]
pub struct MPSCBoundedQueue<T> {
    buffer: Box<[Slot<T>]>,
    mask: usize,
    producer_index: CachePadded<AtomicU64>,
    producer_limit: CachePadded<AtomicU64>,
    consumer_index: CachePadded<AtomicU64>,
}

impl<T> MPSCBoundedQueue<T> {
    /// Creates a queue for at least `capacity` values, rounded up to a power of two.
    pub fn new(capacity: usize) -> Result<Self, QueueConfigError> {
        let capacity = round_capacity(capacity, 1)?;

        Ok(Self {
            buffer: Slot::new_buffer(capacity),
            mask: capacity - 1,
            producer_index: CachePadded::new(AtomicU64::new(0)),
            producer_limit: CachePadded::new(AtomicU64::new(capacity as u64)),
            consumer_index: CachePadded::new(AtomicU64::new(0)),
        })
    }

    #[inline(always)]
    fn slot(&self, index: u64) -> &Slot<T> {
        unsafe { self.buffer.get_unchecked(offset(index, self.mask)) }
    }

    #[inline(always)]
    fn capacity_u64(&self) -> u64 {
        self.mask as u64 + 1
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

    /// Returns how many values have been polled so far.
    pub fn current_consumer_index(&self) -> u64 {
        self.consumer_index.load_volatile()
    }
}

// Producers
impl<T> MPSCBoundedQueue<T> {
    /// Pushes a value or returns it back if the queue is full.
    pub fn offer(&self, value: T) -> Result<(), T> {
        let mut producer_limit = self.producer_limit.load_volatile();
        let mut producer_index;

        loop {
            producer_index = self.producer_index.load_volatile();

            if producer_index >= producer_limit {
                producer_limit = self.consumer_index.load_volatile() + self.capacity_u64();

                if producer_index >= producer_limit {
                    return Err(value);
                }

                self.producer_limit.store_ordered(producer_limit);
            }

            if self.producer_index.cas(producer_index, producer_index + 1) {
                break;
            }
        }

        unsafe { self.slot(producer_index).write(value) };

        Ok(())
    }

    /// Same as [`offer`](Self::offer).
    #[inline]
    pub fn relaxed_offer(&self, value: T) -> Result<(), T> {
        self.offer(value)
    }

    /// Pushes a value only if fewer than `threshold` values are in the queue.
    ///
    /// Returns the value back otherwise.
    pub fn offer_if_below_threshold(&self, value: T, threshold: usize) -> Result<(), T> {
        let capacity = self.capacity_u64();
        let threshold = (threshold as u64).min(capacity);
        let mut producer_limit = self.producer_limit.load_volatile();
        let mut producer_index;

        loop {
            producer_index = self.producer_index.load_volatile();

            let available = producer_limit.saturating_sub(producer_index);

            if capacity.saturating_sub(available) >= threshold {
                let consumer_index = self.consumer_index.load_volatile();

                if producer_index.saturating_sub(consumer_index) >= threshold {
                    return Err(value);
                }

                producer_limit = consumer_index + capacity;
                self.producer_limit.store_ordered(producer_limit);
            }

            if self.producer_index.cas(producer_index, producer_index + 1) {
                break;
            }
        }

        unsafe { self.slot(producer_index).write(value) };

        Ok(())
    }

    /// Tries to push a value with a single compare-and-swap.
    ///
    /// Returns [`TryOfferError::Full`] if the queue is full and [`TryOfferError::Contended`]
    /// if another producer claimed the index first.
    pub fn fail_fast_offer(&self, value: T) -> Result<(), TryOfferError<T>> {
        let producer_index = self.producer_index.load_volatile();
        let producer_limit = self.producer_limit.load_volatile();

        if producer_index >= producer_limit {
            let producer_limit = self.consumer_index.load_volatile() + self.capacity_u64();

            if producer_index >= producer_limit {
                return Err(TryOfferError::Full(value));
            }

            self.producer_limit.store_ordered(producer_limit);
        }

        if !self.producer_index.cas(producer_index, producer_index + 1) {
            return Err(TryOfferError::Contended(value));
        }

        unsafe { self.slot(producer_index).write(value) };

        Ok(())
    }

    /// Claims up to `limit` indices at once and fills them from `supplier`.
    #[allow(clippy::cast_possible_truncation, reason = "It claims at most `limit`.")]
    pub fn fill<S: FnMut() -> T>(&self, mut supplier: S, limit: usize) -> usize {
        if limit == 0 {
            return 0;
        }

        let capacity = self.capacity_u64();
        let mut producer_limit = self.producer_limit.load_volatile();
        let mut producer_index;
        let mut claimed;

        loop {
            producer_index = self.producer_index.load_volatile();

            let mut available = producer_limit.saturating_sub(producer_index);

            if available == 0 {
                producer_limit = self.consumer_index.load_volatile() + capacity;
                available = producer_limit.saturating_sub(producer_index);

                if available == 0 {
                    return 0;
                }

                self.producer_limit.store_ordered(producer_limit);
            }

            claimed = available.min(limit as u64);

            if self.producer_index.cas(producer_index, producer_index + claimed) {
                break;
            }
        }

        for i in 0..claimed {
            unsafe { self.slot(producer_index + i).write(supplier()) };
        }

        claimed as usize
    }
}

// Consumer
impl<T> MPSCBoundedQueue<T> {
    /// Waits for the head slot if a producer has claimed it, returns `None` if the queue is
    /// empty.
    #[inline]
    fn wait_for_head(&self, consumer_index: u64) -> Option<&Slot<T>> {
        let slot = self.slot(consumer_index);

        if !slot.is_filled() {
            if consumer_index == self.producer_index.load_volatile() {
                return None;
            }

            spin_until(|| slot.is_filled().then_some(()));
        }

        Some(slot)
    }

    /// Pops the head value, spinning if a producer has claimed it but not written it yet.
    ///
    /// # Safety
    ///
    /// The caller must be the only consumer.
    #[inline]
    pub unsafe fn poll(&self) -> Option<T> {
        let consumer_index = self.consumer_index.load_plain();
        let slot = self.wait_for_head(consumer_index)?;
        let value = unsafe { slot.take() };

        self.consumer_index.store_ordered(consumer_index + 1);

        Some(value)
    }

    /// Pops the head value if it is already written.
    ///
    /// # Safety
    ///
    /// The caller must be the only consumer.
    #[inline]
    pub unsafe fn relaxed_poll(&self) -> Option<T> {
        let consumer_index = self.consumer_index.load_plain();
        let slot = self.slot(consumer_index);

        if !slot.is_filled() {
            return None;
        }

        let value = unsafe { slot.take() };

        self.consumer_index.store_ordered(consumer_index + 1);

        Some(value)
    }

    /// Pops up to `limit` written values into `consumer`.
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

    /// Calls `f` with the head value, spinning through a bubble like [`poll`](Self::poll).
    ///
    /// # Safety
    ///
    /// The caller must be the only consumer.
    #[inline]
    pub unsafe fn peek_with<R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        let slot = self.wait_for_head(self.consumer_index.load_plain())?;

        Some(f(unsafe { slot.value_ref() }))
    }

    /// Calls `f` with the head value if it is already written.
    ///
    /// # Safety
    ///
    /// The caller must be the only consumer.
    #[inline]
    pub unsafe fn relaxed_peek_with<R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        let slot = self.slot(self.consumer_index.load_plain());

        slot.is_filled().then(|| f(unsafe { slot.value_ref() }))
    }
}

unsafe impl<T: Send> Send for MPSCBoundedQueue<T> {}
unsafe impl<T: Send> Sync for MPSCBoundedQueue<T> {}

multi_producer_handle!(MPSCBoundedQueue, MPSCBoundedProducer);
single_consumer_handle!(MPSCBoundedQueue, MPSCBoundedConsumer);

impl<T> MPSCBoundedProducer<T> {
    /// See [`MPSCBoundedQueue::offer_if_below_threshold`].
    #[inline]
    pub fn offer_if_below_threshold(&mut self, value: T, threshold: usize) -> Result<(), T> {
        self.inner.offer_if_below_threshold(value, threshold)
    }

    /// See [`MPSCBoundedQueue::fail_fast_offer`].
    #[inline]
    pub fn fail_fast_offer(&mut self, value: T) -> Result<(), TryOfferError<T>> {
        self.inner.fail_fast_offer(value)
    }
}

/// Creates a multi-producer, single-consumer bounded queue for at least `capacity`
/// values, rounded up to a power of two.
///
/// Clone the [`producer`](MPSCBoundedProducer) to add producers.
///
/// # Examples
///
/// ```
/// use ferroq::{mpsc, Consumer, Producer};
///
/// let (mut producer, mut consumer) = mpsc::new_bounded(4).unwrap();
/// let mut second = producer.clone();
///
/// producer.offer(1).unwrap();
/// second.offer(2).unwrap();
///
/// assert_eq!(consumer.poll(), Some(1));
/// assert_eq!(consumer.poll(), Some(2));
/// assert_eq!(consumer.poll(), None);
/// ```
pub fn new_bounded<T>(
    capacity: usize,
) -> Result<(MPSCBoundedProducer<T>, MPSCBoundedConsumer<T>), QueueConfigError> {
    let queue = LightArc::new(MPSCBoundedQueue::new(capacity)?);

    Ok((
        MPSCBoundedProducer::new(queue.clone()),
        MPSCBoundedConsumer::new(queue),
    ))
}
