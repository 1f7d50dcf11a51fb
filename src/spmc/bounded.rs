//! This module provides the single-producer, multi-consumer bounded ring.
use crate::access::{self, offset, IndexAccess, Slot};
use crate::backoff::spin_until;
use crate::cache_padded::CachePadded;
use crate::config::round_capacity;
use crate::errors::QueueConfigError;
use crate::handles::{multi_consumer_handle, single_producer_handle};
use crate::light_arc::LightArc;
use crate::loom_bindings::sync::atomic::AtomicU64;

/// The single-producer, multi-consumer ring-based _bounded_ queue.
///
/// It mirrors [`MPSCBoundedQueue`](crate::mpsc::MPSCBoundedQueue): consumers claim indices
/// with a compare-and-swap on the consumer index and check for values against a shared
/// `producer_index_cache`, reading the producer index only once the cache runs out.
///
/// A consumer clears its slot after it claimed the index, so the producer can find a
/// claimed but not yet cleared slot. [`offer`](Self::offer) spins through it,
/// [`relaxed_offer`](Self::relaxed_offer) reports the queue as full instead.
#[repr(C)]
pub struct SPMCBoundedQueue<T> {
    buffer: Box<[Slot<T>]>,
    mask: usize,
    producer_index: CachePadded<AtomicU64>,
    producer_index_cache: CachePadded<AtomicU64>,
    consumer_index: CachePadded<AtomicU64>,
}

impl<T> SPMCBoundedQueue<T> {
    /// Creates a queue for at least `capacity` values, rounded up to a power of two.
    pub fn new(capacity: usize) -> Result<Self, QueueConfigError> {
        let capacity = round_capacity(capacity, 1)?;

        Ok(Self {
            buffer: Slot::new_buffer(capacity),
            mask: capacity - 1,
            producer_index: CachePadded::new(AtomicU64::new(0)),
            producer_index_cache: CachePadded::new(AtomicU64::new(0)),
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
        access::size(&self.consumer_index, &self.producer_index, 0, self.capacity())
    }

    /// Returns whether the queue is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        access::is_empty(&self.consumer_index, &self.producer_index)
    }

    /// Returns how many values have been offered so far.
    pub fn current_producer_index(&self) -> u64 {
        self.producer_index.load_volatile()
    }

    /// Returns how many indices consumers have claimed so far.
    pub fn current_consumer_index(&self) -> u64 {
        self.consumer_index.load_volatile()
    }
}

// Producer
impl<T> SPMCBoundedQueue<T> {
    /// Pushes a value or returns it back if the queue is full.
    ///
    /// # Safety
    ///
    /// The caller must be the only producer.
    #[inline]
    pub unsafe fn offer(&self, value: T) -> Result<(), T> {
        let producer_index = self.producer_index.load_plain();
        let slot = self.slot(producer_index);

        if !slot.is_empty() {
            if producer_index - self.consumer_index.load_volatile() > self.mask as u64 {
                return Err(value);
            }

            // A consumer claimed the slot and is about to clear it.
            spin_until(|| slot.is_empty().then_some(()));
        }

        unsafe { slot.write(value) };
        self.producer_index.store_ordered(producer_index + 1);

        Ok(())
    }

    /// Pushes a value unless the next slot is still occupied.
    ///
    /// # Safety
    ///
    /// The caller must be the only producer.
    #[inline]
    pub unsafe fn relaxed_offer(&self, value: T) -> Result<(), T> {
        let producer_index = self.producer_index.load_plain();
        let slot = self.slot(producer_index);

        if !slot.is_empty() {
            return Err(value);
        }

        unsafe { slot.write(value) };
        self.producer_index.store_ordered(producer_index + 1);

        Ok(())
    }

    /// Pushes up to `limit` values from `supplier`, stopping at the first occupied slot.
    ///
    /// # Safety
    ///
    /// The caller must be the only producer.
    pub unsafe fn fill<S: FnMut() -> T>(&self, mut supplier: S, limit: usize) -> usize {
        let mut producer_index = self.producer_index.load_plain();

        for i in 0..limit {
            let slot = self.slot(producer_index);

            if !slot.is_empty() {
                return i;
            }

            producer_index += 1;

            unsafe { slot.write(supplier()) };
            self.producer_index.store_ordered(producer_index);
        }

        limit
    }
}

// Consumers
impl<T> SPMCBoundedQueue<T> {
    /// Returns an upper bound of readable indices above `consumer_index`, or `None` if
    /// the queue is empty.
    #[inline]
    fn refresh_producer_index_cache(&self, consumer_index: u64, cache: &mut u64) -> Option<()> {
        if consumer_index >= *cache {
            let producer_index = self.producer_index.load_volatile();

            if consumer_index >= producer_index {
                return None;
            }

            *cache = producer_index;
            self.producer_index_cache.store_volatile(producer_index);
        }

        Some(())
    }

    /// Pops the head value.
    pub fn poll(&self) -> Option<T> {
        let mut cache = self.producer_index_cache.load_volatile();
        let mut consumer_index;

        loop {
            consumer_index = self.consumer_index.load_volatile();

            self.refresh_producer_index_cache(consumer_index, &mut cache)?;

            if self.consumer_index.cas(consumer_index, consumer_index + 1) {
                break;
            }
        }

        // The producer publishes the value before the index, so it is there.
        Some(unsafe { self.slot(consumer_index).take() })
    }

    /// Same as [`poll`](Self::poll).
    #[inline]
    pub fn relaxed_poll(&self) -> Option<T> {
        self.poll()
    }

    /// Claims up to `limit` readable indices at once and pops them into `consumer`.
    #[allow(clippy::cast_possible_truncation, reason = "It claims at most `limit`.")]
    pub fn drain<C: FnMut(T)>(&self, mut consumer: C, limit: usize) -> usize {
        if limit == 0 {
            return 0;
        }

        let mut cache = self.producer_index_cache.load_volatile();
        let mut consumer_index;
        let mut claimed;

        loop {
            consumer_index = self.consumer_index.load_volatile();

            if self
                .refresh_producer_index_cache(consumer_index, &mut cache)
                .is_none()
            {
                return 0;
            }

            claimed = (cache - consumer_index).min(limit as u64);

            if self.consumer_index.cas(consumer_index, consumer_index + claimed) {
                break;
            }
        }

        for i in 0..claimed {
            consumer(unsafe { self.slot(consumer_index + i).take() });
        }

        claimed as usize
    }

    /// Returns a copy of the head value.
    pub fn peek(&self) -> Option<T>
    where
        T: Copy,
    {
        let mut cache = self.producer_index_cache.load_volatile();

        loop {
            let consumer_index = self.consumer_index.load_volatile();

            self.refresh_producer_index_cache(consumer_index, &mut cache)?;

            let slot = self.slot(consumer_index);

            if slot.is_filled() {
                if let Some(value) = slot.copy_validated(&self.consumer_index, consumer_index) {
                    return Some(value);
                }
            }
        }
    }

    /// Returns a copy of the head value without consulting the producer index.
    pub fn relaxed_peek(&self) -> Option<T>
    where
        T: Copy,
    {
        loop {
            let consumer_index = self.consumer_index.load_volatile();
            let slot = self.slot(consumer_index);

            if !slot.is_filled() {
                if self.consumer_index.load_volatile() == consumer_index {
                    return None;
                }

                continue;
            }

            if let Some(value) = slot.copy_validated(&self.consumer_index, consumer_index) {
                return Some(value);
            }
        }
    }
}

unsafe impl<T: Send> Send for SPMCBoundedQueue<T> {}
unsafe impl<T: Send> Sync for SPMCBoundedQueue<T> {}

single_producer_handle!(SPMCBoundedQueue, SPMCBoundedProducer);
multi_consumer_handle!(SPMCBoundedQueue, SPMCBoundedConsumer);

/// Creates a single-producer, multi-consumer bounded queue for at least `capacity`
/// values, rounded up to a power of two.
///
/// Clone the [`consumer`](SPMCBoundedConsumer) to add consumers.
///
/// # Examples
///
/// ```
/// use ferroq::{spmc, Consumer, MultiConsumer, Producer};
///
/// let (mut producer, mut consumer) = spmc::new_bounded(8).unwrap();
/// let mut other = consumer.clone();
///
/// producer.offer(1).unwrap();
/// producer.offer(2).unwrap();
///
/// assert_eq!(other.peek(), Some(1));
/// assert_eq!(consumer.poll(), Some(1));
/// assert_eq!(other.poll(), Some(2));
/// ```
pub fn new_bounded<T>(
    capacity: usize,
) -> Result<(SPMCBoundedProducer<T>, SPMCBoundedConsumer<T>), QueueConfigError> {
    let queue = LightArc::new(SPMCBoundedQueue::new(capacity)?);

    Ok((
        SPMCBoundedProducer::new(queue.clone()),
        SPMCBoundedConsumer::new(queue),
    ))
}
