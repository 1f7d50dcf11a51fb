use crate::access::{IndexAccess, Slot};
use crate::errors::QueueConfigError;
use crate::handles::{multi_producer_handle, single_consumer_handle};
use crate::light_arc::LightArc;
use crate::producer::FILL_BATCH;
use crate::xadd::{XaddChunk, XaddCore};
use crossbeam_epoch as epoch;
use std::ptr;

/// The multi-producer, single-consumer unbounded queue of numbered chunks.
///
/// Producers claim an index with one `fetch_add` and never retry. The consumer decides
/// whether a value is there by its slot alone and spins only when a producer has claimed
/// the index but not yet written it.
///
/// Chunks the consumer drained go back to a pool of `max_pooled_chunks`, so a queue that
/// never holds more than that many chunks of values stops allocating.
pub struct MPSCXaddQueue<T> {
    core: XaddCore<T>,
}

impl<T> MPSCXaddQueue<T> {
    /// Creates a queue of `chunk_size` chunks, `max_pooled_chunks` of which are reused.
    ///
    /// The chunk size must be at least 2 and is rounded up to a power of two.
    pub fn new(chunk_size: usize, max_pooled_chunks: usize) -> Result<Self, QueueConfigError> {
        XaddCore::new(chunk_size, max_pooled_chunks, false).map(|core| Self { core })
    }

    /// Always returns `None`: the queue is unbounded.
    #[inline]
    pub fn capacity(&self) -> Option<usize> {
        None
    }

    /// Returns the number of values in the queue.
    #[inline]
    pub fn len(&self) -> usize {
        self.core.len()
    }

    /// Returns whether the queue is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.core.is_empty()
    }

    /// Returns how many indices producers have claimed so far.
    pub fn current_producer_index(&self) -> u64 {
        self.core.producer_index.load_volatile()
    }

    /// Returns how many values have been polled so far.
    pub fn current_consumer_index(&self) -> u64 {
        self.core.consumer_index.load_volatile()
    }

    /// Returns the chunk after `chunk`, spinning for the link if a producer has claimed
    /// `index`. Returns null if the queue is empty.
    unsafe fn next_chunk_if_not_empty(
        &self,
        chunk: *mut XaddChunk<T>,
        index: u64,
    ) -> *mut XaddChunk<T> {
        let next = unsafe { (*chunk).next() };

        if !next.is_null() {
            return next;
        }

        if self.core.producer_index.load_volatile() == index {
            return ptr::null_mut();
        }

        unsafe { (*chunk).spin_for_next() }
    }

    #[inline(always)]
    unsafe fn take(&self, slot: &Slot<T>, index: u64) -> T {
        let value = unsafe { slot.take() };

        self.core.consumer_index.store_ordered(index + 1);

        value
    }
}

// Producer
impl<T> MPSCXaddQueue<T> {
    /// Adds a value to the queue. It never fails.
    pub fn offer(&self, value: T) -> Result<(), T> {
        let _guard = epoch::pin();
        let index = self.core.producer_index.get_and_add(1);
        let (offset, chunk_index) = self.core.locate(index);
        let chunk = unsafe { self.core.producer_chunk_for(ptr::null_mut(), chunk_index) };

        unsafe { (*chunk).slot(offset).write(value) };

        Ok(())
    }

    /// Same as [`offer`](Self::offer).
    #[inline]
    pub fn relaxed_offer(&self, value: T) -> Result<(), T> {
        self.offer(value)
    }

    /// Claims `limit` indices at once and fills them from `supplier`.
    pub fn fill<S: FnMut() -> T>(&self, mut supplier: S, limit: usize) -> usize {
        if limit == 0 {
            return 0;
        }

        let _guard = epoch::pin();
        let mut index = self.core.producer_index.get_and_add(limit as u64);
        let mut chunk = ptr::null_mut();

        for _ in 0..limit {
            let (offset, chunk_index) = self.core.locate(index);

            chunk = unsafe { self.core.producer_chunk_for(chunk, chunk_index) };

            unsafe { (*chunk).slot(offset).write(supplier()) };

            index += 1;
        }

        limit
    }

    /// Fills one chunk worth of values in batches.
    pub fn fill_all<S: FnMut() -> T>(&self, mut supplier: S) -> usize {
        let chunk_size = self.core.chunk_size();
        let batch = FILL_BATCH.min(chunk_size);
        let mut filled = 0;

        while filled < chunk_size {
            filled += self.fill(&mut supplier, batch);
        }

        filled
    }
}

// Consumer
impl<T> MPSCXaddQueue<T> {
    /// # Safety
    ///
    /// The caller must be the only consumer.
    pub unsafe fn poll(&self) -> Option<T> {
        let guard = epoch::pin();
        let index = self.core.consumer_index.load_plain();
        let (offset, _) = self.core.locate(index);
        let mut chunk = self.core.consumer_chunk();

        if offset == 0 && index != 0 {
            let next = unsafe { self.next_chunk_if_not_empty(chunk, index) };

            if next.is_null() {
                return None;
            }

            unsafe { self.core.move_to_next_consumer_chunk(chunk, next, &guard) };

            chunk = next;
        }

        let slot = unsafe { (*chunk).slot(offset) };

        if !slot.is_filled() {
            if self.core.producer_index.load_volatile() == index {
                return None;
            }

            unsafe { (*chunk).spin_for_value(offset) };
        }

        Some(unsafe { self.take(slot, index) })
    }

    /// # Safety
    ///
    /// The caller must be the only consumer.
    pub unsafe fn relaxed_poll(&self) -> Option<T> {
        let guard = epoch::pin();
        let index = self.core.consumer_index.load_plain();
        let (offset, _) = self.core.locate(index);
        let mut chunk = self.core.consumer_chunk();

        if offset == 0 && index != 0 {
            let next = unsafe { (*chunk).next() };

            if next.is_null() || !unsafe { (*next).slot(0).is_filled() } {
                return None;
            }

            unsafe { self.core.move_to_next_consumer_chunk(chunk, next, &guard) };

            chunk = next;
        }

        let slot = unsafe { (*chunk).slot(offset) };

        if !slot.is_filled() {
            return None;
        }

        Some(unsafe { self.take(slot, index) })
    }

    /// # Safety
    ///
    /// The caller must be the only consumer.
    pub unsafe fn drain<C: FnMut(T)>(&self, mut consumer: C, limit: usize) -> usize {
        let guard = epoch::pin();
        let mut index = self.core.consumer_index.load_plain();
        let mut chunk = self.core.consumer_chunk();

        for i in 0..limit {
            let (offset, _) = self.core.locate(index);

            if offset == 0 && index != 0 {
                let next = unsafe { (*chunk).next() };

                if next.is_null() || !unsafe { (*next).slot(0).is_filled() } {
                    return i;
                }

                unsafe { self.core.move_to_next_consumer_chunk(chunk, next, &guard) };

                chunk = next;
            }

            let slot = unsafe { (*chunk).slot(offset) };

            if !slot.is_filled() {
                return i;
            }

            let value = unsafe { self.take(slot, index) };

            index += 1;
            consumer(value);
        }

        limit
    }

    /// # Safety
    ///
    /// The caller must be the only consumer.
    pub unsafe fn peek_with<R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        let _guard = epoch::pin();
        let index = self.core.consumer_index.load_plain();
        let (offset, _) = self.core.locate(index);
        let mut chunk = self.core.consumer_chunk();

        if offset == 0 && index != 0 {
            chunk = unsafe { self.next_chunk_if_not_empty(chunk, index) };

            if chunk.is_null() {
                return None;
            }
        }

        let slot = unsafe { (*chunk).slot(offset) };

        if !slot.is_filled() {
            if self.core.producer_index.load_volatile() == index {
                return None;
            }

            unsafe { (*chunk).spin_for_value(offset) };
        }

        Some(f(unsafe { slot.value_ref() }))
    }

    /// # Safety
    ///
    /// The caller must be the only consumer.
    pub unsafe fn relaxed_peek_with<R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        let _guard = epoch::pin();
        let index = self.core.consumer_index.load_plain();
        let (offset, _) = self.core.locate(index);
        let mut chunk = self.core.consumer_chunk();

        if offset == 0 && index != 0 {
            chunk = unsafe { (*chunk).next() };

            if chunk.is_null() {
                return None;
            }
        }

        let slot = unsafe { (*chunk).slot(offset) };

        slot.is_filled().then(|| f(unsafe { slot.value_ref() }))
    }
}

unsafe impl<T: Send> Send for MPSCXaddQueue<T> {}
unsafe impl<T: Send> Sync for MPSCXaddQueue<T> {}

multi_producer_handle!(MPSCXaddQueue, MPSCXaddProducer, fill_all = fill_all);
single_consumer_handle!(MPSCXaddQueue, MPSCXaddConsumer);

/// Creates a multi-producer, single-consumer unbounded queue of `chunk_size` chunks that
/// reuses up to `max_pooled_chunks` of them.
///
/// Pass [`DEFAULT_MAX_POOLED_CHUNKS`](crate::DEFAULT_MAX_POOLED_CHUNKS) if unsure.
///
/// # Examples
///
/// ```
/// use ferroq::{mpsc, Consumer, Producer, DEFAULT_MAX_POOLED_CHUNKS};
///
/// let (mut producer, mut consumer) = mpsc::new_xadd(4, DEFAULT_MAX_POOLED_CHUNKS).unwrap();
/// let mut second_producer = producer.clone();
///
/// producer.offer(1).unwrap();
/// second_producer.offer(2).unwrap();
///
/// assert_eq!(consumer.poll(), Some(1));
/// assert_eq!(consumer.poll(), Some(2));
/// assert_eq!(consumer.poll(), None);
/// ```
pub fn new_xadd<T>(
    chunk_size: usize,
    max_pooled_chunks: usize,
) -> Result<(MPSCXaddProducer<T>, MPSCXaddConsumer<T>), QueueConfigError> {
    let queue = LightArc::new(MPSCXaddQueue::new(chunk_size, max_pooled_chunks)?);

    Ok((MPSCXaddProducer::new(queue.clone()), MPSCXaddConsumer::new(queue)))
}
