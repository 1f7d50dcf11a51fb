use crate::access::IndexAccess;
use crate::errors::QueueConfigError;
use crate::handles::{multi_consumer_handle, multi_producer_handle};
use crate::light_arc::LightArc;
use crate::producer::FILL_BATCH;
use crate::xadd::{XaddChunk, XaddCore};
use crossbeam_epoch::{self as epoch, Guard};
use std::ptr;

/// The multi-producer, multi-consumer unbounded queue of numbered chunks.
///
/// Producers work like in [`MPSCXaddQueue`](crate::mpsc::MPSCXaddQueue). Consumers claim
/// an index with a compare-and-swap once they see its value, and the consumer that claims
/// the first index of a chunk moves everyone to that chunk.
///
/// A pooled chunk may come back while a slow consumer still holds a claim on one of its
/// slots from the earlier lap. Pooled chunks therefore tag each slot with the number of
/// the chunk its value was written for, and producers wait for the slow consumer before
/// they write.
pub struct MPMCXaddQueue<T> {
    core: XaddCore<T>,
}

impl<T> MPMCXaddQueue<T> {
    /// Creates a queue of `chunk_size` chunks, `max_pooled_chunks` of which are reused.
    ///
    /// The chunk size must be at least 2 and is rounded up to a power of two.
    pub fn new(chunk_size: usize, max_pooled_chunks: usize) -> Result<Self, QueueConfigError> {
        XaddCore::new(chunk_size, max_pooled_chunks, true).map(|core| Self { core })
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

    /// Returns how many indices consumers have claimed so far.
    pub fn current_consumer_index(&self) -> u64 {
        self.core.consumer_index.load_volatile()
    }

    /// Returns whether the value of the chunk numbered `chunk_index` is in the slot.
    #[inline(always)]
    fn is_ready(chunk: &XaddChunk<T>, offset: usize, chunk_index: i64) -> bool {
        if chunk.is_pooled() {
            // It implies the chunk number.
            chunk.sequence(offset) == chunk_index
        } else {
            chunk.index() == chunk_index && chunk.slot(offset).is_filled()
        }
    }

    /// Checks `index` against the producer index, reloading the cached one only when
    /// `index` has caught up with it.
    #[inline]
    fn is_empty_at(&self, index: u64, producer_index: &mut u64) -> bool {
        if index < *producer_index {
            return false;
        }

        *producer_index = self.core.producer_index.load_volatile();

        index == *producer_index
    }
}

// Producer
impl<T> MPMCXaddQueue<T> {
    #[inline(always)]
    fn write(chunk: &XaddChunk<T>, offset: usize, chunk_index: i64, value: T) {
        let slot = chunk.slot(offset);

        if chunk.is_pooled() {
            chunk.spin_for_empty(offset);
        }

        unsafe { slot.write(value) };

        if chunk.is_pooled() {
            chunk.set_sequence(offset, chunk_index);
        }
    }

    /// Adds a value to the queue. It never fails.
    pub fn offer(&self, value: T) -> Result<(), T> {
        let _guard = epoch::pin();
        let index = self.core.producer_index.get_and_add(1);
        let (offset, chunk_index) = self.core.locate(index);
        let chunk = unsafe { self.core.producer_chunk_for(ptr::null_mut(), chunk_index) };

        Self::write(unsafe { &*chunk }, offset, chunk_index, value);

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

            Self::write(unsafe { &*chunk }, offset, chunk_index, supplier());

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
impl<T> MPMCXaddQueue<T> {
    /// Takes the first value of `next` and makes it the consumer chunk.
    ///
    /// # Safety
    ///
    /// The caller must have claimed the first index of the chunk after `chunk`.
    unsafe fn take_first_and_move(
        &self,
        chunk: *mut XaddChunk<T>,
        next: *mut XaddChunk<T>,
        chunk_index: i64,
        guard: &Guard,
    ) -> T {
        // Nobody else moves the consumer chunk until we do, so spinning is fine.
        let next = if next.is_null() {
            unsafe { (*chunk).spin_for_next() }
        } else {
            next
        };
        let next_ref = unsafe { &*next };

        if next_ref.is_pooled() {
            next_ref.spin_for_sequence(0, chunk_index);
        } else {
            next_ref.spin_for_value(0);
        }

        let value = unsafe { next_ref.slot(0).take() };

        unsafe { self.core.move_to_next_consumer_chunk(chunk, next, guard) };

        value
    }

    /// Removes the value at the head of the queue.
    pub fn poll(&self) -> Option<T> {
        let guard = epoch::pin();
        let mut producer_index = 0;

        loop {
            let index = self.core.consumer_index.load_volatile();
            let chunk = self.core.consumer_chunk();
            let (offset, chunk_index) = self.core.locate(index);
            let current_index = unsafe { (*chunk).index() };

            if offset == 0 && index != 0 {
                if chunk_index - current_index != 1 {
                    // Another consumer moved the consumer chunk.
                    continue;
                }

                // A racing consumer may have unlinked `next` already, but then it also
                // claimed `index` and our compare-and-swap fails.
                let next = unsafe { (*chunk).next() };

                if next.is_null() && self.is_empty_at(index, &mut producer_index) {
                    return None;
                }

                if self.core.consumer_index.cas(index, index + 1) {
                    return Some(unsafe {
                        self.take_first_and_move(chunk, next, chunk_index, &guard)
                    });
                }

                continue;
            }

            if current_index > chunk_index {
                // A stale view.
                continue;
            }

            if current_index == chunk_index {
                let chunk = unsafe { &*chunk };

                if chunk.is_pooled() {
                    let sequence = chunk.sequence(offset);

                    if sequence == chunk_index {
                        if self.core.consumer_index.cas(index, index + 1) {
                            return Some(unsafe { chunk.slot(offset).take() });
                        }

                        continue;
                    }

                    if sequence > chunk_index {
                        continue;
                    }
                } else if chunk.slot(offset).is_filled() {
                    if self.core.consumer_index.cas(index, index + 1) {
                        return Some(unsafe { chunk.slot(offset).take() });
                    }

                    continue;
                }
            }

            // Not written yet, or the chunk isn't linked yet.
            if self.is_empty_at(index, &mut producer_index) {
                return None;
            }
        }
    }

    /// Removes the value at the head of the queue without ever spinning.
    pub fn relaxed_poll(&self) -> Option<T> {
        let guard = epoch::pin();
        let index = self.core.consumer_index.load_volatile();
        let chunk = self.core.consumer_chunk();
        let (offset, chunk_index) = self.core.locate(index);

        if offset == 0 && index != 0 {
            if unsafe { (*chunk).index() } != chunk_index - 1 {
                return None;
            }

            let next = unsafe { (*chunk).next() };

            if next.is_null()
                || !Self::is_ready(unsafe { &*next }, 0, chunk_index)
                || !self.core.consumer_index.cas(index, index + 1)
            {
                return None;
            }

            let value = unsafe { (*next).slot(0).take() };

            unsafe { self.core.move_to_next_consumer_chunk(chunk, next, &guard) };

            return Some(value);
        }

        let chunk = unsafe { &*chunk };

        if !Self::is_ready(chunk, offset, chunk_index)
            || !self.core.consumer_index.cas(index, index + 1)
        {
            return None;
        }

        Some(unsafe { chunk.slot(offset).take() })
    }

    /// Passes up to `limit` values to `consumer`, relaxed-polling one at a time.
    pub fn drain<C: FnMut(T)>(&self, mut consumer: C, limit: usize) -> usize {
        for i in 0..limit {
            match self.relaxed_poll() {
                Some(value) => consumer(value),
                None => return i,
            }
        }

        limit
    }

    /// Copies the value of `index` if it is there and nobody claimed it meanwhile.
    fn peek_at(&self, index: u64) -> Option<T>
    where
        T: Copy,
    {
        let _guard = epoch::pin();
        let mut chunk = self.core.consumer_chunk();
        let (offset, chunk_index) = self.core.locate(index);

        if offset == 0 && index != 0 {
            if unsafe { (*chunk).index() } != chunk_index - 1 {
                return None;
            }

            chunk = unsafe { (*chunk).next() };

            if chunk.is_null() {
                return None;
            }
        }

        let chunk = unsafe { &*chunk };

        if !Self::is_ready(chunk, offset, chunk_index) {
            return None;
        }

        chunk
            .slot(offset)
            .copy_validated(&self.core.consumer_index, index)
    }

    /// Returns a copy of the head value.
    ///
    /// Returns `None` if and only if the queue is empty.
    pub fn peek(&self) -> Option<T>
    where
        T: Copy,
    {
        loop {
            let index = self.core.consumer_index.load_volatile();

            if let Some(value) = self.peek_at(index) {
                return Some(value);
            }

            if index == self.core.producer_index.load_volatile() {
                return None;
            }
        }
    }

    /// Returns a copy of the head value. It may return `None` for a non-empty queue.
    pub fn relaxed_peek(&self) -> Option<T>
    where
        T: Copy,
    {
        self.peek_at(self.core.consumer_index.load_volatile())
    }
}

unsafe impl<T: Send> Send for MPMCXaddQueue<T> {}
unsafe impl<T: Send> Sync for MPMCXaddQueue<T> {}

multi_producer_handle!(MPMCXaddQueue, MPMCXaddProducer, fill_all = fill_all);
multi_consumer_handle!(MPMCXaddQueue, MPMCXaddConsumer);

/// Creates a multi-producer, multi-consumer unbounded queue of `chunk_size` chunks that
/// reuses up to `max_pooled_chunks` of them.
///
/// Pass [`DEFAULT_MAX_POOLED_CHUNKS`](crate::DEFAULT_MAX_POOLED_CHUNKS) if unsure.
///
/// # Examples
///
/// ```
/// use ferroq::{mpmc, Consumer, MultiConsumer, Producer, DEFAULT_MAX_POOLED_CHUNKS};
///
/// let (mut producer, mut consumer) = mpmc::new_xadd(2, DEFAULT_MAX_POOLED_CHUNKS).unwrap();
///
/// for i in 0..5 {
///     producer.offer(i).unwrap();
/// }
///
/// assert_eq!(consumer.peek(), Some(0));
/// assert_eq!(consumer.clone().poll(), Some(0));
/// assert_eq!(consumer.len(), 4);
/// ```
pub fn new_xadd<T>(
    chunk_size: usize,
    max_pooled_chunks: usize,
) -> Result<(MPMCXaddProducer<T>, MPMCXaddConsumer<T>), QueueConfigError> {
    let queue = LightArc::new(MPMCXaddQueue::new(chunk_size, max_pooled_chunks)?);

    Ok((MPMCXaddProducer::new(queue.clone()), MPMCXaddConsumer::new(queue)))
}
