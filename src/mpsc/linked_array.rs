//! This module provides the multi-producer, single-consumer queues of linked chunks.
//!
//! Indices count in steps of two. An odd producer index means a producer is linking a
//! new chunk, and the other producers wait for it to finish.
use crate::access::{self, IndexAccess, Slot, EMPTY, JUMP};
use crate::backoff::spin_until;
use crate::cache_padded::CachePadded;
use crate::chunk::Chunk;
use crate::config::{check_chunk_below, round_capacity};
use crate::errors::QueueConfigError;
use crate::handles::{multi_producer_handle, single_consumer_handle};
use crate::light_arc::LightArc;
use crate::loom_bindings::hint::spin_loop;
use crate::loom_bindings::sync::atomic::{AtomicPtr, AtomicU64};
use std::cell::Cell;
use std::sync::atomic::Ordering::Relaxed;

/// How the queue grows once the producer chunk is full.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Growth {
    /// Links a chunk of the same size, without limit.
    Unbounded,
    /// Links a chunk of the same size while fewer than the maximum capacity values are
    /// queued.
    Chunked,
    /// Links a chunk twice as large until a chunk of the maximum capacity is reached.
    Growable,
}

/// What an offer does after it ran into the producer limit.
enum SlowPath {
    /// The limit was raised, claim the index.
    Claim,
    Retry,
    Full,
    /// The index is claimed for linking a new chunk.
    Resize,
}

#[inline(always)]
#[allow(
    clippy::cast_possible_truncation,
    reason = "The mask is derived from a usize chunk length."
)]
fn offset(index: u64, mask: u64) -> usize {
    ((index & mask) >> 1) as usize
}

/// The mask of a chunk of `len` slots for indices that count in steps of two.
#[inline(always)]
fn mask_of(len: usize) -> u64 {
    ((len - 1) as u64) << 1
}

struct ProducerChunk<T> {
    chunk: AtomicPtr<Chunk<T>>,
    mask: AtomicU64,
}

struct ConsumerFields<T> {
    index: AtomicU64,
    chunk: Cell<*mut Chunk<T>>,
    mask: Cell<u64>,
}

/// The multi-producer, single-consumer queue of linked ring chunks.
///
/// Producers claim indices like in [`MPSCBoundedQueue`](crate::mpsc::MPSCBoundedQueue).
/// The last slot of a chunk is never claimed for a value: the producer that reaches it
/// claims an odd index instead, links a new chunk with its value, publishes the next
/// even index and writes `JUMP` into the slot. The consumer follows the link when it
/// reads `JUMP` and frees the old chunk.
///
/// It comes in three flavors:
///
/// * [`new_chunked`]: chunks of one size up to a maximum capacity.
/// * [`new_growable`]: every new chunk doubles, up to a chunk of the maximum capacity.
/// * [`new_unbounded`]: chunks of one size without limit.
#[repr(C)]
pub struct MPSCLinkedArrayQueue<T> {
    producer_index: CachePadded<AtomicU64>,
    producer_limit: CachePadded<AtomicU64>,
    producer_chunk: CachePadded<ProducerChunk<T>>,
    consumer: CachePadded<ConsumerFields<T>>,
    growth: Growth,
    /// The maximum capacity in steps of two, `0` if unbounded.
    max_capacity: u64,
}

impl<T> MPSCLinkedArrayQueue<T> {
    fn with_first_chunk(len: usize, growth: Growth, max_capacity: usize) -> Self {
        let chunk = Chunk::alloc(len);
        let mask = mask_of(len);

        Self {
            producer_index: CachePadded::new(AtomicU64::new(0)),
            // The first chunk is empty.
            producer_limit: CachePadded::new(AtomicU64::new(mask)),
            producer_chunk: CachePadded::new(ProducerChunk {
                chunk: AtomicPtr::new(chunk),
                mask: AtomicU64::new(mask),
            }),
            consumer: CachePadded::new(ConsumerFields {
                index: AtomicU64::new(0),
                chunk: Cell::new(chunk),
                mask: Cell::new(mask),
            }),
            growth,
            max_capacity: (max_capacity as u64) << 1,
        }
    }

    fn with_growth(
        initial_capacity: usize,
        max_capacity: usize,
        growth: Growth,
    ) -> Result<Self, QueueConfigError> {
        let initial_capacity = round_capacity(initial_capacity, 2)?;
        let max_capacity = round_capacity(max_capacity, 4)?;

        check_chunk_below(initial_capacity, max_capacity)?;

        Ok(Self::with_first_chunk(initial_capacity, growth, max_capacity))
    }

    /// Creates a queue of `initial_capacity` chunks that holds up to `max_capacity`
    /// values.
    ///
    /// The initial capacity must be at least 2 and the maximum capacity at least 4. Both
    /// are rounded up to a power of two, and the initial one must stay below the maximum.
    pub fn new_chunked(
        initial_capacity: usize,
        max_capacity: usize,
    ) -> Result<Self, QueueConfigError> {
        Self::with_growth(initial_capacity, max_capacity, Growth::Chunked)
    }

    /// Creates a queue that starts with an `initial_capacity` chunk and doubles it up to
    /// `max_capacity`.
    ///
    /// The parameters follow the rules of [`new_chunked`](Self::new_chunked).
    pub fn new_growable(
        initial_capacity: usize,
        max_capacity: usize,
    ) -> Result<Self, QueueConfigError> {
        Self::with_growth(initial_capacity, max_capacity, Growth::Growable)
    }

    /// Creates an unbounded queue of `chunk_size` chunks.
    ///
    /// The chunk must be at least 2 and is rounded up to a power of two.
    pub fn new_unbounded(chunk_size: usize) -> Result<Self, QueueConfigError> {
        let chunk = round_capacity(chunk_size, 2)?;

        Ok(Self::with_first_chunk(chunk, Growth::Unbounded, 0))
    }

    /// Returns the maximum capacity, or `None` if the queue is unbounded.
    #[inline]
    #[allow(
        clippy::cast_possible_truncation,
        reason = "It was a usize before it was doubled."
    )]
    pub fn capacity(&self) -> Option<usize> {
        (self.growth != Growth::Unbounded).then_some((self.max_capacity >> 1) as usize)
    }

    /// Returns the number of values in the queue.
    #[inline]
    pub fn len(&self) -> usize {
        access::size(&self.consumer.index, &self.producer_index, 1, self.capacity())
    }

    /// Returns whether the queue is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        access::is_empty(&self.consumer.index, &self.producer_index)
    }

    /// Returns how many indices producers have claimed so far.
    pub fn current_producer_index(&self) -> u64 {
        self.producer_index.load_volatile() >> 1
    }

    /// Returns how many values have been polled so far.
    pub fn current_consumer_index(&self) -> u64 {
        self.consumer.index.load_volatile() >> 1
    }

    /// Returns how many more values the whole queue takes, in steps of two.
    #[allow(
        clippy::cast_possible_wrap,
        reason = "The distance is interpreted as a signed one."
    )]
    fn available_in_queue(&self, producer_index: u64, consumer_index: u64) -> i64 {
        match self.growth {
            Growth::Unbounded => i64::MAX,
            Growth::Chunked | Growth::Growable => {
                // The producer index may be stale, behind the consumer index.
                self.max_capacity as i64 - producer_index.wrapping_sub(consumer_index) as i64
            }
        }
    }

    /// Returns how far the producer index may run ahead of the consumer index in a chunk
    /// with `mask`.
    fn chunk_capacity(&self, mask: u64) -> u64 {
        // Only the largest chunk of a growable queue is never left, so its last slot
        // needs no `JUMP`.
        if self.growth == Growth::Growable && mask + 2 == self.max_capacity {
            self.max_capacity
        } else {
            mask
        }
    }

    fn next_chunk_len(&self, len: usize) -> usize {
        if self.growth == Growth::Growable {
            debug_assert!(((len as u64) << 1) < self.max_capacity);

            len * 2
        } else {
            len
        }
    }
}

// Producers
impl<T> MPSCLinkedArrayQueue<T> {
    fn offer_slow_path(&self, mask: u64, producer_index: u64, producer_limit: u64) -> SlowPath {
        let consumer_index = self.consumer.index.load_volatile();
        let chunk_capacity = self.chunk_capacity(mask);

        if consumer_index + chunk_capacity > producer_index {
            if self
                .producer_limit
                .cas(producer_limit, consumer_index + chunk_capacity)
            {
                SlowPath::Claim
            } else {
                SlowPath::Retry
            }
        } else if self.available_in_queue(producer_index, consumer_index) <= 0 {
            SlowPath::Full
        } else if self.producer_index.cas(producer_index, producer_index + 1) {
            SlowPath::Resize
        } else {
            SlowPath::Retry
        }
    }

    /// Links a new chunk holding the value of `producer_index`, which this producer
    /// claimed with an odd index.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        reason = "The available room is positive and the chunk length a usize."
    )]
    fn resize(&self, old: *mut Chunk<T>, old_mask: u64, producer_index: u64, value: T) {
        let len = self.next_chunk_len((old_mask >> 1) as usize + 1);
        let new = Chunk::alloc(len);
        let new_mask = mask_of(len);

        tracing::trace!(len, index = producer_index >> 1, "linking a new chunk");

        self.producer_chunk.chunk.store(new, Relaxed);
        self.producer_chunk.mask.store_plain(new_mask);

        unsafe {
            (*new).slot(offset(producer_index, new_mask)).write(value);
            (*old).link(new);
        }

        let available =
            self.available_in_queue(producer_index, self.consumer.index.load_volatile());

        debug_assert!(available > 0);

        self.producer_limit
            .store_ordered(producer_index + new_mask.min(available as u64));
        // Publishes the new chunk to the other producers.
        self.producer_index.store_ordered(producer_index + 2);

        // The consumer may free the old chunk right after this.
        unsafe { (*old).slot(offset(producer_index, old_mask)).mark_jump() };
    }

    /// Reads the producer chunk after an even producer index was read.
    #[inline(always)]
    fn producer_chunk(&self) -> (*mut Chunk<T>, u64) {
        (
            self.producer_chunk.chunk.load(Relaxed),
            self.producer_chunk.mask.load_plain(),
        )
    }

    /// Pushes a value or returns it back if the queue is full.
    pub fn offer(&self, value: T) -> Result<(), T> {
        let (mut chunk, mut mask);
        let mut producer_index;

        loop {
            let producer_limit = self.producer_limit.load_volatile();

            producer_index = self.producer_index.load_volatile();

            if producer_index & 1 == 1 {
                spin_loop();

                continue;
            }

            (chunk, mask) = self.producer_chunk();

            if producer_limit <= producer_index {
                match self.offer_slow_path(mask, producer_index, producer_limit) {
                    SlowPath::Claim => {}
                    SlowPath::Retry => continue,
                    SlowPath::Full => return Err(value),
                    SlowPath::Resize => {
                        self.resize(chunk, mask, producer_index, value);

                        return Ok(());
                    }
                }
            }

            if self.producer_index.cas(producer_index, producer_index + 2) {
                break;
            }
        }

        unsafe { (*chunk).slot(offset(producer_index, mask)).write(value) };

        Ok(())
    }

    /// Same as [`offer`](Self::offer).
    #[inline]
    pub fn relaxed_offer(&self, value: T) -> Result<(), T> {
        self.offer(value)
    }

    /// Claims up to `limit` indices of the producer chunk at once and fills them from
    /// `supplier`.
    ///
    /// When the chunk is full, it links a new one with a single value.
    #[allow(
        clippy::cast_possible_truncation,
        reason = "It claims at most `limit` values."
    )]
    pub fn fill<S: FnMut() -> T>(&self, mut supplier: S, limit: usize) -> usize {
        if limit == 0 {
            return 0;
        }

        let (mut chunk, mut mask);
        let mut producer_index;
        let claimed;

        loop {
            let producer_limit = self.producer_limit.load_volatile();

            producer_index = self.producer_index.load_volatile();

            if producer_index & 1 == 1 {
                spin_loop();

                continue;
            }

            (chunk, mask) = self.producer_chunk();

            let wanted = (limit as u64).saturating_mul(2);
            let batch_index = producer_limit.min(producer_index.saturating_add(wanted));

            if producer_index >= producer_limit {
                match self.offer_slow_path(mask, producer_index, producer_limit) {
                    SlowPath::Claim | SlowPath::Retry => continue,
                    SlowPath::Full => return 0,
                    SlowPath::Resize => {
                        self.resize(chunk, mask, producer_index, supplier());

                        return 1;
                    }
                }
            }

            if self.producer_index.cas(producer_index, batch_index) {
                claimed = (batch_index - producer_index) >> 1;

                break;
            }
        }

        for i in 0..claimed {
            let slot = unsafe { (*chunk).slot(offset(producer_index + 2 * i, mask)) };

            unsafe { slot.write(supplier()) };
        }

        claimed as usize
    }
}

// Consumer
impl<T> MPSCLinkedArrayQueue<T> {
    #[inline(always)]
    fn consumer_slot(&self, index: u64) -> (*mut Chunk<T>, &Slot<T>) {
        let chunk = self.consumer.chunk.get();
        // The consumer frees a chunk only after it has moved to the next one.
        let slot = unsafe { (*chunk).slot(offset(index, self.consumer.mask.get())) };

        (chunk, slot)
    }

    /// Returns the head slot with a value, following a `JUMP`. With `wait`, it spins
    /// through a claimed but unwritten slot.
    #[inline]
    fn head_slot(&self, index: u64, wait: bool) -> Option<&Slot<T>> {
        let (chunk, slot) = self.consumer_slot(index);
        let mut state = slot.state();

        if state == EMPTY {
            if !wait || index == self.producer_index.load_volatile() {
                return None;
            }

            state = spin_until(|| {
                let state = slot.state();

                (state != EMPTY).then_some(state)
            });
        }

        if state == JUMP {
            return Some(unsafe { self.move_to_next_chunk(chunk, index) });
        }

        Some(slot)
    }

    /// Frees the chunk the consumer leaves and returns the slot of `index` in the next
    /// chunk.
    ///
    /// # Safety
    ///
    /// The consumer must have read `JUMP` at `index` in `chunk`.
    #[cold]
    unsafe fn move_to_next_chunk(&self, chunk: *mut Chunk<T>, index: u64) -> &Slot<T> {
        let next = unsafe { (*chunk).next() };

        debug_assert!(!next.is_null());

        // Every producer of the chunk has written its value, and `JUMP` was the last
        // write to it.
        unsafe { Chunk::free(chunk) };

        let mask = mask_of(unsafe { (*next).len() });

        self.consumer.chunk.set(next);
        self.consumer.mask.set(mask);

        let slot = unsafe { (*next).slot(offset(index, mask)) };

        debug_assert!(slot.is_filled());

        slot
    }

    #[inline(always)]
    fn take(&self, slot: &Slot<T>, index: u64) -> T {
        let value = unsafe { slot.take() };

        self.consumer.index.store_ordered(index + 2);

        value
    }

    /// Pops the head value, spinning if a producer has claimed it but not written it yet.
    ///
    /// # Safety
    ///
    /// The caller must be the only consumer.
    #[inline]
    pub unsafe fn poll(&self) -> Option<T> {
        let index = self.consumer.index.load_plain();
        let slot = self.head_slot(index, true)?;

        Some(self.take(slot, index))
    }

    /// Pops the head value if it is already written.
    ///
    /// # Safety
    ///
    /// The caller must be the only consumer.
    #[inline]
    pub unsafe fn relaxed_poll(&self) -> Option<T> {
        let index = self.consumer.index.load_plain();
        let slot = self.head_slot(index, false)?;

        Some(self.take(slot, index))
    }

    /// Pops up to `limit` written values into `consumer`.
    ///
    /// # Safety
    ///
    /// The caller must be the only consumer.
    pub unsafe fn drain<C: FnMut(T)>(&self, mut consumer: C, limit: usize) -> usize {
        for i in 0..limit {
            match unsafe { self.relaxed_poll() } {
                Some(value) => consumer(value),
                None => return i,
            }
        }

        limit
    }

    /// Calls `f` with the head value, spinning through a claimed but unwritten slot.
    ///
    /// # Safety
    ///
    /// The caller must be the only consumer.
    #[inline]
    pub unsafe fn peek_with<R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        let slot = self.head_slot(self.consumer.index.load_plain(), true)?;

        Some(f(unsafe { slot.value_ref() }))
    }

    /// Calls `f` with the head value if it is already written.
    ///
    /// # Safety
    ///
    /// The caller must be the only consumer.
    #[inline]
    pub unsafe fn relaxed_peek_with<R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        let slot = self.head_slot(self.consumer.index.load_plain(), false)?;

        Some(f(unsafe { slot.value_ref() }))
    }
}

impl<T> Drop for MPSCLinkedArrayQueue<T> {
    fn drop(&mut self) {
        unsafe { Chunk::free_chain(self.consumer.chunk.get()) };
    }
}

unsafe impl<T: Send> Send for MPSCLinkedArrayQueue<T> {}
unsafe impl<T: Send> Sync for MPSCLinkedArrayQueue<T> {}

multi_producer_handle!(MPSCLinkedArrayQueue, MPSCLinkedArrayProducer);
single_consumer_handle!(MPSCLinkedArrayQueue, MPSCLinkedArrayConsumer);

fn handles<T>(
    queue: MPSCLinkedArrayQueue<T>,
) -> (MPSCLinkedArrayProducer<T>, MPSCLinkedArrayConsumer<T>) {
    let queue = LightArc::new(queue);

    (
        MPSCLinkedArrayProducer::new(queue.clone()),
        MPSCLinkedArrayConsumer::new(queue),
    )
}

/// Creates a multi-producer, single-consumer queue of `initial_capacity` chunks that
/// holds up to `max_capacity` values.
///
/// See [`MPSCLinkedArrayQueue::new_chunked`] for the parameter rules.
///
/// # Examples
///
/// ```
/// use ferroq::{mpsc, Consumer, Producer};
///
/// let (mut producer, mut consumer) = mpsc::new_chunked(8, 64).unwrap();
///
/// for i in 0..64 {
///     producer.offer(i).unwrap();
/// }
///
/// assert_eq!(producer.offer(64), Err(64));
/// assert_eq!(consumer.poll(), Some(0));
/// ```
pub fn new_chunked<T>(
    initial_capacity: usize,
    max_capacity: usize,
) -> Result<(MPSCLinkedArrayProducer<T>, MPSCLinkedArrayConsumer<T>), QueueConfigError> {
    MPSCLinkedArrayQueue::new_chunked(initial_capacity, max_capacity).map(handles)
}

/// Creates a multi-producer, single-consumer queue whose chunks double from
/// `initial_capacity` up to `max_capacity`.
///
/// See [`MPSCLinkedArrayQueue::new_growable`] for the parameter rules.
pub fn new_growable<T>(
    initial_capacity: usize,
    max_capacity: usize,
) -> Result<(MPSCLinkedArrayProducer<T>, MPSCLinkedArrayConsumer<T>), QueueConfigError> {
    MPSCLinkedArrayQueue::new_growable(initial_capacity, max_capacity).map(handles)
}

/// Creates a multi-producer, single-consumer unbounded queue of `chunk_size` chunks.
pub fn new_unbounded<T>(
    chunk_size: usize,
) -> Result<(MPSCLinkedArrayProducer<T>, MPSCLinkedArrayConsumer<T>), QueueConfigError> {
    MPSCLinkedArrayQueue::new_unbounded(chunk_size).map(handles)
}
