//! This module provides the single-producer, single-consumer queues of linked chunks.
use crate::access::{self, offset, IndexAccess, Slot, FILLED, JUMP};
use crate::cache_padded::CachePadded;
use crate::chunk::Chunk;
use crate::config::{check_chunk_below, round_capacity};
use crate::errors::QueueConfigError;
use crate::handles::{single_consumer_handle, single_producer_handle};
use crate::hints::unlikely;
use crate::light_arc::LightArc;
use crate::loom_bindings::sync::atomic::AtomicU64;
use std::cell::Cell;

/// The longest run of slots the producer claims with one look-ahead.
const MAX_LOOK_AHEAD_STEP: u64 = 4096;

/// How the queue grows once the producer chunk is full.
#[derive(Clone, Copy)]
enum Growth {
    /// Links a chunk of the same size, without limit.
    Unbounded,
    /// Links a chunk of the same size while fewer than `max_capacity` values are queued.
    Chunked { max_capacity: u64, queue_limit: u64 },
    /// Links a chunk twice as large until a chunk of `max_capacity` slots is reached.
    ///
    /// A negative `look_ahead_step` means the producer has reached the largest chunk while
    /// the consumer still reads older ones; it counts the values in those older chunks.
    Growable { max_capacity: u64, look_ahead_step: i64 },
}

struct ProducerFields<T> {
    index: AtomicU64,
    chunk: Cell<*mut Chunk<T>>,
    mask: Cell<usize>,
    /// Every index below it is known to be writable in `chunk`.
    chunk_limit: Cell<u64>,
    growth: Cell<Growth>,
}

struct ConsumerFields<T> {
    index: AtomicU64,
    chunk: Cell<*mut Chunk<T>>,
    mask: Cell<usize>,
}

/// The single-producer, single-consumer queue of linked ring chunks.
///
/// Within a chunk it works like [`SPSCBoundedQueue`](crate::spsc::SPSCBoundedQueue).
/// When the producer finds the chunk full, it writes the value into a new chunk, links
/// it and marks the slot of the value in the old chunk as `JUMP`. The consumer follows the link
/// when it reads `JUMP` and frees the old chunk.
///
/// It comes in three flavors:
///
/// * [`new_chunked`]: chunks of one size up to a maximum capacity.
/// * [`new_growable`]: every new chunk doubles, up to a chunk of the maximum capacity.
/// * [`new_unbounded`]: chunks of one size without limit.
#[repr(C)]
pub struct SPSCLinkedArrayQueue<T> {
    producer: CachePadded<ProducerFields<T>>,
    consumer: CachePadded<ConsumerFields<T>>,
    capacity: Option<usize>,
}

impl<T> SPSCLinkedArrayQueue<T> {
    fn with_first_chunk(len: usize, growth: Growth, capacity: Option<usize>) -> Self {
        let chunk = Chunk::alloc(len);
        let mask = len - 1;

        Self {
            producer: CachePadded::new(ProducerFields {
                index: AtomicU64::new(0),
                chunk: Cell::new(chunk),
                mask: Cell::new(mask),
                // The first chunk is empty.
                chunk_limit: Cell::new(mask as u64 - 1),
                growth: Cell::new(growth),
            }),
            consumer: CachePadded::new(ConsumerFields {
                index: AtomicU64::new(0),
                chunk: Cell::new(chunk),
                mask: Cell::new(mask),
            }),
            capacity,
        }
    }

    /// Creates a queue of `chunk_size` chunks that holds up to `capacity` values.
    ///
    /// The capacity must be at least 16 and the chunk at least 8. Both are rounded up to
    /// a power of two, and the chunk must stay below the capacity.
    pub fn new_chunked(chunk_size: usize, capacity: usize) -> Result<Self, QueueConfigError> {
        let capacity = round_capacity(capacity, 16)?;
        let chunk = round_capacity(chunk_size, 8)?;

        check_chunk_below(chunk, capacity)?;

        Ok(Self::with_first_chunk(
            chunk,
            Growth::Chunked {
                max_capacity: capacity as u64,
                queue_limit: capacity as u64,
            },
            Some(capacity),
        ))
    }

    /// Creates a queue that starts with a `chunk_size` chunk and doubles it up to
    /// `capacity`.
    ///
    /// The parameters follow the rules of [`new_chunked`](Self::new_chunked).
    pub fn new_growable(chunk_size: usize, capacity: usize) -> Result<Self, QueueConfigError> {
        let capacity = round_capacity(capacity, 16)?;
        let chunk = round_capacity(chunk_size, 8)?;

        check_chunk_below(chunk, capacity)?;

        Ok(Self::with_first_chunk(
            chunk,
            Growth::Growable {
                max_capacity: capacity as u64,
                look_ahead_step: look_ahead_step(chunk as u64),
            },
            Some(capacity),
        ))
    }

    /// Creates an unbounded queue of `chunk_size` chunks, raised to at least 16 and
    /// rounded up to a power of two.
    pub fn new_unbounded(chunk_size: usize) -> Result<Self, QueueConfigError> {
        let chunk = round_capacity(chunk_size.max(16), 16)?;

        Ok(Self::with_first_chunk(chunk, Growth::Unbounded, None))
    }

    /// Returns the maximum capacity, or `None` if the queue is unbounded.
    #[inline]
    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Returns the number of values in the queue.
    #[inline]
    pub fn len(&self) -> usize {
        access::size(&self.consumer.index, &self.producer.index, 0, self.capacity)
    }

    /// Returns whether the queue is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        access::is_empty(&self.consumer.index, &self.producer.index)
    }

    /// Returns how many values have been offered so far.
    pub fn current_producer_index(&self) -> u64 {
        self.producer.index.load_volatile()
    }

    /// Returns how many values have been polled so far.
    pub fn current_consumer_index(&self) -> u64 {
        self.consumer.index.load_volatile()
    }
}

#[allow(
    clippy::cast_possible_wrap,
    reason = "A look-ahead step is at most `MAX_LOOK_AHEAD_STEP`."
)]
fn look_ahead_step(chunk_len: u64) -> i64 {
    (chunk_len / 4).min(MAX_LOOK_AHEAD_STEP) as i64
}

// Producer
impl<T> SPSCLinkedArrayQueue<T> {
    #[inline(always)]
    fn producer_slot(&self, chunk: *mut Chunk<T>, index: u64, mask: usize) -> &Slot<T> {
        // The producer chunk lives until the consumer leaves it, which is after the
        // producer left it.
        unsafe { (*chunk).slot(offset(index, mask)) }
    }

    #[inline(always)]
    fn write(&self, slot: &Slot<T>, index: u64, value: T) {
        unsafe { slot.write(value) };
        self.producer.index.store_ordered(index + 1);
    }

    /// Writes the value of `index` into a new chunk of `len` slots and links it.
    ///
    /// The value is written first and `JUMP` last, so a consumer that reads `JUMP` finds
    /// both the link and the value.
    fn link_new_chunk(
        &self,
        old: *mut Chunk<T>,
        old_mask: usize,
        index: u64,
        len: usize,
        value: T,
    ) {
        let new = Chunk::alloc(len);
        let new_mask = len - 1;

        tracing::trace!(len, index, "linking a new chunk");

        self.producer.chunk.set(new);
        self.producer.mask.set(new_mask);

        unsafe {
            (*new).slot(offset(index, new_mask)).write(value);
            (*old).link(new);
            (*old).slot(offset(index, old_mask)).mark_jump();
        }

        self.producer.index.store_ordered(index + 1);
    }

    /// Writes the value when `index` reached the chunk limit. Returns the value getter back
    /// if the queue is full.
    fn offer_cold_path<F: FnOnce() -> T>(&self, index: u64, value: F) -> Result<(), F> {
        let chunk = self.producer.chunk.get();
        let mask = self.producer.mask.get();
        let slot = self.producer_slot(chunk, index, mask);
        let chunk_len = mask as u64 + 1;

        match self.producer.growth.get() {
            Growth::Unbounded => {
                let chunk_limit = index + chunk_len / 4;

                if self.producer_slot(chunk, chunk_limit, mask).is_empty() {
                    self.producer.chunk_limit.set(chunk_limit - 1);
                    self.write(slot, index, value());
                } else if self.producer_slot(chunk, index + 1, mask).is_empty() {
                    self.write(slot, index, value());
                } else {
                    self.producer.chunk_limit.set(index + mask as u64 - 1);
                    self.link_new_chunk(chunk, mask, index, mask + 1, value());
                }
            }
            Growth::Chunked {
                max_capacity,
                mut queue_limit,
            } => {
                if index >= queue_limit {
                    queue_limit = self.consumer.index.load_volatile() + max_capacity;
                    self.producer.growth.set(Growth::Chunked {
                        max_capacity,
                        queue_limit,
                    });

                    if index >= queue_limit {
                        return Err(value);
                    }
                }

                let chunk_limit = (index + chunk_len / 4).min(queue_limit);

                if chunk_limit > index + 1
                    && self.producer_slot(chunk, chunk_limit, mask).is_empty()
                {
                    self.producer.chunk_limit.set(chunk_limit - 1);
                    self.write(slot, index, value());
                } else if self.producer_slot(chunk, index + 1, mask).is_empty() {
                    self.write(slot, index, value());
                } else {
                    self.link_new_chunk(chunk, mask, index, mask + 1, value());
                }
            }
            Growth::Growable {
                max_capacity,
                look_ahead_step: step,
            } => {
                return self.offer_cold_path_growable(index, max_capacity, step, value);
            }
        }

        Ok(())
    }

    #[allow(
        clippy::cast_possible_wrap,
        clippy::cast_sign_loss,
        clippy::cast_possible_truncation,
        reason = "The distances are bounded by the maximum capacity."
    )]
    fn offer_cold_path_growable<F: FnOnce() -> T>(
        &self,
        index: u64,
        max_capacity: u64,
        step: i64,
        value: F,
    ) -> Result<(), F> {
        let chunk = self.producer.chunk.get();
        let mask = self.producer.mask.get();
        let slot = self.producer_slot(chunk, index, mask);
        let chunk_len = mask as u64 + 1;
        let set_step = |look_ahead_step| {
            self.producer.growth.set(Growth::Growable {
                max_capacity,
                look_ahead_step,
            });
        };

        if step <= 0 {
            // The producer is on the largest chunk while the consumer may still be on an
            // older one: the consumer index, not the slots, tells how much room is left.
            let values_in_older_chunks = (-step) as u64;
            let consumer_index = self.consumer.index.load_volatile();

            if index - consumer_index == chunk_len {
                return Err(value);
            }

            let first_index_in_chunk =
                self.producer.chunk_limit.get() - chunk_len + values_in_older_chunks;

            if consumer_index >= first_index_in_chunk {
                set_step(look_ahead_step(chunk_len));
            } else {
                set_step(consumer_index as i64 - first_index_in_chunk as i64);
            }

            self.producer.chunk_limit.set(consumer_index + chunk_len);
            self.write(slot, index, value());

            return Ok(());
        }

        if self.producer_slot(chunk, index + step as u64, mask).is_empty() {
            self.producer.chunk_limit.set(index + step as u64 - 1);
            self.write(slot, index, value());

            return Ok(());
        }

        if chunk_len == max_capacity {
            if !slot.is_empty() {
                return Err(value);
            }

            self.write(slot, index, value());

            return Ok(());
        }

        if self.producer_slot(chunk, index + 1, mask).is_empty() {
            self.write(slot, index, value());

            return Ok(());
        }

        let new_len = chunk_len * 2;

        self.link_new_chunk(chunk, mask, index, new_len as usize, value());

        if new_len == max_capacity {
            let consumer_index = self.consumer.index.load_volatile();

            set_step(-((index - consumer_index) as i64));
            self.producer.chunk_limit.set(consumer_index + max_capacity);
        } else {
            self.producer.chunk_limit.set(index + new_len - 2);
            set_step(look_ahead_step(new_len));
        }

        Ok(())
    }

    /// Pushes a value or returns it back if the queue is full.
    ///
    /// # Safety
    ///
    /// The caller must be the only producer.
    #[inline]
    pub unsafe fn offer(&self, value: T) -> Result<(), T> {
        let index = self.producer.index.load_plain();

        if unlikely(index >= self.producer.chunk_limit.get()) {
            return self.offer_cold_path(index, move || value).map_err(|value| value());
        }

        let slot = self.producer_slot(
            self.producer.chunk.get(),
            index,
            self.producer.mask.get(),
        );

        self.write(slot, index, value);

        Ok(())
    }

    /// Same as [`offer`](Self::offer).
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
        for i in 0..limit {
            // A new chunk may be linked on every iteration.
            let index = self.producer.index.load_plain();

            if index < self.producer.chunk_limit.get() {
                let slot = self.producer_slot(
                    self.producer.chunk.get(),
                    index,
                    self.producer.mask.get(),
                );

                self.write(slot, index, supplier());
            } else if self.offer_cold_path(index, &mut supplier).is_err() {
                return i;
            }
        }

        limit
    }
}

// Consumer
impl<T> SPSCLinkedArrayQueue<T> {
    /// Returns the head slot, following a `JUMP` to the next chunk.
    fn head_slot(&self, index: u64) -> Option<&Slot<T>> {
        let chunk = self.consumer.chunk.get();
        let slot = unsafe { (*chunk).slot(offset(index, self.consumer.mask.get())) };

        match slot.state() {
            FILLED => Some(slot),
            JUMP => Some(unsafe { self.move_to_next_chunk(chunk, index) }),
            _ => None,
        }
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

        // The producer has left the chunk, and every value in it is polled.
        unsafe { Chunk::free(chunk) };

        let mask = unsafe { (*next).len() } - 1;

        self.consumer.chunk.set(next);
        self.consumer.mask.set(mask);

        let slot = unsafe { (*next).slot(offset(index, mask)) };

        debug_assert!(slot.is_filled());

        slot
    }

    /// Pops the head value.
    ///
    /// # Safety
    ///
    /// The caller must be the only consumer.
    #[inline]
    pub unsafe fn poll(&self) -> Option<T> {
        let index = self.consumer.index.load_plain();
        let slot = self.head_slot(index)?;

        // The slot is cleared before the index moves, the producer of the largest chunk
        // relies on it.
        let value = unsafe { slot.take() };

        self.consumer.index.store_ordered(index + 1);

        Some(value)
    }

    /// Same as [`poll`](Self::poll).
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
        for i in 0..limit {
            match unsafe { self.poll() } {
                Some(value) => consumer(value),
                None => return i,
            }
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
        let slot = self.head_slot(self.consumer.index.load_plain())?;

        Some(f(unsafe { slot.value_ref() }))
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

impl<T> Drop for SPSCLinkedArrayQueue<T> {
    fn drop(&mut self) {
        unsafe { Chunk::free_chain(self.consumer.chunk.get()) };
    }
}

unsafe impl<T: Send> Send for SPSCLinkedArrayQueue<T> {}
unsafe impl<T: Send> Sync for SPSCLinkedArrayQueue<T> {}

single_producer_handle!(SPSCLinkedArrayQueue, SPSCLinkedArrayProducer);
single_consumer_handle!(SPSCLinkedArrayQueue, SPSCLinkedArrayConsumer);

fn handles<T>(
    queue: SPSCLinkedArrayQueue<T>,
) -> (SPSCLinkedArrayProducer<T>, SPSCLinkedArrayConsumer<T>) {
    let queue = LightArc::new(queue);

    (
        SPSCLinkedArrayProducer::new(queue.clone()),
        SPSCLinkedArrayConsumer::new(queue),
    )
}

/// Creates a single-producer, single-consumer queue of `chunk_size` chunks that holds
/// up to `capacity` values.
///
/// See [`SPSCLinkedArrayQueue::new_chunked`] for the parameter rules.
///
/// # Examples
///
/// ```
/// use ferroq::{spsc, Consumer, Producer};
///
/// let (mut producer, mut consumer) = spsc::new_chunked(8, 16).unwrap();
///
/// assert_eq!(producer.fill(|| 1, 32), 16);
/// assert_eq!(consumer.drain_all(drop), 16);
/// ```
pub fn new_chunked<T>(
    chunk_size: usize,
    capacity: usize,
) -> Result<(SPSCLinkedArrayProducer<T>, SPSCLinkedArrayConsumer<T>), QueueConfigError> {
    SPSCLinkedArrayQueue::new_chunked(chunk_size, capacity).map(handles)
}

/// Creates a single-producer, single-consumer queue whose chunks double from
/// `chunk_size` up to `capacity`.
///
/// See [`SPSCLinkedArrayQueue::new_growable`] for the parameter rules.
pub fn new_growable<T>(
    chunk_size: usize,
    capacity: usize,
) -> Result<(SPSCLinkedArrayProducer<T>, SPSCLinkedArrayConsumer<T>), QueueConfigError> {
    SPSCLinkedArrayQueue::new_growable(chunk_size, capacity).map(handles)
}

/// Creates a single-producer, single-consumer unbounded queue of `chunk_size` chunks.
///
/// # Examples
///
/// ```
/// use ferroq::{spsc, Consumer, Producer};
///
/// let (mut producer, mut consumer) = spsc::new_unbounded(16).unwrap();
///
/// for i in 0..100 {
///     producer.offer(i).unwrap();
/// }
///
/// assert_eq!(consumer.len(), 100);
/// assert_eq!(consumer.poll(), Some(0));
/// ```
pub fn new_unbounded<T>(
    chunk_size: usize,
) -> Result<(SPSCLinkedArrayProducer<T>, SPSCLinkedArrayConsumer<T>), QueueConfigError> {
    SPSCLinkedArrayQueue::new_unbounded(chunk_size).map(handles)
}
