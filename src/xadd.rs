//! The chunk chain shared by the unbounded `Xadd` queues.
//!
//! Producers claim indices with a `fetch_add` and never wait for each other: the chunk of
//! index `i` is the chunk numbered `i >> chunk_shift`, so a producer that lands beyond the
//! last chunk appends the missing ones, and a producer that lags behind walks back over
//! `prev` links. Appending is serialized by swapping the producer chunk index to
//! `ROTATION` for the time it takes.
//!
//! Up to `max_pooled_chunks` chunks are pooled: the consumer hands a drained pooled chunk
//! back to a free list instead of dropping it, and producers take chunks from that list
//! before they allocate. Pooled chunks live as long as the queue. Other chunks are retired
//! through `crossbeam-epoch`, because lagging producers and racing consumers may still
//! read a chunk the consumer has just left.
use crate::access::{self, IndexAccess, Slot};
use crate::backoff::spin_until;
use crate::cache_padded::CachePadded;
use crate::config::round_capacity;
use crate::errors::QueueConfigError;
use crate::loom_bindings::hint::spin_loop;
use crate::loom_bindings::sync::atomic::{AtomicI64, AtomicPtr, AtomicU64};
use crate::spsc::SPSCBoundedQueue;
use crossbeam_epoch::Guard;
use std::ptr;
use std::sync::atomic::Ordering::{Acquire, Relaxed, Release};

/// The chunk index of a pooled chunk that was never used.
pub(crate) const NOT_USED: i64 = -1;
/// The producer chunk index while a producer appends chunks.
const ROTATION: i64 = -2;

/// How many pooled chunks [`mpsc::new_xadd`](crate::mpsc::new_xadd) and
/// [`mpmc::new_xadd`](crate::mpmc::new_xadd) use when asked for the default.
pub const DEFAULT_MAX_POOLED_CHUNKS: usize = 2;

/// One chunk of an `Xadd` queue.
///
/// A pooled chunk of a multi-consumer queue carries a sequence per slot: the number of
/// the chunk the slot value was written for. A reused chunk may still hold the value of
/// an earlier lap that a slow consumer has claimed but not yet taken.
pub(crate) struct XaddChunk<T> {
    slots: Box<[Slot<T>]>,
    sequences: Option<Box<[AtomicI64]>>,
    pooled: bool,
    index: AtomicI64,
    prev: AtomicPtr<XaddChunk<T>>,
    next: AtomicPtr<XaddChunk<T>>,
}

impl<T> XaddChunk<T> {
    fn alloc(
        index: i64,
        prev: *mut Self,
        len: usize,
        pooled: bool,
        sequenced: bool,
    ) -> *mut Self {
        let sequences =
            (pooled && sequenced).then(|| (0..len).map(|_| AtomicI64::new(NOT_USED)).collect());

        Box::into_raw(Box::new(Self {
            slots: Slot::new_buffer(len),
            sequences,
            pooled,
            index: AtomicI64::new(index),
            prev: AtomicPtr::new(prev),
            next: AtomicPtr::new(ptr::null_mut()),
        }))
    }

    /// # Safety
    ///
    /// `chunk` must come from [`XaddChunk::alloc`] and nobody may use it anymore.
    unsafe fn free(chunk: *mut Self) {
        drop(unsafe { Box::from_raw(chunk) });
    }

    #[inline(always)]
    pub(crate) fn is_pooled(&self) -> bool {
        self.pooled
    }

    #[inline(always)]
    pub(crate) fn index(&self) -> i64 {
        self.index.load(Acquire)
    }

    #[inline(always)]
    pub(crate) fn slot(&self, offset: usize) -> &Slot<T> {
        debug_assert!(offset < self.slots.len());

        unsafe { self.slots.get_unchecked(offset) }
    }

    #[inline(always)]
    pub(crate) fn next(&self) -> *mut Self {
        self.next.load(Acquire)
    }

    /// Returns the chunk number the value at `offset` was written for.
    ///
    /// Only pooled chunks of a multi-consumer queue have sequences.
    #[inline(always)]
    pub(crate) fn sequence(&self, offset: usize) -> i64 {
        match &self.sequences {
            Some(sequences) => sequences[offset].load(Acquire),
            None => {
                debug_assert!(false, "the chunk has no sequences");

                NOT_USED
            }
        }
    }

    #[inline(always)]
    pub(crate) fn set_sequence(&self, offset: usize, chunk_index: i64) {
        if let Some(sequences) = &self.sequences {
            sequences[offset].store(chunk_index, Release);
        }
    }

    pub(crate) fn spin_for_sequence(&self, offset: usize, chunk_index: i64) {
        spin_until(|| (self.sequence(offset) == chunk_index).then_some(()));
    }

    /// Spins until the slot at `offset` holds a value.
    pub(crate) fn spin_for_value(&self, offset: usize) {
        let slot = self.slot(offset);

        spin_until(|| slot.is_filled().then_some(()));
    }

    /// Spins until a slow consumer of an earlier lap took the value at `offset`.
    pub(crate) fn spin_for_empty(&self, offset: usize) {
        let slot = self.slot(offset);

        spin_until(|| slot.is_empty().then_some(()));
    }

    /// Spins until a producer links the next chunk.
    pub(crate) fn spin_for_next(&self) -> *mut Self {
        spin_until(|| {
            let next = self.next();

            (!next.is_null()).then_some(next)
        })
    }
}

struct ProducerChunk<T> {
    chunk: AtomicPtr<XaddChunk<T>>,
    index: AtomicI64,
}

/// The indices, the chunk chain and the free list of an `Xadd` queue.
///
/// The queue types wrap it and add the consumer protocol of their cardinality.
pub(crate) struct XaddCore<T> {
    pub(crate) producer_index: CachePadded<AtomicU64>,
    producer_chunk: CachePadded<ProducerChunk<T>>,
    pub(crate) consumer_index: CachePadded<AtomicU64>,
    consumer_chunk: CachePadded<AtomicPtr<XaddChunk<T>>>,
    chunk_mask: usize,
    chunk_shift: u32,
    free_chunks: SPSCBoundedQueue<*mut XaddChunk<T>>,
    pooled_chunks: Box<[*mut XaddChunk<T>]>,
}

impl<T> XaddCore<T> {
    /// Creates the chain with its first chunk and fills the free list.
    ///
    /// `sequenced` chunks carry the per-slot sequences multiple consumers need.
    pub(crate) fn new(
        chunk_size: usize,
        max_pooled_chunks: usize,
        sequenced: bool,
    ) -> Result<Self, QueueConfigError> {
        let chunk_size = round_capacity(chunk_size, 2)?;
        let free_chunks = SPSCBoundedQueue::new(max_pooled_chunks.max(1))?;
        let first = XaddChunk::alloc(
            0,
            ptr::null_mut(),
            chunk_size,
            max_pooled_chunks > 0,
            sequenced,
        );
        let mut pooled_chunks = Vec::with_capacity(max_pooled_chunks);

        if max_pooled_chunks > 0 {
            pooled_chunks.push(first);
        }

        for _ in 1..max_pooled_chunks {
            let chunk = XaddChunk::alloc(NOT_USED, ptr::null_mut(), chunk_size, true, sequenced);

            pooled_chunks.push(chunk);

            let pooled = unsafe { free_chunks.offer(chunk) };

            debug_assert!(pooled.is_ok());
        }

        tracing::debug!(chunk_size, max_pooled_chunks, "created the chunk pool");

        Ok(Self {
            producer_index: CachePadded::new(AtomicU64::new(0)),
            producer_chunk: CachePadded::new(ProducerChunk {
                chunk: AtomicPtr::new(first),
                index: AtomicI64::new(0),
            }),
            consumer_index: CachePadded::new(AtomicU64::new(0)),
            consumer_chunk: CachePadded::new(AtomicPtr::new(first)),
            chunk_mask: chunk_size - 1,
            chunk_shift: chunk_size.trailing_zeros(),
            free_chunks,
            pooled_chunks: pooled_chunks.into_boxed_slice(),
        })
    }

    #[inline(always)]
    pub(crate) fn chunk_size(&self) -> usize {
        self.chunk_mask + 1
    }

    /// Returns the offset in its chunk and the chunk number of `index`.
    #[inline(always)]
    #[allow(
        clippy::cast_possible_wrap,
        reason = "A chunk number never reaches 2^63."
    )]
    pub(crate) fn locate(&self, index: u64) -> (usize, i64) {
        (
            access::offset(index, self.chunk_mask),
            (index >> self.chunk_shift) as i64,
        )
    }

    pub(crate) fn len(&self) -> usize {
        access::size(&self.consumer_index, &self.producer_index, 0, None)
    }

    pub(crate) fn is_empty(&self) -> bool {
        access::is_empty(&self.consumer_index, &self.producer_index)
    }

    #[inline(always)]
    pub(crate) fn consumer_chunk(&self) -> *mut XaddChunk<T> {
        self.consumer_chunk.load(Acquire)
    }
}

// Producer
impl<T> XaddCore<T> {
    /// Returns the chunk numbered `chunk_index`, appending chunks if it doesn't exist yet.
    ///
    /// # Safety
    ///
    /// The caller must be pinned and must have claimed an index in that chunk, so the
    /// consumer can't have left it.
    pub(crate) unsafe fn producer_chunk_for(
        &self,
        cached: *mut XaddChunk<T>,
        chunk_index: i64,
    ) -> *mut XaddChunk<T> {
        let chunk = if cached.is_null() {
            self.producer_chunk.chunk.load(Acquire)
        } else {
            cached
        };

        if unsafe { (*chunk).index() } == chunk_index {
            return chunk;
        }

        unsafe { self.chase_producer_chunk(chunk, chunk_index) }
    }

    /// # Safety
    ///
    /// Same as [`XaddCore::producer_chunk_for`].
    unsafe fn chase_producer_chunk(
        &self,
        initial: *mut XaddChunk<T>,
        chunk_index: i64,
    ) -> *mut XaddChunk<T> {
        let mut current = initial;
        let jump_backward = loop {
            if current.is_null() {
                spin_loop();

                current = self.producer_chunk.chunk.load(Acquire);
            }

            let current_index = unsafe { (*current).index() };

            debug_assert_ne!(current_index, NOT_USED);

            let jump_backward = current_index - chunk_index;

            if jump_backward >= 0 {
                break jump_backward;
            }

            // Only the producer that sees the last chunk appends; the others reload.
            current = if self.producer_chunk.index.load_volatile() == current_index {
                unsafe { self.append_next_chunks(current, current_index, -jump_backward) }
            } else {
                ptr::null_mut()
            };
        };

        for _ in 0..jump_backward {
            current = unsafe { (*current).prev.load(Acquire) };

            debug_assert!(!current.is_null());
        }

        current
    }

    /// Appends `count` chunks after `current`, or returns null if another producer is
    /// appending.
    ///
    /// # Safety
    ///
    /// `current` must be the producer chunk numbered `current_index`.
    unsafe fn append_next_chunks(
        &self,
        mut current: *mut XaddChunk<T>,
        current_index: i64,
        count: i64,
    ) -> *mut XaddChunk<T> {
        if !self.producer_chunk.index.cas(current_index, ROTATION) {
            return ptr::null_mut();
        }

        tracing::trace!(count, from = current_index, "appending chunks");

        for i in 1..=count {
            let new_chunk = self.new_or_pooled_chunk(current, current_index + i);

            self.producer_chunk.chunk.store(new_chunk, Release);
            unsafe { (*current).next.store(new_chunk, Release) };

            current = new_chunk;
        }

        self.producer_chunk.index.store_volatile(current_index + count);

        current
    }

    /// Called only by the producer that holds `ROTATION`, the only one polling the free
    /// list.
    fn new_or_pooled_chunk(&self, prev: *mut XaddChunk<T>, index: i64) -> *mut XaddChunk<T> {
        match unsafe { self.free_chunks.poll() } {
            Some(chunk) => {
                tracing::trace!(index, "reusing a pooled chunk");

                unsafe {
                    (*chunk).prev.store(prev, Release);
                    (*chunk).index.store(index, Release);
                }

                chunk
            }
            None => {
                tracing::trace!(index, "allocating a chunk");

                XaddChunk::alloc(index, prev, self.chunk_size(), false, false)
            }
        }
    }
}

// Consumer
impl<T> XaddCore<T> {
    /// Makes `next` the consumer chunk and recycles or retires `current`.
    ///
    /// # Safety
    ///
    /// Only the consumer that claimed the first index of `next` may call it, with every
    /// index of `current` already claimed.
    pub(crate) unsafe fn move_to_next_consumer_chunk(
        &self,
        current: *mut XaddChunk<T>,
        next: *mut XaddChunk<T>,
        guard: &Guard,
    ) {
        unsafe {
            (*current).next.store(ptr::null_mut(), Release);
            (*next).prev.store(ptr::null_mut(), Release);
        }

        let pooled = unsafe { (*current).is_pooled() };

        if pooled {
            tracing::trace!("recycling a pooled chunk");

            // Consumers hand chunks back one at a time: each move follows the previous
            // one through the consumer chunk.
            let recycled = unsafe { self.free_chunks.offer(current) };

            debug_assert!(recycled.is_ok());
        }

        self.consumer_chunk.store(next, Release);

        if !pooled {
            unsafe { guard.defer_unchecked(move || XaddChunk::free(current)) };
        }
    }
}

impl<T> Drop for XaddCore<T> {
    fn drop(&mut self) {
        let mut chunk = self.consumer_chunk.load(Relaxed);

        while !chunk.is_null() {
            unsafe {
                let next = (*chunk).next.load(Relaxed);

                if !(*chunk).pooled {
                    XaddChunk::free(chunk);
                }

                chunk = next;
            }
        }

        for &chunk in &*self.pooled_chunks {
            unsafe { XaddChunk::free(chunk) };
        }
    }
}
