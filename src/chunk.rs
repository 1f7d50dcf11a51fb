//! The chunk of the linked-array queues.
//!
//! A producer that runs out of room in its chunk links a new one and writes `JUMP` in
//! place of the value it put into the new chunk. The consumer follows the link when it
//! reads `JUMP` and frees the chunk it leaves: nobody else can reach it anymore.
use crate::access::Slot;
use crate::loom_bindings::sync::atomic::AtomicPtr;
use std::ptr;
use std::sync::atomic::Ordering::{Acquire, Relaxed, Release};

pub(crate) struct Chunk<T> {
    slots: Box<[Slot<T>]>,
    next: AtomicPtr<Chunk<T>>,
}

impl<T> Chunk<T> {
    /// Allocates a chunk of `len` empty slots.
    pub(crate) fn alloc(len: usize) -> *mut Self {
        Box::into_raw(Box::new(Self {
            slots: Slot::new_buffer(len),
            next: AtomicPtr::new(ptr::null_mut()),
        }))
    }

    #[inline(always)]
    pub(crate) fn len(&self) -> usize {
        self.slots.len()
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

    #[inline(always)]
    pub(crate) fn link(&self, next: *mut Self) {
        self.next.store(next, Release);
    }

    /// Frees the chunk, dropping the values left in it.
    ///
    /// # Safety
    ///
    /// `chunk` must come from [`Chunk::alloc`] and nobody may use it anymore.
    pub(crate) unsafe fn free(chunk: *mut Self) {
        drop(unsafe { Box::from_raw(chunk) });
    }

    /// Frees `first` and every chunk linked after it.
    ///
    /// # Safety
    ///
    /// Same as [`Chunk::free`], for every chunk of the chain.
    pub(crate) unsafe fn free_chain(first: *mut Self) {
        let mut chunk = first;

        while !chunk.is_null() {
            let next = unsafe { (*chunk).next.load(Relaxed) };

            unsafe { Self::free(chunk) };

            chunk = next;
        }
    }
}
