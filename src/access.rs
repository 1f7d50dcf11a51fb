//! The memory-access substrate every queue is built from.
//!
//! It provides:
//!
//! * [`IndexAccess`]: loads, stores and compare-and-swaps of an index field with a
//!   selectable ordering strength.
//! * [`Slot`]: one element cell of a backing array with an explicit `EMPTY`/`FILLED`/`JUMP`
//!   state that stands in for a nullable reference.
//! * [`offset`] and [`size`]: the index arithmetic shared by every index-based queue.
use crate::loom_bindings::sync::atomic::{fence, AtomicI64, AtomicU64, AtomicU8, AtomicUsize};
use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::ptr;
use std::sync::atomic::Ordering::{Acquire, Relaxed, Release, SeqCst};

/// Loads, stores and compare-and-swaps an index field.
///
/// The names follow the ordering strength:
///
/// * `plain`: no ordering. Only the sole writer of the field may rely on what it reads.
/// * `ordered`: a release store. Everything written before it is visible to a thread
///   that observes the stored value.
/// * `volatile`: a sequentially consistent access, used when the competing side must see
///   the freshest value.
/// * `cas` and `get_and_add`: atomic read-modify-writes, the only way two threads may
///   contend for the same index.
pub(crate) trait IndexAccess {
    type Value: Copy;

    fn load_plain(&self) -> Self::Value;

    fn load_volatile(&self) -> Self::Value;

    fn store_plain(&self, value: Self::Value);

    fn store_ordered(&self, value: Self::Value);

    fn store_volatile(&self, value: Self::Value);

    fn cas(&self, expected: Self::Value, new: Self::Value) -> bool;

    fn get_and_add(&self, delta: Self::Value) -> Self::Value;
}

macro_rules! impl_index_access {
    ($atomic:ty, $value:ty) => {
        impl IndexAccess for $atomic {
            type Value = $value;

            #[inline(always)]
            fn load_plain(&self) -> $value {
                self.load(Relaxed)
            }

            #[inline(always)]
            fn load_volatile(&self) -> $value {
                self.load(SeqCst)
            }

            #[inline(always)]
            fn store_plain(&self, value: $value) {
                self.store(value, Relaxed);
            }

            #[inline(always)]
            fn store_ordered(&self, value: $value) {
                self.store(value, Release);
            }

            #[inline(always)]
            fn store_volatile(&self, value: $value) {
                self.store(value, SeqCst);
            }

            #[inline(always)]
            fn cas(&self, expected: $value, new: $value) -> bool {
                self.compare_exchange(expected, new, SeqCst, Relaxed).is_ok()
            }

            #[inline(always)]
            fn get_and_add(&self, delta: $value) -> $value {
                self.fetch_add(delta, SeqCst)
            }
        }
    };
}

impl_index_access!(AtomicU64, u64);
impl_index_access!(AtomicI64, i64);
impl_index_access!(AtomicUsize, usize);

/// Returns the position of the logical `index` in a power-of-two array.
#[inline(always)]
#[allow(
    clippy::cast_possible_truncation,
    reason = "The mask is a usize, so the masked index fits it."
)]
pub(crate) fn offset(index: u64, mask: usize) -> usize {
    (index & mask as u64) as usize
}

/// Returns a best-effort size from a pair of monotonic indices.
///
/// The consumer index is read before and after the producer index until both reads
/// agree, so the pair belongs to one instant of the consumer. The result is divided by
/// `1 << divisor_shift` for queues that count in steps of two, and is clamped to
/// `0..=capacity`.
#[inline]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss,
    reason = "Indices are interpreted as a signed distance first."
)]
pub(crate) fn size(
    consumer_index: &AtomicU64,
    producer_index: &AtomicU64,
    divisor_shift: u32,
    capacity: Option<usize>,
) -> usize {
    let mut after = consumer_index.load_volatile();
    let distance = loop {
        let before = after;
        let current_producer_index = producer_index.load_volatile();

        after = consumer_index.load_volatile();

        if before == after {
            break current_producer_index.wrapping_sub(after) as i64 >> divisor_shift;
        }
    };

    if distance < 0 {
        return 0;
    }

    let size = distance as u64 as usize;

    match capacity {
        Some(capacity) if size > capacity => capacity,
        _ => size,
    }
}

/// Returns whether a queue with these indices is empty.
#[inline]
pub(crate) fn is_empty(consumer_index: &AtomicU64, producer_index: &AtomicU64) -> bool {
    consumer_index.load_volatile() >= producer_index.load_volatile()
}

pub(crate) const EMPTY: u8 = 0;
pub(crate) const FILLED: u8 = 1;
/// Written by a linked-array producer in place of an element when it moved on to the
/// next chunk.
pub(crate) const JUMP: u8 = 2;

/// One element cell of a backing array.
///
/// The state is the publication point: the value is written before a release store of
/// `FILLED` and read after an acquire load of it. Whoever holds the right to the slot
/// (a claimed index, a sequence match or the sole-writer role) is the only one touching
/// the value.
pub(crate) struct Slot<T> {
    state: AtomicU8,
    value: UnsafeCell<MaybeUninit<T>>,
}

impl<T> Slot<T> {
    /// Creates an `EMPTY` slot.
    pub(crate) fn new() -> Self {
        Self {
            state: AtomicU8::new(EMPTY),
            value: UnsafeCell::new(MaybeUninit::uninit()),
        }
    }

    /// Allocates a buffer of `EMPTY` slots.
    pub(crate) fn new_buffer(len: usize) -> Box<[Self]> {
        (0..len).map(|_| Self::new()).collect()
    }

    /// Returns the state with an acquire load.
    #[inline(always)]
    pub(crate) fn state(&self) -> u8 {
        self.state.load(Acquire)
    }

    /// Returns the state without ordering.
    #[inline(always)]
    pub(crate) fn state_plain(&self) -> u8 {
        self.state.load(Relaxed)
    }

    #[inline(always)]
    pub(crate) fn is_filled(&self) -> bool {
        self.state() == FILLED
    }

    #[inline(always)]
    pub(crate) fn is_empty(&self) -> bool {
        self.state() == EMPTY
    }

    /// Writes the value and publishes it.
    ///
    /// # Safety
    ///
    /// The caller must own the slot and it must not hold a value.
    #[inline(always)]
    pub(crate) unsafe fn write(&self, value: T) {
        debug_assert_ne!(self.state_plain(), FILLED);

        unsafe { (*self.value.get()).write(value) };

        self.state.store(FILLED, Release);
    }

    /// Moves the value out and publishes the slot as `EMPTY`.
    ///
    /// # Safety
    ///
    /// The caller must own the slot and must have observed it `FILLED`.
    #[inline(always)]
    pub(crate) unsafe fn take(&self) -> T {
        debug_assert_eq!(self.state_plain(), FILLED);

        let value = unsafe { (*self.value.get()).assume_init_read() };

        self.state.store(EMPTY, Release);

        value
    }

    /// Moves the value out without publishing the slot as `EMPTY`.
    ///
    /// The caller publishes the slot through another field (a sequence or an index)
    /// and must call [`Slot::forget`] before that.
    ///
    /// # Safety
    ///
    /// Same as [`Slot::take`].
    #[inline(always)]
    pub(crate) unsafe fn read(&self) -> T {
        debug_assert_eq!(self.state_plain(), FILLED);

        unsafe { (*self.value.get()).assume_init_read() }
    }

    /// Marks a slot whose value was moved out by [`Slot::read`] as `EMPTY` without ordering.
    #[inline(always)]
    pub(crate) fn forget(&self) {
        self.state.store(EMPTY, Relaxed);
    }

    /// Writes `JUMP`.
    #[inline(always)]
    pub(crate) fn mark_jump(&self) {
        debug_assert_ne!(self.state_plain(), FILLED);

        self.state.store(JUMP, Release);
    }

    /// Returns a reference to the value.
    ///
    /// # Safety
    ///
    /// The slot must be `FILLED` and nobody may take the value while the reference lives.
    #[inline(always)]
    pub(crate) unsafe fn value_ref(&self) -> &T {
        unsafe { (*self.value.get()).assume_init_ref() }
    }

    /// Copies the bytes of the value without claiming the slot.
    ///
    /// The copy may be torn by a concurrent writer. The caller validates it afterward
    /// (the consumer index has not moved) before `assume_init`.
    #[inline(always)]
    pub(crate) fn read_copy_volatile(&self) -> MaybeUninit<T>
    where
        T: Copy,
    {
        unsafe { ptr::read_volatile(self.value.get()) }
    }

    /// Copies the value and returns the copy if `consumer_index` still is `expected`
    /// afterward.
    ///
    /// The caller must have observed the slot holding the value of index `expected`.
    /// While no consumer moved past `expected`, nobody could take the value and no
    /// producer could overwrite it, so the copy is not torn.
    #[inline(always)]
    pub(crate) fn copy_validated(&self, consumer_index: &AtomicU64, expected: u64) -> Option<T>
    where
        T: Copy,
    {
        let copy = self.read_copy_volatile();

        fence(Acquire);

        (consumer_index.load(Relaxed) == expected).then(|| unsafe { copy.assume_init() })
    }
}

impl<T> Drop for Slot<T> {
    fn drop(&mut self) {
        if self.state.load(Relaxed) == FILLED {
            unsafe { self.value.get_mut().assume_init_drop() };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    #[test]
    fn test_offset_wraps_by_mask() {
        assert_eq!(offset(0, 7), 0);
        assert_eq!(offset(9, 7), 1);
        assert_eq!(offset(u64::MAX, 15), 15);
    }

    #[test]
    fn test_size_is_clamped() {
        let consumer = AtomicU64::new(10);
        let producer = AtomicU64::new(14);

        assert_eq!(size(&consumer, &producer, 0, Some(8)), 4);
        assert_eq!(size(&consumer, &producer, 1, None), 2);
        assert_eq!(size(&consumer, &producer, 0, Some(3)), 3);
        assert!(!is_empty(&consumer, &producer));

        // A consumer that ran ahead of a stale producer read.
        consumer.store_plain(20);

        assert_eq!(size(&consumer, &producer, 0, None), 0);
        assert!(is_empty(&consumer, &producer));
    }

    #[test]
    fn test_slot_drops_only_filled_values() {
        let value = Rc::new(());

        {
            let buffer = Slot::new_buffer(4);

            unsafe {
                buffer[0].write(value.clone());
                buffer[1].write(value.clone());
                drop(buffer[1].take());
            }

            buffer[2].mark_jump();

            assert!(buffer[0].is_filled());
            assert!(buffer[1].is_empty());
            assert_eq!(buffer[2].state(), JUMP);
            assert_eq!(Rc::strong_count(&value), 2);
        }

        assert_eq!(Rc::strong_count(&value), 1);
    }

    #[test]
    fn test_index_access_cas() {
        let index = AtomicU64::new(3);

        assert!(!index.cas(2, 5));
        assert!(index.cas(3, 5));
        assert_eq!(index.get_and_add(2), 5);
        assert_eq!(index.load_plain(), 7);
    }
}
