//! The node list shared by the unbounded linked queues.
//!
//! The list always holds one node without a value: the consumer node. Values live in the
//! nodes after it. A producer publishes a node by making it the producer node first and
//! linking the previous producer node to it second, so between the two stores the list is
//! broken (a bubble) and the consumer spins if it reaches the break. A consumed node
//! points to itself (a tombstone) so that concurrent [`len`](LinkedList::len) walks stop
//! there.
//!
//! The consumer retires consumed nodes through `crossbeam-epoch`: `len` may still walk
//! them from any thread.
use crate::backoff::spin_until;
use crate::cache_padded::CachePadded;
use crate::loom_bindings::sync::atomic::AtomicPtr;
use crossbeam_epoch::{self as epoch, Guard};
use std::cell::UnsafeCell;
use std::mem::{self, MaybeUninit};
use std::ptr;
use std::sync::atomic::Ordering::{Acquire, Relaxed, Release, SeqCst};

pub(crate) struct Node<T> {
    value: UnsafeCell<MaybeUninit<T>>,
    next: AtomicPtr<Node<T>>,
}

impl<T> Node<T> {
    fn alloc(value: MaybeUninit<T>) -> *mut Self {
        Box::into_raw(Box::new(Self {
            value: UnsafeCell::new(value),
            next: AtomicPtr::new(ptr::null_mut()),
        }))
    }

    pub(crate) fn with_value(value: T) -> *mut Self {
        Self::alloc(MaybeUninit::new(value))
    }

    /// Frees a node without dropping its value.
    ///
    /// # Safety
    ///
    /// `node` must come from [`Node::alloc`] and must be unreachable.
    unsafe fn free(node: *mut Self) {
        drop(unsafe { Box::from_raw(node) });
    }

    /// # Safety
    ///
    /// `node` must be alive.
    #[inline(always)]
    unsafe fn next(node: *mut Self) -> *mut Self {
        unsafe { (*node).next.load(Acquire) }
    }

    /// # Safety
    ///
    /// `node` must be alive.
    #[inline(always)]
    pub(crate) unsafe fn link(node: *mut Self, next: *mut Self) {
        unsafe { (*node).next.store(next, Release) };
    }

    /// # Safety
    ///
    /// `node` must hold a value that nobody takes while the reference lives.
    #[inline(always)]
    unsafe fn value_ref<'node>(node: *mut Self) -> &'node T {
        unsafe { (*(*node).value.get()).assume_init_ref() }
    }

    /// # Safety
    ///
    /// `node` must hold a value. It holds none afterward.
    #[inline(always)]
    unsafe fn take_value(node: *mut Self) -> T {
        unsafe { (*(*node).value.get()).assume_init_read() }
    }
}

/// A chain of nodes built before it is published.
///
/// If the supplier panics halfway, the nodes built so far are freed with their values.
pub(crate) struct Chain<T> {
    pub(crate) head: *mut Node<T>,
    pub(crate) tail: *mut Node<T>,
}

impl<T> Chain<T> {
    /// Builds a chain of `len` nodes, `len` must not be zero.
    pub(crate) fn build(mut supplier: impl FnMut() -> T, len: usize) -> Self {
        debug_assert!(len > 0);

        let head = Node::with_value(supplier());
        let mut chain = Self { head, tail: head };

        for _ in 1..len {
            let node = Node::with_value(supplier());

            // Publishing the chain orders these stores.
            unsafe { (*chain.tail).next.store(node, Relaxed) };

            chain.tail = node;
        }

        chain
    }

    /// Gives up ownership of the nodes once they are linked into a list.
    pub(crate) fn published(self) {
        mem::forget(self);
    }
}

impl<T> Drop for Chain<T> {
    fn drop(&mut self) {
        let mut node = self.head;

        while !node.is_null() {
            unsafe {
                let next = (*node).next.load(Relaxed);

                drop(Node::take_value(node));
                Node::free(node);

                node = next;
            }
        }
    }
}

/// The producer and consumer ends of a node list.
pub(crate) struct LinkedList<T> {
    producer_node: CachePadded<AtomicPtr<Node<T>>>,
    consumer_node: CachePadded<AtomicPtr<Node<T>>>,
}

impl<T> LinkedList<T> {
    pub(crate) fn new() -> Self {
        let node = Node::alloc(MaybeUninit::uninit());

        Self {
            producer_node: CachePadded::new(AtomicPtr::new(node)),
            consumer_node: CachePadded::new(AtomicPtr::new(node)),
        }
    }

    #[inline(always)]
    pub(crate) fn producer_node(&self) -> &AtomicPtr<Node<T>> {
        &self.producer_node
    }

    /// Counts the nodes between the consumer node and the producer node.
    ///
    /// The consumer node is read first: the consumer never passes the producer node, so
    /// both reads belong to one list.
    pub(crate) fn len(&self) -> usize {
        let _guard = epoch::pin();
        let mut chaser = self.consumer_node.load(SeqCst);
        let producer_node = self.producer_node.load(SeqCst);
        let mut size = 0;

        while chaser != producer_node && !chaser.is_null() && size < usize::MAX {
            let next = unsafe { Node::next(chaser) };

            // Consumed while we were walking.
            if next == chaser {
                return size;
            }

            chaser = next;
            size += 1;
        }

        size
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.consumer_node.load(SeqCst) == self.producer_node.load(SeqCst)
    }

    /// Returns the node after `node`, spinning through a bubble. Returns null if `node`
    /// is the producer node.
    ///
    /// # Safety
    ///
    /// `node` must be alive.
    unsafe fn next_or_wait(&self, node: *mut Node<T>) -> *mut Node<T> {
        let next = unsafe { Node::next(node) };

        if next.is_null() && node != self.producer_node.load(SeqCst) {
            return Self::wait_for_next(node);
        }

        next
    }

    /// Spins until a producer links `node` to its successor.
    fn wait_for_next(node: *mut Node<T>) -> *mut Node<T> {
        spin_until(|| {
            let next = unsafe { Node::next(node) };

            (!next.is_null()).then_some(next)
        })
    }

    /// Moves the consumer to `next`, takes its value and retires the old consumer node.
    ///
    /// # Safety
    ///
    /// The caller must be the only consumer and `next` must follow `current`.
    unsafe fn advance(&self, current: *mut Node<T>, next: *mut Node<T>, guard: &Guard) -> T {
        let value = unsafe { Node::take_value(next) };

        unsafe { (*current).next.store(current, Release) };
        self.consumer_node.store(next, SeqCst);

        unsafe { guard.defer_unchecked(move || Node::free(current)) };

        value
    }
}

// Consumer
impl<T> LinkedList<T> {
    /// # Safety
    ///
    /// The caller must be the only consumer.
    pub(crate) unsafe fn poll(&self) -> Option<T> {
        let guard = epoch::pin();
        let current = self.consumer_node.load(Relaxed);
        let next = unsafe { self.next_or_wait(current) };

        if next.is_null() {
            return None;
        }

        Some(unsafe { self.advance(current, next, &guard) })
    }

    /// # Safety
    ///
    /// The caller must be the only consumer.
    pub(crate) unsafe fn relaxed_poll(&self) -> Option<T> {
        let guard = epoch::pin();
        let current = self.consumer_node.load(Relaxed);
        let next = unsafe { Node::next(current) };

        if next.is_null() {
            return None;
        }

        Some(unsafe { self.advance(current, next, &guard) })
    }

    /// # Safety
    ///
    /// The caller must be the only consumer.
    pub(crate) unsafe fn drain<C: FnMut(T)>(&self, mut consumer: C, limit: usize) -> usize {
        let guard = epoch::pin();
        let mut chaser = self.consumer_node.load(Relaxed);

        for i in 0..limit {
            let next = unsafe { Node::next(chaser) };

            if next.is_null() {
                return i;
            }

            let value = unsafe { self.advance(chaser, next, &guard) };

            chaser = next;
            consumer(value);
        }

        limit
    }

    /// # Safety
    ///
    /// The caller must be the only consumer.
    pub(crate) unsafe fn peek_with<R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        let next = unsafe { self.next_or_wait(self.consumer_node.load(Relaxed)) };

        if next.is_null() {
            return None;
        }

        Some(f(unsafe { Node::value_ref(next) }))
    }

    /// # Safety
    ///
    /// The caller must be the only consumer.
    pub(crate) unsafe fn relaxed_peek_with<R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        let next = unsafe { Node::next(self.consumer_node.load(Relaxed)) };

        if next.is_null() {
            return None;
        }

        Some(f(unsafe { Node::value_ref(next) }))
    }

    /// Unlinks the first node whose value equals `value` and drops that value.
    ///
    /// Unlinking the last node races with producers: it moves the producer node back with
    /// a compare-and-swap, and if a producer appended meanwhile, it waits for the link
    /// and bridges over the removed node instead.
    ///
    /// # Safety
    ///
    /// The caller must be the only consumer. Producers must publish with a swap of the
    /// producer node.
    pub(crate) unsafe fn remove(&self, value: &T) -> bool
    where
        T: PartialEq,
    {
        let guard = epoch::pin();
        let mut previous = self.consumer_node.load(Relaxed);
        let mut current = unsafe { self.next_or_wait(previous) };

        while !current.is_null() {
            if unsafe { Node::value_ref(current) } == value {
                let next = unsafe { self.next_or_wait(current) };

                if next.is_null() {
                    // The removed node is the producer node, unless a producer swaps it
                    // out right now.
                    unsafe { Node::link(previous, ptr::null_mut()) };

                    if self
                        .producer_node
                        .compare_exchange(current, previous, SeqCst, SeqCst)
                        .is_err()
                    {
                        unsafe { Node::link(previous, Self::wait_for_next(current)) };
                    }
                } else {
                    unsafe { Node::link(previous, next) };
                }

                unsafe {
                    drop(Node::take_value(current));
                    guard.defer_unchecked(move || Node::free(current));
                }

                return true;
            }

            previous = current;
            current = unsafe { self.next_or_wait(current) };
        }

        false
    }
}

impl<T> Drop for LinkedList<T> {
    fn drop(&mut self) {
        let consumer_node = self.consumer_node.load(Relaxed);

        unsafe {
            let mut node = (*consumer_node).next.load(Relaxed);

            Node::free(consumer_node);

            while !node.is_null() {
                let next = (*node).next.load(Relaxed);

                drop(Node::take_value(node));
                Node::free(node);

                node = next;
            }
        }
    }
}
