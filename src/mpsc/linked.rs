//! This module provides the multi-producer, single-consumer linked queue.
use crate::handles::{multi_producer_handle, single_consumer_handle};
use crate::light_arc::LightArc;
use crate::linked::{Chain, LinkedList, Node};
use std::sync::atomic::Ordering::AcqRel;

/// The multi-producer, single-consumer _unbounded_ queue of linked nodes.
///
/// Producers swap their node in as the producer node and then link the node they
/// replaced to it. A swapped-in but unlinked node is a bubble: [`poll`](Self::poll)
/// spins until the link appears, [`relaxed_poll`](Self::relaxed_poll) reports the queue
/// as empty.
///
/// The consumer can also [`remove`](Self::remove) a value from the middle of the queue.
pub struct MPSCLinkedQueue<T> {
    list: LinkedList<T>,
}

impl<T> MPSCLinkedQueue<T> {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self {
            list: LinkedList::new(),
        }
    }

    /// Returns `None`: the queue is unbounded.
    #[inline]
    pub fn capacity(&self) -> Option<usize> {
        None
    }

    /// Returns the number of values in the queue by walking the nodes.
    pub fn len(&self) -> usize {
        self.list.len()
    }

    /// Returns whether the queue is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }
}

impl<T> Default for MPSCLinkedQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

// Producers
impl<T> MPSCLinkedQueue<T> {
    #[inline]
    fn append(&self, head: *mut Node<T>, tail: *mut Node<T>) {
        let previous = self.list.producer_node().swap(tail, AcqRel);

        // Only this producer links `previous`, and the consumer cannot pass it before.
        unsafe { Node::link(previous, head) };
    }

    /// Pushes a value. It never fails.
    #[inline]
    pub fn offer(&self, value: T) -> Result<(), T> {
        let node = Node::with_value(value);

        self.append(node, node);

        Ok(())
    }

    /// Same as [`offer`](Self::offer).
    #[inline]
    pub fn relaxed_offer(&self, value: T) -> Result<(), T> {
        self.offer(value)
    }

    /// Links `limit` values from `supplier` into a chain and publishes it with one swap.
    ///
    /// The values stay contiguous in the queue.
    pub fn fill<S: FnMut() -> T>(&self, supplier: S, limit: usize) -> usize {
        if limit == 0 {
            return 0;
        }

        let chain = Chain::build(supplier, limit);

        self.append(chain.head, chain.tail);
        chain.published();

        limit
    }
}

// Consumer
impl<T> MPSCLinkedQueue<T> {
    /// Pops the head value, spinning through a bubble.
    ///
    /// # Safety
    ///
    /// The caller must be the only consumer.
    #[inline]
    pub unsafe fn poll(&self) -> Option<T> {
        unsafe { self.list.poll() }
    }

    /// Pops the head value if it is already linked.
    ///
    /// # Safety
    ///
    /// The caller must be the only consumer.
    #[inline]
    pub unsafe fn relaxed_poll(&self) -> Option<T> {
        unsafe { self.list.relaxed_poll() }
    }

    /// Pops up to `limit` linked values into `consumer`.
    ///
    /// # Safety
    ///
    /// The caller must be the only consumer.
    pub unsafe fn drain<C: FnMut(T)>(&self, consumer: C, limit: usize) -> usize {
        unsafe { self.list.drain(consumer, limit) }
    }

    /// Calls `f` with the head value, spinning through a bubble.
    ///
    /// # Safety
    ///
    /// The caller must be the only consumer.
    #[inline]
    pub unsafe fn peek_with<R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        unsafe { self.list.peek_with(f) }
    }

    /// Calls `f` with the head value if it is already linked.
    ///
    /// # Safety
    ///
    /// The caller must be the only consumer.
    #[inline]
    pub unsafe fn relaxed_peek_with<R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        unsafe { self.list.relaxed_peek_with(f) }
    }

    /// Removes the first value equal to `value` and returns whether it found one.
    ///
    /// # Safety
    ///
    /// The caller must be the only consumer.
    pub unsafe fn remove(&self, value: &T) -> bool
    where
        T: PartialEq,
    {
        unsafe { self.list.remove(value) }
    }
}

unsafe impl<T: Send> Send for MPSCLinkedQueue<T> {}
unsafe impl<T: Send> Sync for MPSCLinkedQueue<T> {}

multi_producer_handle!(MPSCLinkedQueue, MPSCLinkedProducer);
single_consumer_handle!(MPSCLinkedQueue, MPSCLinkedConsumer);

impl<T> MPSCLinkedConsumer<T> {
    /// See [`MPSCLinkedQueue::remove`].
    pub fn remove(&mut self, value: &T) -> bool
    where
        T: PartialEq,
    {
        unsafe { self.inner.remove(value) }
    }
}

/// Creates a multi-producer, single-consumer unbounded queue of linked nodes.
///
/// # Examples
///
/// ```
/// use ferroq::{mpsc, Consumer, Producer};
///
/// let (mut producer, mut consumer) = mpsc::new_linked();
///
/// for i in 0..4 {
///     producer.offer(i).unwrap();
/// }
///
/// assert!(consumer.remove(&2));
/// assert!(!consumer.remove(&2));
/// assert_eq!(consumer.poll(), Some(0));
/// assert_eq!(consumer.poll(), Some(1));
/// assert_eq!(consumer.poll(), Some(3));
/// ```
pub fn new_linked<T>() -> (MPSCLinkedProducer<T>, MPSCLinkedConsumer<T>) {
    let queue = LightArc::new(MPSCLinkedQueue::new());

    (
        MPSCLinkedProducer::new(queue.clone()),
        MPSCLinkedConsumer::new(queue),
    )
}
