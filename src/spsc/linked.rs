//! This module provides the single-producer, single-consumer linked queue.
use crate::handles::{single_consumer_handle, single_producer_handle};
use crate::light_arc::LightArc;
use crate::linked::{Chain, LinkedList, Node};
use std::sync::atomic::Ordering::{Relaxed, Release};

/// The single-producer, single-consumer _unbounded_ queue of linked nodes.
///
/// Every value gets its own node. The producer publishes a node as the producer node
/// with a release store before it links the previous node to it, so the consumer never
/// overtakes the producer. Between the two stores the consumer spins in
/// [`poll`](Self::poll) and gives up in [`relaxed_poll`](Self::relaxed_poll).
pub struct SPSCLinkedQueue<T> {
    list: LinkedList<T>,
}

impl<T> SPSCLinkedQueue<T> {
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

impl<T> Default for SPSCLinkedQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

// Producer
impl<T> SPSCLinkedQueue<T> {
    /// Publishes `head..=tail` after the current producer node.
    unsafe fn append(&self, head: *mut Node<T>, tail: *mut Node<T>) {
        let producer_node = self.list.producer_node();
        let previous = producer_node.load(Relaxed);

        producer_node.store(tail, Release);

        unsafe { Node::link(previous, head) };
    }

    /// Pushes a value. It never fails.
    ///
    /// # Safety
    ///
    /// The caller must be the only producer.
    #[inline]
    pub unsafe fn offer(&self, value: T) -> Result<(), T> {
        let node = Node::with_value(value);

        unsafe { self.append(node, node) };

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

    /// Links `limit` values from `supplier` into a chain and publishes it at once.
    ///
    /// # Safety
    ///
    /// The caller must be the only producer.
    pub unsafe fn fill<S: FnMut() -> T>(&self, supplier: S, limit: usize) -> usize {
        if limit == 0 {
            return 0;
        }

        let chain = Chain::build(supplier, limit);

        unsafe { self.append(chain.head, chain.tail) };
        chain.published();

        limit
    }
}

// Consumer
impl<T> SPSCLinkedQueue<T> {
    /// Pops the head value.
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

    /// Calls `f` with the head value.
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
}

unsafe impl<T: Send> Send for SPSCLinkedQueue<T> {}
unsafe impl<T: Send> Sync for SPSCLinkedQueue<T> {}

single_producer_handle!(SPSCLinkedQueue, SPSCLinkedProducer);
single_consumer_handle!(SPSCLinkedQueue, SPSCLinkedConsumer);

/// Creates a single-producer, single-consumer unbounded queue of linked nodes.
///
/// # Examples
///
/// ```
/// use ferroq::{spsc, Consumer, Producer};
///
/// let (mut producer, mut consumer) = spsc::new_linked();
///
/// producer.fill(|| 7, 3);
///
/// assert_eq!(consumer.len(), 3);
/// assert_eq!(consumer.poll(), Some(7));
/// ```
pub fn new_linked<T>() -> (SPSCLinkedProducer<T>, SPSCLinkedConsumer<T>) {
    let queue = LightArc::new(SPSCLinkedQueue::new());

    (
        SPSCLinkedProducer::new(queue.clone()),
        SPSCLinkedConsumer::new(queue),
    )
}

