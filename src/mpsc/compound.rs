use crate::cache_padded::CachePadded;
use crate::config::{round_capacity, Parallelism};
use crate::errors::QueueConfigError;
use crate::handles::single_consumer_handle;
use crate::light_arc::LightArc;
use crate::loom_bindings::sync::atomic::AtomicUsize;
use crate::mpsc::MPSCBoundedQueue;
use crate::{MultiProducer, Producer};
use std::cell::Cell;
use std::sync::atomic::Ordering::Relaxed;

/// The multi-producer, single-consumer bounded queue made of several
/// [`MPSCBoundedQueue`] lanes.
///
/// Every producer handle has a home lane, so producers on different lanes don't contend
/// for one producer index. A producer whose home lane is full tries the other lanes.
///
/// The queue is FIFO per lane only: values of different lanes come out in no particular
/// order.
pub struct MPSCCompoundQueue<T> {
    lanes: Box<[MPSCBoundedQueue<T>]>,
    lane_mask: usize,
    next_home_lane: AtomicUsize,
    consumer_lane: CachePadded<Cell<usize>>,
}

impl<T> MPSCCompoundQueue<T> {
    /// Creates a queue for at least `capacity` values spread over the lanes of
    /// `parallelism`.
    ///
    /// The capacity is rounded up to a power of two and split evenly, so it can't be
    /// smaller than the number of lanes.
    pub fn new(capacity: usize, parallelism: Parallelism) -> Result<Self, QueueConfigError> {
        let lanes = parallelism.lanes()?;
        let capacity = round_capacity(capacity, 1)?;

        if capacity < lanes {
            return Err(QueueConfigError::FewerSlotsThanLanes { capacity, lanes });
        }

        let lane_capacity = capacity / lanes;

        tracing::debug!(lanes, lane_capacity, "creating the compound queue lanes");

        Ok(Self {
            lanes: (0..lanes)
                .map(|_| MPSCBoundedQueue::new(lane_capacity))
                .collect::<Result<_, _>>()?,
            lane_mask: lanes - 1,
            next_home_lane: AtomicUsize::new(0),
            consumer_lane: CachePadded::new(Cell::new(0)),
        })
    }

    /// Returns the number of lanes.
    #[inline]
    pub fn lanes(&self) -> usize {
        self.lanes.len()
    }

    /// Returns the capacity of the queue, the sum of the lane capacities.
    #[inline]
    pub fn capacity(&self) -> Option<usize> {
        self.lanes[0]
            .capacity()
            .map(|lane_capacity| lane_capacity * self.lanes.len())
    }

    /// Returns the number of values in the queue.
    pub fn len(&self) -> usize {
        self.lanes.iter().map(MPSCBoundedQueue::len).sum()
    }

    /// Returns whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.lanes.iter().all(MPSCBoundedQueue::is_empty)
    }

    fn assign_home_lane(&self) -> usize {
        self.next_home_lane.fetch_add(1, Relaxed) & self.lane_mask
    }

    /// Yields the lane indices of one round starting at `start`.
    #[inline]
    fn round_from(&self, start: usize) -> impl Iterator<Item = usize> + '_ {
        (start..start + self.lanes.len()).map(move |i| i & self.lane_mask)
    }
}

// Producer
impl<T> MPSCCompoundQueue<T> {
    /// Adds a value, trying `home` first.
    ///
    /// Returns the value back only if every lane was full.
    pub fn offer_from(&self, home: usize, value: T) -> Result<(), T> {
        let home = home & self.lane_mask;
        let mut value = match self.lanes[home].offer(value) {
            Ok(()) => return Ok(()),
            Err(value) => value,
        };

        loop {
            let mut all_full = true;

            for lane in self.round_from(home + 1) {
                match self.lanes[lane].fail_fast_offer(value) {
                    Ok(()) => return Ok(()),
                    Err(err) => {
                        all_full &= err.is_full();
                        value = err.into_inner();
                    }
                }
            }

            if all_full {
                return Err(value);
            }
        }
    }

    /// Makes one fail-fast pass over the lanes, starting with `home`.
    pub fn relaxed_offer_from(&self, home: usize, mut value: T) -> Result<(), T> {
        for lane in self.round_from(home & self.lane_mask) {
            match self.lanes[lane].fail_fast_offer(value) {
                Ok(()) => return Ok(()),
                Err(err) => value = err.into_inner(),
            }
        }

        Err(value)
    }

    /// Fills `home` first and the other lanes with what doesn't fit.
    pub fn fill_from<S: FnMut() -> T>(
        &self,
        home: usize,
        mut supplier: S,
        limit: usize,
    ) -> usize {
        let mut filled = 0;

        for lane in self.round_from(home & self.lane_mask) {
            if filled == limit {
                break;
            }

            filled += self.lanes[lane].fill(&mut supplier, limit - filled);
        }

        filled
    }
}

// Consumer
impl<T> MPSCCompoundQueue<T> {
    /// Calls `poll` on the lanes of one round from the last lane that had a value.
    ///
    /// # Safety
    ///
    /// The caller must be the only consumer.
    unsafe fn poll_lanes(
        &self,
        poll: impl Fn(&MPSCBoundedQueue<T>) -> Option<T>,
    ) -> Option<T> {
        for lane in self.round_from(self.consumer_lane.get()) {
            if let Some(value) = poll(&self.lanes[lane]) {
                self.consumer_lane.set(lane);

                return Some(value);
            }
        }

        None
    }

    /// # Safety
    ///
    /// The caller must be the only consumer.
    pub unsafe fn poll(&self) -> Option<T> {
        unsafe { self.poll_lanes(|lane| lane.poll()) }
    }

    /// # Safety
    ///
    /// The caller must be the only consumer.
    pub unsafe fn relaxed_poll(&self) -> Option<T> {
        unsafe { self.poll_lanes(|lane| lane.relaxed_poll()) }
    }

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

    /// # Safety
    ///
    /// The caller must be the only consumer.
    pub unsafe fn peek_with<R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        for lane in self.round_from(self.consumer_lane.get()) {
            let queue = &self.lanes[lane];

            // Only we remove values, so a lane with a head keeps it.
            if unsafe { queue.peek_with(|_| ()) }.is_some() {
                self.consumer_lane.set(lane);

                return unsafe { queue.peek_with(f) };
            }
        }

        None
    }

    /// # Safety
    ///
    /// The caller must be the only consumer.
    pub unsafe fn relaxed_peek_with<R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        for lane in self.round_from(self.consumer_lane.get()) {
            let queue = &self.lanes[lane];

            if unsafe { queue.relaxed_peek_with(|_| ()) }.is_some() {
                self.consumer_lane.set(lane);

                return unsafe { queue.relaxed_peek_with(f) };
            }
        }

        None
    }
}

unsafe impl<T: Send> Send for MPSCCompoundQueue<T> {}
unsafe impl<T: Send> Sync for MPSCCompoundQueue<T> {}

/// A producer of an [`MPSCCompoundQueue`].
///
/// Each producer, clones included, gets its own home lane in turn.
pub struct MPSCCompoundProducer<T> {
    inner: LightArc<MPSCCompoundQueue<T>>,
    home: usize,
}

impl<T> MPSCCompoundProducer<T> {
    fn new(inner: LightArc<MPSCCompoundQueue<T>>) -> Self {
        let home = inner.assign_home_lane();

        Self { inner, home }
    }

    /// Returns the queue.
    pub fn queue(&self) -> &MPSCCompoundQueue<T> {
        &self.inner
    }

    /// Returns the lane this producer tries first.
    pub fn home_lane(&self) -> usize {
        self.home
    }
}

impl<T> Clone for MPSCCompoundProducer<T> {
    fn clone(&self) -> Self {
        Self::new(self.inner.clone())
    }
}

impl<T: Send> Producer<T> for MPSCCompoundProducer<T> {
    #[inline]
    fn capacity(&self) -> Option<usize> {
        self.inner.capacity()
    }

    #[inline]
    fn len(&self) -> usize {
        self.inner.len()
    }

    #[inline]
    fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    #[inline]
    fn offer(&mut self, value: T) -> Result<(), T> {
        self.inner.offer_from(self.home, value)
    }

    #[inline]
    fn relaxed_offer(&mut self, value: T) -> Result<(), T> {
        self.inner.relaxed_offer_from(self.home, value)
    }

    #[inline]
    fn fill<S: FnMut() -> T>(&mut self, supplier: S, limit: usize) -> usize {
        self.inner.fill_from(self.home, supplier, limit)
    }
}

impl<T: Send> MultiProducer<T> for MPSCCompoundProducer<T> {}

single_consumer_handle!(MPSCCompoundQueue, MPSCCompoundConsumer);

/// Creates a multi-producer, single-consumer queue of `capacity` values spread over the
/// lanes of `parallelism`.
///
/// # Examples
///
/// ```
/// use ferroq::{mpsc, Consumer, Parallelism, Producer};
///
/// let (mut producer, mut consumer) = mpsc::new_compound(8, Parallelism::new(2)).unwrap();
/// let mut second = producer.clone();
///
/// assert_ne!(producer.home_lane(), second.home_lane());
///
/// for i in 0..8 {
///     second.offer(i).unwrap();
/// }
///
/// assert_eq!(producer.offer(8), Err(8));
/// assert_eq!(consumer.drain_all(drop), 8);
/// ```
pub fn new_compound<T>(
    capacity: usize,
    parallelism: Parallelism,
) -> Result<(MPSCCompoundProducer<T>, MPSCCompoundConsumer<T>), QueueConfigError> {
    let queue = LightArc::new(MPSCCompoundQueue::new(capacity, parallelism)?);

    Ok((
        MPSCCompoundProducer::new(queue.clone()),
        MPSCCompoundConsumer::new(queue),
    ))
}
