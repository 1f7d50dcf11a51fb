//! Generates the producer and consumer handles of the raw queues.
//!
//! Every raw queue exposes the same method names. Methods of a role the queue has only
//! one of are `unsafe fn`s; the handles make them safe by being that one caller:
//! single-role handles are `Send` but neither `Sync` nor `Clone`.

/// Generates the producer of a single-producer queue.
///
/// `fill_all = method` delegates [`Producer::fill_all`](crate::Producer::fill_all) to the
/// raw queue.
macro_rules! single_producer_handle {
    ($queue:ident, $handle:ident $(, fill_all = $fill_all:ident)?) => {
        #[doc = concat!("The only producer of a [`", stringify!($queue), "`].")]
        pub struct $handle<T> {
            inner: $crate::light_arc::LightArc<$queue<T>>,
            _non_sync: std::marker::PhantomData<*const ()>,
        }

        impl<T> $handle<T> {
            fn new(inner: $crate::light_arc::LightArc<$queue<T>>) -> Self {
                Self {
                    inner,
                    _non_sync: std::marker::PhantomData,
                }
            }

            /// Returns the queue.
            pub fn queue(&self) -> &$queue<T> {
                &self.inner
            }
        }

        impl<T: Send> $crate::Producer<T> for $handle<T> {
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
                unsafe { self.inner.offer(value) }
            }

            #[inline]
            fn relaxed_offer(&mut self, value: T) -> Result<(), T> {
                unsafe { self.inner.relaxed_offer(value) }
            }

            #[inline]
            fn fill<S: FnMut() -> T>(&mut self, supplier: S, limit: usize) -> usize {
                unsafe { self.inner.fill(supplier, limit) }
            }

            $(
                #[inline]
                fn fill_all<S: FnMut() -> T>(&mut self, supplier: S) -> usize {
                    unsafe { self.inner.$fill_all(supplier) }
                }
            )?
        }

        unsafe impl<T: Send> Send for $handle<T> {}
    };
}

/// Generates the cloneable producer of a multi-producer queue.
macro_rules! multi_producer_handle {
    ($queue:ident, $handle:ident $(, fill_all = $fill_all:ident)?) => {
        #[doc = concat!("A producer of a [`", stringify!($queue), "`].")]
        ///
        /// Clone it to get another producer.
        pub struct $handle<T> {
            inner: $crate::light_arc::LightArc<$queue<T>>,
        }

        impl<T> $handle<T> {
            fn new(inner: $crate::light_arc::LightArc<$queue<T>>) -> Self {
                Self { inner }
            }

            /// Returns the queue.
            pub fn queue(&self) -> &$queue<T> {
                &self.inner
            }
        }

        impl<T> Clone for $handle<T> {
            fn clone(&self) -> Self {
                Self::new(self.inner.clone())
            }
        }

        impl<T: Send> $crate::Producer<T> for $handle<T> {
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
                self.inner.offer(value)
            }

            #[inline]
            fn relaxed_offer(&mut self, value: T) -> Result<(), T> {
                self.inner.relaxed_offer(value)
            }

            #[inline]
            fn fill<S: FnMut() -> T>(&mut self, supplier: S, limit: usize) -> usize {
                self.inner.fill(supplier, limit)
            }

            $(
                #[inline]
                fn fill_all<S: FnMut() -> T>(&mut self, supplier: S) -> usize {
                    self.inner.$fill_all(supplier)
                }
            )?
        }

        impl<T: Send> $crate::MultiProducer<T> for $handle<T> {}
    };
}

/// Generates the consumer of a single-consumer queue.
macro_rules! single_consumer_handle {
    ($queue:ident, $handle:ident) => {
        #[doc = concat!("The only consumer of a [`", stringify!($queue), "`].")]
        pub struct $handle<T> {
            inner: $crate::light_arc::LightArc<$queue<T>>,
            _non_sync: std::marker::PhantomData<*const ()>,
        }

        impl<T> $handle<T> {
            fn new(inner: $crate::light_arc::LightArc<$queue<T>>) -> Self {
                Self {
                    inner,
                    _non_sync: std::marker::PhantomData,
                }
            }

            /// Returns the queue.
            pub fn queue(&self) -> &$queue<T> {
                &self.inner
            }
        }

        impl<T: Send> $crate::Consumer<T> for $handle<T> {
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
            fn poll(&mut self) -> Option<T> {
                unsafe { self.inner.poll() }
            }

            #[inline]
            fn relaxed_poll(&mut self) -> Option<T> {
                unsafe { self.inner.relaxed_poll() }
            }

            #[inline]
            fn drain<C: FnMut(T)>(&mut self, consumer: C, limit: usize) -> usize {
                unsafe { self.inner.drain(consumer, limit) }
            }
        }

        impl<T: Send> $crate::SingleConsumer<T> for $handle<T> {
            #[inline]
            fn peek_with<R, F: FnOnce(&T) -> R>(&self, f: F) -> Option<R> {
                unsafe { self.inner.peek_with(f) }
            }

            #[inline]
            fn relaxed_peek_with<R, F: FnOnce(&T) -> R>(&self, f: F) -> Option<R> {
                unsafe { self.inner.relaxed_peek_with(f) }
            }
        }

        unsafe impl<T: Send> Send for $handle<T> {}
    };
}

/// Generates the cloneable consumer of a multi-consumer queue.
macro_rules! multi_consumer_handle {
    ($queue:ident, $handle:ident) => {
        #[doc = concat!("A consumer of a [`", stringify!($queue), "`].")]
        ///
        /// Clone it to get another consumer.
        pub struct $handle<T> {
            inner: $crate::light_arc::LightArc<$queue<T>>,
        }

        impl<T> $handle<T> {
            fn new(inner: $crate::light_arc::LightArc<$queue<T>>) -> Self {
                Self { inner }
            }

            /// Returns the queue.
            pub fn queue(&self) -> &$queue<T> {
                &self.inner
            }
        }

        impl<T> Clone for $handle<T> {
            fn clone(&self) -> Self {
                Self::new(self.inner.clone())
            }
        }

        impl<T: Send> $crate::Consumer<T> for $handle<T> {
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
            fn poll(&mut self) -> Option<T> {
                self.inner.poll()
            }

            #[inline]
            fn relaxed_poll(&mut self) -> Option<T> {
                self.inner.relaxed_poll()
            }

            #[inline]
            fn drain<C: FnMut(T)>(&mut self, consumer: C, limit: usize) -> usize {
                self.inner.drain(consumer, limit)
            }
        }

        impl<T: Send> $crate::MultiConsumer<T> for $handle<T> {
            #[inline]
            fn peek(&self) -> Option<T>
            where
                T: Copy,
            {
                self.inner.peek()
            }

            #[inline]
            fn relaxed_peek(&self) -> Option<T>
            where
                T: Copy,
            {
                self.inner.relaxed_peek()
            }
        }
    };
}

pub(crate) use {
    multi_consumer_handle, multi_producer_handle, single_consumer_handle, single_producer_handle,
};
