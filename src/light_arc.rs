//! This module provides [`LightArc`], the shared box behind every producer/consumer pair.
use crate::hints::unlikely;
use crate::loom_bindings::sync::atomic::{fence, AtomicUsize};
use std::ops::Deref;
use std::ptr::NonNull;
use std::sync::atomic::Ordering::{Acquire, Relaxed, Release};

struct Shared<T> {
    handles: AtomicUsize,
    value: T,
}

/// A reference-counted pointer with only a strong count.
///
/// A queue is shared by a fixed set of handles and never by weak references, so one
/// counter is all it needs. The last handle dropped drops the queue with everything
/// still in it.
pub(crate) struct LightArc<T> {
    shared: NonNull<Shared<T>>,
}

impl<T> LightArc<T> {
    pub(crate) fn new(value: T) -> Self {
        let shared = Box::new(Shared {
            handles: AtomicUsize::new(1),
            value,
        });

        Self {
            shared: NonNull::from(Box::leak(shared)),
        }
    }

    fn shared(&self) -> &Shared<T> {
        unsafe { self.shared.as_ref() }
    }

    /// Returns the number of handles pointing to the value.
    #[cfg(test)]
    pub(crate) fn handle_count(&self) -> usize {
        self.shared().handles.load(Relaxed)
    }
}

impl<T> Clone for LightArc<T> {
    fn clone(&self) -> Self {
        let previous = self.shared().handles.fetch_add(1, Relaxed);

        debug_assert!(previous > 0, "cloned a released LightArc");

        Self {
            shared: self.shared,
        }
    }
}

impl<T> Drop for LightArc<T> {
    fn drop(&mut self) {
        if unlikely(self.shared().handles.fetch_sub(1, Release) == 1) {
            // Every write made through other handles happens before the drop.
            fence(Acquire);

            drop(unsafe { Box::from_raw(self.shared.as_ptr()) });
        }
    }
}

impl<T> Deref for LightArc<T> {
    type Target = T;

    #[inline(always)]
    fn deref(&self) -> &T {
        &self.shared().value
    }
}

unsafe impl<T: Send + Sync> Send for LightArc<T> {}
unsafe impl<T: Send + Sync> Sync for LightArc<T> {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    #[test]
    fn test_last_handle_drops_the_value() {
        let marker = Rc::new(());
        let first = LightArc::new(marker.clone());
        let second = first.clone();

        assert_eq!(first.handle_count(), 2);
        assert_eq!(Rc::strong_count(&marker), 2);

        drop(first);

        assert_eq!(second.handle_count(), 1);
        assert_eq!(Rc::strong_count(&*second), 2);

        drop(second);

        assert_eq!(Rc::strong_count(&marker), 1);
    }
}
