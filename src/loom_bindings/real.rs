pub(crate) mod hint {
    pub(crate) use std::hint::spin_loop;
}

pub(crate) mod sync {
    use std::sync::{MutexGuard, TryLockError};

    pub(crate) mod atomic {
        pub(crate) use std::sync::atomic::{
            fence, AtomicBool, AtomicI64, AtomicPtr, AtomicU64, AtomicU8, AtomicUsize,
        };
    }

    /// A `std::sync::Mutex` that ignores poisoning.
    ///
    /// A failed test must not poison the lock for the tests that run after it.
    #[derive(Debug)]
    pub(crate) struct Mutex<T>(std::sync::Mutex<T>);

    #[allow(dead_code, reason = "Only the tests lock it.")]
    impl<T> Mutex<T> {
        pub(crate) const fn new(value: T) -> Self {
            Self(std::sync::Mutex::new(value))
        }

        pub(crate) fn lock(&self) -> MutexGuard<'_, T> {
            self.0.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
        }

        pub(crate) fn try_lock(&self) -> Option<MutexGuard<'_, T>> {
            match self.0.try_lock() {
                Ok(guard) => Some(guard),
                Err(TryLockError::Poisoned(poisoned)) => Some(poisoned.into_inner()),
                Err(TryLockError::WouldBlock) => None,
            }
        }
    }
}

pub(crate) mod thread {
    pub(crate) use std::thread::{spawn, yield_now};
}
