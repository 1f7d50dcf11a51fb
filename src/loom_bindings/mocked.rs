pub(crate) mod hint {
    pub(crate) use loom::hint::spin_loop;
}

pub(crate) mod sync {
    pub(crate) mod atomic {
        pub(crate) use loom::sync::atomic::{
            fence, AtomicBool, AtomicI64, AtomicPtr, AtomicU64, AtomicU8, AtomicUsize,
        };
    }
}

pub(crate) mod thread {
    pub(crate) use loom::thread::{spawn, yield_now};
}
