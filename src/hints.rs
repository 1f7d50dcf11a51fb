//! Branch-prediction hints for the hot paths of the queues.
//!
//! Stable Rust has no `likely` intrinsic, so the hints route the unexpected branch
//! through a `#[cold]` function, which is enough for LLVM to lay the code out.

/// Marks the current path as rarely taken.
#[cold]
#[inline(always)]
pub(crate) fn cold_path() {}

/// Hints that `b` is almost always `true`.
#[inline(always)]
pub(crate) fn likely(b: bool) -> bool {
    if !b {
        cold_path();
    }

    b
}

/// Hints that `b` is almost always `false`.
#[inline(always)]
pub(crate) fn unlikely(b: bool) -> bool {
    if b {
        cold_path();
    }

    b
}
