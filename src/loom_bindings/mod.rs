//! Switches the synchronization primitives between `std` and `loom`.
//!
//! Every atomic, spin hint and thread primitive of the queues is imported from here,
//! so building the tests with `--cfg ferroq_loom` model-checks the very same code.
#![allow(unused_imports, reason = "Not every item is used by both backends.")]

#[cfg(not(all(test, ferroq_loom)))]
mod real;
#[cfg(not(all(test, ferroq_loom)))]
pub(crate) use self::real::*;

#[cfg(all(test, ferroq_loom))]
mod mocked;
#[cfg(all(test, ferroq_loom))]
pub(crate) use self::mocked::*;
