//! This module provides the multi-producer, multi-consumer queues.
//!
//! * [`new_bounded`]: a ring of a fixed capacity.
//! * [`new_xadd`]: unbounded numbered chunks with a pool.
mod bounded;
#[cfg(all(test, not(ferroq_loom)))]
mod tests;
mod xadd;

pub use bounded::*;
pub use xadd::*;
