//! This module provides the single-producer, single-consumer queues.
//!
//! * [`new_bounded`]: a ring of a fixed capacity.
//! * [`new_linked`]: an unbounded list of nodes.
//! * [`new_chunked`], [`new_growable`] and [`new_unbounded`]: rings of linked chunks, up to
//!   a maximum capacity or without limit.
mod bounded;
mod linked;
mod linked_array;
#[cfg(all(test, not(ferroq_loom)))]
mod tests;

pub use bounded::*;
pub use linked::*;
pub use linked_array::*;
