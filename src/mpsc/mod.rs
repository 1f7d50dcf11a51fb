//! This module provides the multi-producer, single-consumer queues.
//!
//! * [`new_bounded`]: a ring of a fixed capacity.
//! * [`new_compound`]: several bounded rings that spread the producers.
//! * [`new_linked`]: an unbounded list of nodes.
//! * [`new_chunked`], [`new_growable`] and [`new_unbounded`]: rings of linked chunks, up to
//!   a maximum capacity or without limit.
//! * [`new_xadd`]: unbounded numbered chunks with a pool.
mod bounded;
mod compound;
mod linked;
mod linked_array;
mod xadd;

pub use bounded::*;
pub use compound::*;
pub use linked::*;
pub use linked_array::*;
pub use xadd::*;
