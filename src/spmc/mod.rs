//! This module provides the single-producer, multi-consumer queue: [`new_bounded`].
mod bounded;
#[cfg(all(test, not(ferroq_loom)))]
mod tests;

pub use bounded::*;
