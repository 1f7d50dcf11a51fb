//! Construction-time validation and rounding of queue parameters.
use crate::errors::QueueConfigError;
use std::num::NonZeroUsize;

/// The largest power of two a `usize` holds.
pub(crate) const MAX_POW2: usize = 1 << (usize::BITS - 1);

/// Returns `value` rounded up to a power of two after checking that it is at least `min`.
pub(crate) fn round_capacity(value: usize, min: usize) -> Result<usize, QueueConfigError> {
    if value < min {
        return Err(QueueConfigError::CapacityTooSmall {
            requested: value,
            min,
        });
    }

    value
        .checked_next_power_of_two()
        .ok_or(QueueConfigError::CapacityTooLarge {
            requested: value,
            max: MAX_POW2,
        })
}

/// Checks that a rounded chunk is smaller than the rounded maximum capacity.
pub(crate) fn check_chunk_below(chunk: usize, capacity: usize) -> Result<(), QueueConfigError> {
    if chunk >= capacity {
        return Err(QueueConfigError::ChunkNotSmallerThanCapacity { chunk, capacity });
    }

    Ok(())
}

/// The number of lanes a [`compound queue`](crate::mpsc::new_compound) spreads its
/// producers over.
///
/// It is a construction parameter, never global state: pass a fixed value, or
/// [`Parallelism::available`] to match the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Parallelism(usize);

impl Parallelism {
    /// Creates a parallelism of `n` lanes.
    pub const fn new(n: usize) -> Self {
        Self(n)
    }

    /// Returns the parallelism the OS reports for this process, or `1` if it can't tell.
    pub fn available() -> Self {
        Self(std::thread::available_parallelism().map_or(1, NonZeroUsize::get))
    }

    /// Returns the requested number of lanes.
    pub const fn get(self) -> usize {
        self.0
    }

    /// Returns the number of lanes actually used: the largest power of two not above
    /// the requested one.
    pub(crate) fn lanes(self) -> Result<usize, QueueConfigError> {
        if self.0 == 0 {
            return Err(QueueConfigError::ZeroParallelism);
        }

        Ok(1 << self.0.ilog2())
    }
}

impl Default for Parallelism {
    fn default() -> Self {
        Self::available()
    }
}
