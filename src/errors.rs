//! This module provides the errors of the crate.
use std::fmt;
use thiserror::Error;

/// Rejected construction parameters.
///
/// Construction is the only fallible step of a queue; once created, a queue reports
/// fullness and emptiness by value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QueueConfigError {
    /// A capacity or chunk size is below what the queue can work with.
    #[error("capacity {requested} is too small, the minimum is {min}")]
    CapacityTooSmall {
        /// The requested value.
        requested: usize,
        /// The smallest accepted value.
        min: usize,
    },
    /// A capacity or chunk size cannot be rounded up to a power of two in a `usize`.
    #[error("capacity {requested} is too large, the maximum is {max}")]
    CapacityTooLarge {
        /// The requested value.
        requested: usize,
        /// The largest accepted value.
        max: usize,
    },
    /// The chunk of a chunked or growable queue must be smaller than its maximum capacity.
    #[error("chunk size {chunk} must be smaller than the maximum capacity {capacity}")]
    ChunkNotSmallerThanCapacity {
        /// The chunk size after rounding.
        chunk: usize,
        /// The maximum capacity after rounding.
        capacity: usize,
    },
    /// A compound queue needs at least one lane.
    #[error("parallelism must be at least 1")]
    ZeroParallelism,
    /// Every lane of a compound queue needs at least one slot.
    #[error("capacity {capacity} cannot be split across {lanes} lanes")]
    FewerSlotsThanLanes {
        /// The capacity after rounding.
        capacity: usize,
        /// The number of lanes.
        lanes: usize,
    },
}

/// The error of [`MPSCBoundedQueue::fail_fast_offer`](crate::mpsc::MPSCBoundedQueue::fail_fast_offer).
///
/// Both variants hand the value back.
pub enum TryOfferError<T> {
    /// The queue was full.
    Full(T),
    /// Another producer claimed the slot first, the queue may still have room.
    Contended(T),
}

impl<T> TryOfferError<T> {
    /// Returns the rejected value.
    pub fn into_inner(self) -> T {
        match self {
            Self::Full(value) | Self::Contended(value) => value,
        }
    }

    /// Returns `true` if the queue was full.
    pub fn is_full(&self) -> bool {
        matches!(self, Self::Full(_))
    }
}

impl<T> fmt::Debug for TryOfferError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full(_) => write!(f, "full"),
            Self::Contended(_) => write!(f, "contended"),
        }
    }
}

impl<T> fmt::Display for TryOfferError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full(_) => write!(f, "the queue is full"),
            Self::Contended(_) => write!(f, "another producer claimed the slot"),
        }
    }
}

impl<T> std::error::Error for TryOfferError<T> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_messages() {
        assert_eq!(
            QueueConfigError::CapacityTooSmall {
                requested: 0,
                min: 1
            }
            .to_string(),
            "capacity 0 is too small, the minimum is 1"
        );
        assert_eq!(
            QueueConfigError::FewerSlotsThanLanes {
                capacity: 2,
                lanes: 4
            }
            .to_string(),
            "capacity 2 cannot be split across 4 lanes"
        );
    }

    #[test]
    fn test_try_offer_error_hands_back_the_value() {
        struct NotDebug(u8);

        let full = TryOfferError::Full(NotDebug(1));
        let contended = TryOfferError::Contended(NotDebug(2));

        assert_eq!(format!("{full:?}"), "full");
        assert!(full.is_full());
        assert!(!contended.is_full());
        assert_eq!(full.into_inner().0, 1);
        assert_eq!(contended.into_inner().0, 2);
    }
}
