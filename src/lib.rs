//! Lock-free queues for passing values between the threads of one process.
//!
//! The queues come in every producer/consumer cardinality, one module each:
//! [`spsc`], [`mpsc`], [`spmc`] and [`mpmc`]. Every queue is created as a
//! `(producer, consumer)` pair of handles that implement [`Producer`] and [`Consumer`]:
//!
//! * Bounded rings of a fixed capacity.
//! * Linked lists of nodes, unbounded.
//! * Rings of linked chunks that grow up to a maximum capacity, or without limit.
//! * `Xadd` queues of numbered chunks, unbounded, with a pool of reused chunks.
//!
//! No operation blocks. A full queue hands the value back from `offer`, an empty one
//! returns `None` from `poll`. The "relaxed" variants may give up early but never spin.
//!
//! # Examples
//!
//! ```
//! use ferroq::{spsc, Consumer, Producer};
//! use std::thread;
//!
//! let (mut producer, mut consumer) = spsc::new_bounded(64).unwrap();
//!
//! let handle = thread::spawn(move || {
//!     for i in 0..100 {
//!         while producer.offer(i).is_err() {
//!             thread::yield_now();
//!         }
//!     }
//! });
//!
//! let mut received = 0;
//!
//! while received < 100 {
//!     if let Some(value) = consumer.poll() {
//!         assert_eq!(value, received);
//!         received += 1;
//!     }
//! }
//!
//! handle.join().unwrap();
//! ```
#![deny(clippy::all)]
#![deny(clippy::assertions_on_result_states)]
#![deny(clippy::match_wild_err_arm)]
#![deny(clippy::allow_attributes_without_reason)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(clippy::cargo)]
#![allow(
    clippy::missing_const_for_fn,
    reason = "Since we cannot make a constant function non-constant after its release,
    we need to look for a reason to make it constant, and not vice versa."
)]
#![allow(clippy::inline_always, reason = "We write highly optimized code.")]
#![allow(
    clippy::must_use_candidate,
    reason = "It is better to developer think about it."
)]
#![allow(
    clippy::module_name_repetitions,
    reason = "This is acceptable most of the time."
)]
#![allow(
    clippy::missing_errors_doc,
    reason = "Unless the error is something special,
    the developer should document it."
)]
#![allow(clippy::redundant_pub_crate, reason = "It improves readability.")]
#![allow(clippy::struct_field_names, reason = "It improves readability.")]
#![allow(
    clippy::module_inception,
    reason = "It is fine if a file in has the same mane as a module."
)]
#![allow(clippy::if_not_else, reason = "It improves readability.")]
#![allow(
    rustdoc::private_intra_doc_links,
    reason = "It allows to create more readable docs."
)]
#![allow(
    clippy::result_unit_err,
    reason = "The function's doc should explain what it returns."
)]
mod access;
pub mod backoff;
pub mod cache_padded;
mod chunk;
mod config;
mod consumer;
mod errors;
mod handles;
mod hints;
mod light_arc;
mod linked;
#[cfg(all(ferroq_loom, test))]
mod loom;
mod loom_bindings;
pub mod mpmc;
pub mod mpsc;
mod producer;
pub mod spmc;
pub mod spsc;
#[cfg(all(test, not(ferroq_loom)))]
mod test_lock;
#[cfg(all(test, not(ferroq_loom)))]
mod test_utils;
mod wait;
mod xadd;

pub use backoff::Backoff;
pub use config::Parallelism;
pub use consumer::{Consumer, MultiConsumer, SingleConsumer};
pub use errors::{QueueConfigError, TryOfferError};
pub use producer::{MultiProducer, Producer, FILL_BATCH, UNBOUNDED_FILL_LIMIT};
pub use wait::{BackoffWait, BusySpinWait, ExitCondition, WaitStrategy, YieldWait};
pub use xadd::DEFAULT_MAX_POOLED_CHUNKS;
