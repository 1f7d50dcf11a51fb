//! Test drivers shared by the queue families.
use crate::backoff::Backoff;
use crate::{Consumer, Producer};
use std::fmt::Debug;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// A value that counts its drops.
#[derive(Debug)]
pub(crate) struct DropCounter(pub(crate) Arc<AtomicUsize>);

impl Drop for DropCounter {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

/// Offers until the queue takes the value.
pub(crate) fn offer_with_backoff<T, P: Producer<T>>(producer: &mut P, mut value: T) {
    let backoff = Backoff::new();

    loop {
        match producer.offer(value) {
            Ok(()) => return,
            Err(rejected) => value = rejected,
        }

        backoff.snooze();
    }
}

/// Polls until the queue hands out a value.
pub(crate) fn poll_with_backoff<T, C: Consumer<T>>(consumer: &mut C) -> T {
    let backoff = Backoff::new();

    loop {
        if let Some(value) = consumer.poll() {
            return value;
        }

        backoff.snooze();
    }
}

/// Offers `0..n` and polls them back in order on one thread.
pub(crate) fn test_offer_poll_in_order<P, C>(creator: impl Fn() -> (P, C), n: usize)
where
    P: Producer<usize>,
    C: Consumer<usize>,
{
    let (mut producer, mut consumer) = creator();

    for round in 0..3 {
        for i in 0..n {
            assert_eq!(producer.offer(i), Ok(()), "round {round}, offer {i}");
        }

        assert_eq!(consumer.len(), n);
        assert!(!producer.is_empty());

        for i in 0..n {
            assert_eq!(consumer.poll(), Some(i), "round {round}");
        }

        assert_eq!(consumer.poll(), None);
        assert_eq!(consumer.relaxed_poll(), None);
        assert!(consumer.is_empty());
    }
}

/// Checks that `fill(k)` then `drain(k)` yields what `k` offer/poll pairs yield.
pub(crate) fn test_fill_drain_equivalence<P, C>(creator: impl Fn() -> (P, C), k: usize)
where
    P: Producer<usize>,
    C: Consumer<usize>,
{
    let supplier = |next: &mut usize| {
        *next += 1;

        *next * 7
    };

    let (mut producer, mut consumer) = creator();
    let mut next = 0;
    let mut batched = Vec::with_capacity(k);

    assert_eq!(producer.fill(|| supplier(&mut next), k), k);
    assert_eq!(consumer.drain(|value| batched.push(value), k), k);
    assert_eq!(consumer.drain(|_| unreachable!(), k), 0);

    let (mut producer, mut consumer) = creator();
    let mut next = 0;
    let mut sequential = Vec::with_capacity(k);

    for _ in 0..k {
        producer.offer(supplier(&mut next)).unwrap();
        sequential.push(consumer.poll().unwrap());
    }

    assert_eq!(batched, sequential);
    assert_eq!(producer.fill(|| unreachable!(), 0), 0);
}

/// Checks that dropping the queue drops every value still in it exactly once.
pub(crate) fn test_drops_left_values<P, C>(creator: impl Fn() -> (P, C), n: usize)
where
    P: Producer<DropCounter>,
    C: Consumer<DropCounter>,
{
    let drops = Arc::new(AtomicUsize::new(0));
    let (mut producer, mut consumer) = creator();

    for _ in 0..n {
        producer.offer(DropCounter(drops.clone())).unwrap();
    }

    drop(consumer.poll());

    assert_eq!(drops.load(Ordering::SeqCst), 1);

    drop(producer);
    drop(consumer);

    assert_eq!(drops.load(Ordering::SeqCst), n);
}

/// Offers `n` values past one chunk and drains them single-threaded, in order.
pub(crate) fn test_growth_keeps_order<P, C>(creator: impl Fn() -> (P, C), n: usize)
where
    P: Producer<usize>,
    C: Consumer<usize>,
{
    let (mut producer, mut consumer) = creator();

    for i in 0..n {
        assert_eq!(producer.offer(i), Ok(()), "offer {i}");
    }

    let mut expected = 0;

    consumer.drain_all(|value| {
        assert_eq!(value, expected);

        expected += 1;
    });

    assert_eq!(expected, n);
    assert!(consumer.is_empty());
}

/// Asserts that `values` holds every value of `0..n` exactly once.
pub(crate) fn assert_each_once<T: Copy + Debug + Into<usize>>(values: &[T], n: usize) {
    let mut seen = vec![0; n];

    for &value in values {
        seen[value.into()] += 1;
    }

    for (value, count) in seen.iter().enumerate() {
        assert_eq!(*count, 1, "value {value} was seen {count} times");
    }
}
