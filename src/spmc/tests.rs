use crate::backoff::Backoff;
use crate::errors::QueueConfigError;
use crate::spmc::new_bounded;
use crate::test_lock::TEST_LOCK;
use crate::test_utils::{
    assert_each_once, offer_with_backoff, test_drops_left_values, test_fill_drain_equivalence,
    test_offer_poll_in_order,
};
use crate::{Consumer, MultiConsumer, Producer};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::spawn;

const CONSUMERS: usize = 3;

/// One producer offers `0..N`, `CONSUMERS` threads take them with `take`. Checks that every
/// value is taken exactly once.
fn test_spmc_multi_threaded_each_once<P, C>(
    creator: fn() -> (P, C),
    take: fn(&mut C, &mut Vec<usize>) -> usize,
) where
    P: Producer<usize> + Send + 'static,
    C: MultiConsumer<usize> + 'static,
{
    const N: usize = 500_000;

    let (mut producer, consumer) = creator();
    let received = Arc::new(AtomicUsize::new(0));
    let mut handles = Vec::with_capacity(CONSUMERS);

    for _ in 0..CONSUMERS {
        let mut consumer = consumer.clone();
        let received = received.clone();

        handles.push(spawn(move || {
            let mut values = Vec::new();
            let backoff = Backoff::new();

            while received.load(Ordering::Relaxed) < N {
                let taken = take(&mut consumer, &mut values);

                if taken == 0 {
                    backoff.snooze();
                } else {
                    received.fetch_add(taken, Ordering::Relaxed);
                    backoff.reset();
                }
            }

            values
        }));
    }

    for i in 0..N {
        offer_with_backoff(&mut producer, i);
    }

    let mut all = Vec::with_capacity(N);

    for handle in handles {
        all.extend(handle.join().unwrap());
    }

    assert_each_once(&all, N);
    assert!(consumer.is_empty());
}

#[test]
fn test_bounded_spmc_multi_threaded_poll() {
    let test_guard = TEST_LOCK.lock();

    test_spmc_multi_threaded_each_once(
        || new_bounded::<usize>(256).unwrap(),
        |consumer, values| {
            consumer.poll().map_or(0, |value| {
                values.push(value);

                1
            })
        },
    );

    drop(test_guard);
}

#[test]
fn test_bounded_spmc_multi_threaded_drain() {
    let test_guard = TEST_LOCK.lock();

    test_spmc_multi_threaded_each_once(
        || new_bounded::<usize>(256).unwrap(),
        |consumer, values| consumer.drain(|value| values.push(value), 7),
    );

    drop(test_guard);
}

#[test]
fn test_spmc_single_threaded() {
    test_offer_poll_in_order(|| new_bounded(64).unwrap(), 64);
    test_offer_poll_in_order(|| new_bounded(1).unwrap(), 1);
    test_fill_drain_equivalence(|| new_bounded(64).unwrap(), 64);
    test_drops_left_values(|| new_bounded(16).unwrap(), 10);
}

#[test]
fn test_bounded_spmc_capacity() {
    let (mut producer, mut consumer) = new_bounded(5).unwrap();

    assert_eq!(producer.capacity(), Some(8));
    assert_eq!(producer.fill(|| 3, 100), 8);
    assert_eq!(producer.offer(4), Err(4));
    assert_eq!(producer.relaxed_offer(4), Err(4));

    let mut other = consumer.clone();

    assert_eq!(other.drain(drop, 5), 5);
    assert_eq!(consumer.len(), 3);
    assert_eq!(consumer.queue().current_consumer_index(), 5);
    assert_eq!(producer.fill_all(|| 4), 5);
    assert_eq!(consumer.drain_all(drop), 8);
    assert_eq!(other.relaxed_poll(), None);
}

#[test]
fn test_spmc_peek() {
    let (mut producer, consumer) = new_bounded(4).unwrap();
    let mut other = consumer.clone();

    assert_eq!(consumer.peek(), None);
    assert_eq!(consumer.relaxed_peek(), None);

    producer.offer(1).unwrap();
    producer.offer(2).unwrap();

    assert_eq!(consumer.peek(), Some(1));
    assert_eq!(other.poll(), Some(1));
    assert_eq!(consumer.relaxed_peek(), Some(2));
    assert_eq!(other.poll(), Some(2));
    assert_eq!(consumer.peek(), None);
}

#[test]
fn test_spmc_config_errors() {
    assert_eq!(
        new_bounded::<u8>(0).err(),
        Some(QueueConfigError::CapacityTooSmall {
            requested: 0,
            min: 1
        })
    );
}
