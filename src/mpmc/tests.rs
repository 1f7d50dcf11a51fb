use crate::backoff::Backoff;
use crate::errors::QueueConfigError;
use crate::mpmc::{new_bounded, new_xadd};
use crate::test_lock::TEST_LOCK;
use crate::test_utils::{
    assert_each_once, test_drops_left_values, test_fill_drain_equivalence,
    test_growth_keeps_order, test_offer_poll_in_order,
};
use crate::{Consumer, MultiConsumer, MultiProducer, Producer};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread::spawn;

fn test_mpmc_offer_poll<P, C>(creator: fn() -> (P, C))
where
    P: MultiProducer<usize> + 'static,
    C: MultiConsumer<usize> + 'static,
{
    const N: usize = 200_000;
    const PAR_MULTIPLIER: usize = 3;

    let (producer, consumer) = creator();
    let received = Arc::new(AtomicUsize::new(0));
    let mut handles = Vec::new();

    for _ in 0..PAR_MULTIPLIER {
        let mut producer = producer.clone();

        handles.push(spawn(move || {
            for i in 1..=N {
                let backoff = Backoff::new();
                let mut value = i;

                while let Err(rejected) = producer.offer(value) {
                    value = rejected;

                    backoff.snooze();
                }
            }
        }));

        let mut consumer = consumer.clone();
        let received = received.clone();

        handles.push(spawn(move || {
            for _ in 0..N {
                let backoff = Backoff::new();

                loop {
                    if let Some(value) = consumer.poll() {
                        received.fetch_add(value, Ordering::Relaxed);

                        break;
                    }

                    backoff.snooze();
                }
            }
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(
        N * PAR_MULTIPLIER * (1 + N) / 2,
        received.load(Ordering::Relaxed)
    );
    assert!(consumer.is_empty());
}

fn test_mpmc_fill_drain<P, C>(creator: fn() -> (P, C))
where
    P: MultiProducer<usize> + 'static,
    C: MultiConsumer<usize> + 'static,
{
    const N: usize = 100_000;
    const PAR_MULTIPLIER: usize = 2;
    const BATCH_SIZE: usize = 6;

    let (producer, consumer) = creator();
    let received = Arc::new(AtomicUsize::new(0));
    let mut handles = Vec::new();
    let mut collectors = Vec::new();

    for id in 0..PAR_MULTIPLIER {
        let mut producer = producer.clone();

        handles.push(spawn(move || {
            let mut i = 0;
            let backoff = Backoff::new();

            while i < N {
                let limit = BATCH_SIZE.min(N - i);
                let filled = producer.fill(
                    || {
                        i += 1;

                        id * N + i - 1
                    },
                    limit,
                );

                if filled == 0 {
                    backoff.snooze();
                }
            }
        }));

        let mut consumer = consumer.clone();
        let received = received.clone();

        collectors.push(spawn(move || {
            let mut values = Vec::new();
            let backoff = Backoff::new();

            while received.load(Ordering::Relaxed) < N * PAR_MULTIPLIER {
                let drained = consumer.drain(|value| values.push(value), BATCH_SIZE);

                if drained == 0 {
                    backoff.snooze();
                } else {
                    received.fetch_add(drained, Ordering::Relaxed);
                }
            }

            values
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }

    let mut all = Vec::with_capacity(N * PAR_MULTIPLIER);

    for collector in collectors {
        all.extend(collector.join().unwrap());
    }

    assert_each_once(&all, N * PAR_MULTIPLIER);
}

#[test]
fn test_bounded_mpmc_multi_threaded_offer_poll() {
    let test_guard = TEST_LOCK.lock();

    test_mpmc_offer_poll(|| new_bounded(2048).unwrap());
    test_mpmc_offer_poll(|| new_bounded(2).unwrap());
    test_mpmc_fill_drain(|| new_bounded(256).unwrap());

    drop(test_guard);
}

#[test]
fn test_xadd_mpmc_multi_threaded_offer_poll() {
    let test_guard = TEST_LOCK.lock();

    test_mpmc_offer_poll(|| new_xadd(64, 2).unwrap());

    println!("Pooled done, start unpooled");

    test_mpmc_offer_poll(|| new_xadd(16, 0).unwrap());
    test_mpmc_fill_drain(|| new_xadd(32, 2).unwrap());

    drop(test_guard);
}

#[test]
fn test_bounded_mpmc_concurrent_consumers_take_each_value_once() {
    const CONSUMERS: usize = 4;

    let (mut producer, consumer) = new_bounded::<usize>(8).unwrap();

    for i in 0..8 {
        producer.offer(i).unwrap();
    }

    let barrier = Arc::new(Barrier::new(CONSUMERS));
    let handles: Vec<_> = (0..CONSUMERS)
        .map(|_| {
            let mut consumer = consumer.clone();
            let barrier = barrier.clone();

            spawn(move || {
                let mut values = Vec::new();

                barrier.wait();

                while let Some(value) = consumer.poll() {
                    values.push(value);
                }

                values
            })
        })
        .collect();

    let mut all = Vec::new();

    for handle in handles {
        all.extend(handle.join().unwrap());
    }

    assert_each_once(&all, 8);
    assert!(consumer.is_empty());
}

#[test]
fn test_xadd_mpmc_pooled_chunks_hold_no_stale_values() {
    const CHUNK: usize = 4;
    const LAPS: usize = 50;

    let (mut producer, mut consumer) = new_xadd(CHUNK, 2).unwrap();
    let mut other = consumer.clone();

    for lap in 0..LAPS {
        // Three chunks per lap, more than the pool keeps.
        for i in 0..CHUNK * 3 {
            producer.offer(lap * 1000 + i).unwrap();
        }

        for i in 0..CHUNK * 3 {
            let consumer = if i % 2 == 0 { &mut consumer } else { &mut other };

            assert_eq!(consumer.peek(), Some(lap * 1000 + i));
            assert_eq!(consumer.poll(), Some(lap * 1000 + i), "lap {lap}");
        }

        assert_eq!(consumer.poll(), None);
        assert_eq!(other.relaxed_poll(), None);
        assert_eq!(other.peek(), None);
    }

    assert_eq!(
        consumer.queue().current_consumer_index(),
        (LAPS * CHUNK * 3) as u64
    );
}

#[test]
fn test_mpmc_single_threaded() {
    test_offer_poll_in_order(|| new_bounded(64).unwrap(), 64);
    test_offer_poll_in_order(|| new_bounded(2).unwrap(), 2);
    test_offer_poll_in_order(|| new_xadd(8, 2).unwrap(), 100);
    test_offer_poll_in_order(|| new_xadd(8, 0).unwrap(), 100);
    test_growth_keeps_order(|| new_xadd(8, 2).unwrap(), 8 * 5 + 3);
}

#[test]
fn test_mpmc_fill_drain_equivalence() {
    test_fill_drain_equivalence(|| new_bounded(64).unwrap(), 64);
    test_fill_drain_equivalence(|| new_xadd(8, 2).unwrap(), 100);
    test_fill_drain_equivalence(|| new_xadd(8, 0).unwrap(), 100);
}

#[test]
fn test_mpmc_drops_left_values() {
    test_drops_left_values(|| new_bounded(16).unwrap(), 10);
    test_drops_left_values(|| new_xadd(4, 2).unwrap(), 30);
    test_drops_left_values(|| new_xadd(4, 0).unwrap(), 30);
}

#[test]
fn test_bounded_mpmc_capacity() {
    let (mut producer, mut consumer) = new_bounded(3).unwrap();

    assert_eq!(producer.capacity(), Some(4));
    assert_eq!(producer.fill_all(|| 1), 4);
    assert_eq!(producer.offer(2), Err(2));
    assert_eq!(consumer.relaxed_peek(), Some(1));
    assert_eq!(consumer.poll(), Some(1));
    assert_eq!(producer.relaxed_offer(2), Ok(()));
    assert_eq!(producer.queue().current_producer_index(), 5);
    assert_eq!(consumer.drain_all(drop), 4);
    assert_eq!(consumer.peek(), None);
}

#[test]
fn test_mpmc_config_errors() {
    assert_eq!(
        new_bounded::<u8>(1).err(),
        Some(QueueConfigError::CapacityTooSmall {
            requested: 1,
            min: 2
        })
    );
    assert_eq!(
        new_xadd::<u8>(0, 2).err(),
        Some(QueueConfigError::CapacityTooSmall {
            requested: 0,
            min: 2
        })
    );
}
