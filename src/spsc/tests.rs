use crate::errors::QueueConfigError;
use crate::spsc::{new_bounded, new_chunked, new_growable, new_linked, new_unbounded};
use crate::test_lock::TEST_LOCK;
use crate::test_utils::{
    offer_with_backoff, poll_with_backoff, test_drops_left_values, test_fill_drain_equivalence,
    test_growth_keeps_order, test_offer_poll_in_order,
};
use crate::{
    BusySpinWait, Consumer as ConsumerExt, Producer as ProducerExt, SingleConsumer, FILL_BATCH,
};
use std::cell::Cell;
use std::thread::spawn;

fn test_spsc_multi_threaded_order<Producer, Consumer>(creator: fn() -> (Producer, Consumer))
where
    Producer: ProducerExt<usize> + Send + 'static,
    Consumer: ConsumerExt<usize> + Send + 'static,
{
    const N: usize = 1_000_000;

    let (mut producer, mut consumer) = creator();

    let t0 = spawn(move || {
        for i in 0..N {
            offer_with_backoff(&mut producer, i);
        }
    });

    for i in 0..N {
        assert_eq!(poll_with_backoff(&mut consumer), i);
    }

    t0.join().unwrap();

    assert_eq!(consumer.poll(), None);
}

fn test_spsc_multi_threaded_fill_drain<Producer, Consumer>(creator: fn() -> (Producer, Consumer))
where
    Producer: ProducerExt<usize> + Send + 'static,
    Consumer: ConsumerExt<usize> + Send + 'static,
{
    const N: usize = 500_000;
    const BATCH_SIZE: usize = 7;

    let (mut producer, mut consumer) = creator();

    let t0 = spawn(move || {
        let mut next = 0;

        while next < N {
            let limit = BATCH_SIZE.min(N - next);

            producer.fill(
                || {
                    next += 1;

                    next - 1
                },
                limit,
            );
        }
    });

    let mut expected = 0;

    while expected < N {
        consumer.drain(
            |value| {
                assert_eq!(value, expected);

                expected += 1;
            },
            BATCH_SIZE,
        );
    }

    t0.join().unwrap();

    assert!(consumer.is_empty());
}

#[test]
fn test_bounded_spsc_multi_threaded_order() {
    let test_guard = TEST_LOCK.lock();

    test_spsc_multi_threaded_order(|| new_bounded(256).unwrap());
    test_spsc_multi_threaded_fill_drain(|| new_bounded(256).unwrap());

    drop(test_guard);
}

#[test]
fn test_linked_spsc_multi_threaded_order() {
    let test_guard = TEST_LOCK.lock();

    test_spsc_multi_threaded_order(new_linked);
    test_spsc_multi_threaded_fill_drain(new_linked);

    drop(test_guard);
}

#[test]
fn test_linked_array_spsc_multi_threaded_order() {
    let test_guard = TEST_LOCK.lock();

    test_spsc_multi_threaded_order(|| new_chunked(16, 256).unwrap());
    test_spsc_multi_threaded_order(|| new_growable(16, 256).unwrap());
    test_spsc_multi_threaded_order(|| new_unbounded(16).unwrap());

    println!("Offers done, start fill and drain");

    test_spsc_multi_threaded_fill_drain(|| new_chunked(16, 256).unwrap());
    test_spsc_multi_threaded_fill_drain(|| new_growable(16, 256).unwrap());
    test_spsc_multi_threaded_fill_drain(|| new_unbounded(16).unwrap());

    drop(test_guard);
}

#[test]
fn test_spsc_single_threaded() {
    test_offer_poll_in_order(|| new_bounded(64).unwrap(), 64);
    test_offer_poll_in_order(new_linked, 100);
    test_offer_poll_in_order(|| new_chunked(8, 64).unwrap(), 64);
    test_offer_poll_in_order(|| new_growable(8, 64).unwrap(), 64);
    test_offer_poll_in_order(|| new_unbounded(16).unwrap(), 100);
}

#[test]
fn test_spsc_fill_drain_equivalence() {
    test_fill_drain_equivalence(|| new_bounded(64).unwrap(), 64);
    test_fill_drain_equivalence(new_linked, 100);
    test_fill_drain_equivalence(|| new_chunked(8, 64).unwrap(), 64);
    test_fill_drain_equivalence(|| new_growable(8, 64).unwrap(), 64);
    test_fill_drain_equivalence(|| new_unbounded(16).unwrap(), 100);
}

#[test]
fn test_spsc_drops_left_values() {
    test_drops_left_values(|| new_bounded(16).unwrap(), 10);
    test_drops_left_values(new_linked, 10);
    test_drops_left_values(|| new_chunked(8, 64).unwrap(), 30);
    test_drops_left_values(|| new_growable(8, 64).unwrap(), 30);
    test_drops_left_values(|| new_unbounded(16).unwrap(), 50);
}

#[test]
fn test_spsc_linked_array_growth() {
    const CHUNK: usize = 8;

    test_growth_keeps_order(|| new_chunked(CHUNK, 64).unwrap(), CHUNK * 5 + 3);
    test_growth_keeps_order(|| new_growable(CHUNK, 64).unwrap(), CHUNK * 5 + 3);
    test_growth_keeps_order(|| new_unbounded(16).unwrap(), 16 * 5 + 3);
}

#[test]
fn test_bounded_spsc_capacity() {
    let (mut producer, mut consumer) = new_bounded(16).unwrap();

    for i in 0..16 {
        assert_eq!(producer.offer(i), Ok(()));
    }

    assert_eq!(producer.offer(16), Err(16));
    assert_eq!(producer.relaxed_offer(16), Err(16));
    assert_eq!(producer.len(), 16);
    assert_eq!(producer.queue().current_producer_index(), 16);

    for i in 0..16 {
        assert_eq!(consumer.poll(), Some(i));
    }

    assert_eq!(consumer.poll(), None);
    assert_eq!(consumer.queue().current_consumer_index(), 16);

    // Small capacities are raised to 4.
    let (producer, _consumer) = new_bounded::<u8>(3).unwrap();

    assert_eq!(producer.capacity(), Some(4));
}

#[test]
fn test_chunked_spsc_capacity() {
    let (mut producer, mut consumer) = new_chunked(8, 32).unwrap();

    assert_eq!(producer.capacity(), Some(32));
    assert_eq!(producer.fill(|| 1, 100), 32);
    assert_eq!(producer.offer(2), Err(2));
    assert_eq!(consumer.poll(), Some(1));
    assert_eq!(producer.offer(2), Ok(()));
    assert_eq!(consumer.drain_all(drop), 32);
    assert_eq!(consumer.poll(), None);

    let (mut producer, _consumer) = new_growable(8, 32).unwrap();

    assert_eq!(producer.fill_all(|| 1), 32);
    assert_eq!(producer.offer(2), Err(2));
}

#[test]
fn test_spsc_peek() {
    let (mut producer, mut consumer) = new_linked();

    assert_eq!(consumer.peek(), None);

    producer.offer(String::from("first")).unwrap();
    producer.offer(String::from("second")).unwrap();

    assert_eq!(consumer.peek_with(String::len), Some(5));
    assert_eq!(consumer.relaxed_peek().as_deref(), Some("first"));
    assert_eq!(consumer.poll().as_deref(), Some("first"));

    consumer.clear();

    assert!(consumer.is_empty());
    assert_eq!(consumer.relaxed_peek_with(String::len), None);

    let (mut producer, consumer) = new_unbounded(16).unwrap();

    // The head sits in the second chunk.
    for i in 0..20 {
        producer.offer(i).unwrap();
    }

    let mut consumer = consumer;

    for _ in 0..17 {
        consumer.poll();
    }

    assert_eq!(consumer.peek(), Some(17));
}

#[test]
fn test_spsc_config_errors() {
    assert_eq!(
        new_bounded::<u8>(0).err(),
        Some(QueueConfigError::CapacityTooSmall {
            requested: 0,
            min: 1
        })
    );
    assert_eq!(
        new_chunked::<u8>(4, 64).err(),
        Some(QueueConfigError::CapacityTooSmall {
            requested: 4,
            min: 8
        })
    );
    assert_eq!(
        new_chunked::<u8>(8, 8).err(),
        Some(QueueConfigError::CapacityTooSmall {
            requested: 8,
            min: 16
        })
    );
    assert_eq!(
        new_growable::<u8>(20, 32).err(),
        Some(QueueConfigError::ChunkNotSmallerThanCapacity {
            chunk: 32,
            capacity: 32
        })
    );
    assert_eq!(new_unbounded::<u8>(1).unwrap().0.capacity(), None);
}

#[test]
fn test_spsc_forever_loops() {
    let (mut producer, mut consumer) = new_unbounded(16).unwrap();
    let next = Cell::new(0);
    let mut rounds = 3;

    producer.fill_forever(
        || {
            next.set(next.get() + 1);

            next.get() - 1
        },
        BusySpinWait,
        || {
            rounds -= 1;

            rounds >= 0
        },
    );

    assert_eq!(next.get(), 3 * FILL_BATCH);

    let mut expected = 0;
    let mut idle_rounds = 0;
    let mut rounds = 5;

    consumer.drain_forever(
        |value| {
            assert_eq!(value, expected);

            expected += 1;
        },
        |counter: u32| {
            idle_rounds += 1;

            counter + 1
        },
        || {
            rounds -= 1;

            rounds >= 0
        },
    );

    assert_eq!(expected, 3 * FILL_BATCH);
    assert_eq!(idle_rounds, 2);
}
