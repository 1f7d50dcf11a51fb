//! Model checks of the bounded rings. Run them with
//! `RUSTFLAGS="--cfg ferroq_loom" cargo test --release loom`.
use crate::{mpmc, mpsc, spmc, spsc};
use crate::{Consumer, MultiConsumer, MultiProducer, Producer};
use loom::thread;

const VALUES: usize = 3;

fn offer_or_yield<P: Producer<usize>>(producer: &mut P, mut value: usize) {
    while let Err(rejected) = producer.offer(value) {
        value = rejected;

        thread::yield_now();
    }
}

fn poll_or_yield<C: Consumer<usize>>(consumer: &mut C) -> usize {
    loop {
        if let Some(value) = consumer.poll() {
            return value;
        }

        thread::yield_now();
    }
}

#[test]
fn loom_spsc_bounded_keeps_order() {
    loom::model(|| {
        let (mut producer, mut consumer) = spsc::new_bounded(2).unwrap();

        let th = thread::spawn(move || {
            for i in 0..VALUES {
                offer_or_yield(&mut producer, i);
            }
        });

        for i in 0..VALUES {
            assert_eq!(poll_or_yield(&mut consumer), i);
        }

        th.join().unwrap();

        assert_eq!(consumer.poll(), None);
    });
}

#[test]
fn loom_mpsc_bounded_keeps_every_value() {
    loom::model(|| {
        let (producer, mut consumer) = mpsc::new_bounded(2).unwrap();
        let handles: Vec<_> = (0..2)
            .map(|id| {
                let mut producer = producer.clone();

                thread::spawn(move || offer_or_yield(&mut producer, id))
            })
            .collect();

        let first = poll_or_yield(&mut consumer);
        let second = poll_or_yield(&mut consumer);

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(first + second, 1);
        assert_eq!(consumer.poll(), None);
    });
}

#[test]
fn loom_mpsc_bounded_fail_fast_offer() {
    loom::model(|| {
        let (mut producer, mut consumer) = mpsc::new_bounded(1).unwrap();
        let mut other = producer.clone();

        let th = thread::spawn(move || other.fail_fast_offer(1).is_ok());

        let mine = producer.fail_fast_offer(2).is_ok();
        let theirs = th.join().unwrap();

        // One slot: at most one offer wins, and a loser sees it as full or contended.
        assert!(!(mine && theirs));
        assert_eq!(consumer.drain_all(drop), usize::from(mine) + usize::from(theirs));
    });
}

fn take_concurrently<P, C>(mut producer: P, consumer: &C)
where
    P: Producer<usize>,
    C: MultiConsumer<usize> + 'static,
{
    assert_eq!(producer.fill(|| 1, 2), 2);

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let mut consumer = consumer.clone();

            thread::spawn(move || consumer.poll())
        })
        .collect();

    let taken: usize = handles
        .into_iter()
        .map(|handle| handle.join().unwrap().unwrap_or(0))
        .sum();

    assert_eq!(taken, 2);
    assert!(consumer.is_empty());
}

#[test]
fn loom_spmc_bounded_consumers_take_each_value_once() {
    loom::model(|| {
        let (producer, consumer) = spmc::new_bounded(2).unwrap();

        take_concurrently(producer, &consumer);
    });
}

#[test]
fn loom_mpmc_bounded_consumers_take_each_value_once() {
    loom::model(|| {
        let (producer, consumer) = mpmc::new_bounded(2).unwrap();

        take_concurrently(producer, &consumer);
    });
}

fn spawn_offer<P: MultiProducer<usize> + 'static>(
    producer: &P,
    value: usize,
) -> thread::JoinHandle<()> {
    let mut producer = producer.clone();

    thread::spawn(move || offer_or_yield(&mut producer, value))
}

#[test]
fn loom_mpmc_bounded_offer_poll() {
    loom::model(|| {
        let (producer, consumer) = mpmc::new_bounded::<usize>(2).unwrap();

        let first = spawn_offer(&producer, 1);
        let second = spawn_offer(&producer, 2);
        let mut other = consumer.clone();
        let th = thread::spawn(move || poll_or_yield(&mut other));
        let mut consumer = consumer;
        let mine = poll_or_yield(&mut consumer);

        first.join().unwrap();
        second.join().unwrap();

        assert_eq!(mine + th.join().unwrap(), 3);
        assert_eq!(consumer.poll(), None);
    });
}
