use criterion::{criterion_group, criterion_main, Criterion};
use crossbeam_queue::{ArrayQueue, SegQueue};
use ferroq::{mpmc, mpsc, spmc, spsc, Consumer, Parallelism, Producer};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

/// The queue operations the benchmarks measure, so crossbeam queues run the same loops.
pub trait BenchQueue: Send + 'static {
    fn push(&mut self, value: usize) -> Result<(), usize>;

    fn pop(&mut self) -> Option<usize>;
}

pub struct Handles<P, C> {
    producer: P,
    consumer: C,
}

impl<P, C> BenchQueue for Handles<P, C>
where
    P: Producer<usize> + Send + 'static,
    C: Consumer<usize> + Send + 'static,
{
    fn push(&mut self, value: usize) -> Result<(), usize> {
        self.producer.offer(value)
    }

    fn pop(&mut self) -> Option<usize> {
        self.consumer.poll()
    }
}

pub struct CrossbeamArray(Arc<ArrayQueue<usize>>);

impl BenchQueue for CrossbeamArray {
    fn push(&mut self, value: usize) -> Result<(), usize> {
        self.0.push(value)
    }

    fn pop(&mut self) -> Option<usize> {
        self.0.pop()
    }
}

pub struct CrossbeamSeg(Arc<SegQueue<usize>>);

impl BenchQueue for CrossbeamSeg {
    fn push(&mut self, value: usize) -> Result<(), usize> {
        self.0.push(value);

        Ok(())
    }

    fn pop(&mut self) -> Option<usize> {
        self.0.pop()
    }
}

fn handles<P, C>((producer, consumer): (P, C)) -> Handles<P, C> {
    Handles { producer, consumer }
}

// Single-threaded benchmark.
//
// `N` items are pushed and then popped from the queue.
pub fn push_pop<Q: BenchQueue, const N: usize>(name: &str, mut queue: Q, c: &mut Criterion) {
    c.bench_function(&format!("push_pop-{name}"), |b| {
        b.iter_custom(|iters| {
            let start = Instant::now();

            for _ in 0..iters {
                for i in 0..N {
                    let _ = queue.push(i);
                }

                for _ in 0..N {
                    let _ = queue.pop();
                }
            }

            start.elapsed() / N as _
        });
    });
}

// Two-thread benchmark.
//
// One thread pushes `N` items while the other pops them.
pub fn ping_pong<P, C, const N: usize>(name: &str, creator: fn() -> (P, C), c: &mut Criterion)
where
    P: Producer<usize> + Send + 'static,
    C: Consumer<usize> + Send + 'static,
{
    c.bench_function(&format!("ping_pong-{name}"), |b| {
        b.iter_custom(|iters| {
            let (mut producer, mut consumer) = creator();
            let start = Instant::now();

            let pusher = thread::spawn(move || {
                for i in 0..iters as usize * N {
                    let mut value = i;

                    while let Err(rejected) = producer.offer(value) {
                        value = rejected;

                        std::hint::spin_loop();
                    }
                }
            });

            let mut popped = 0;

            while popped < iters as usize * N {
                popped += consumer.drain(drop, 64);
            }

            pusher.join().unwrap();

            start.elapsed() / N as _
        });
    });
}

// region push_pop small

pub fn push_pop_small_crossbeam_array_queue(c: &mut Criterion) {
    push_pop::<_, 8>(
        "small-crossbeam_array_queue",
        CrossbeamArray(Arc::new(ArrayQueue::new(256))),
        c,
    );
}

pub fn push_pop_small_crossbeam_seg_queue(c: &mut Criterion) {
    push_pop::<_, 8>(
        "small-crossbeam_seg_queue",
        CrossbeamSeg(Arc::new(SegQueue::new())),
        c,
    );
}

pub fn push_pop_small_ferroq_spsc_bounded(c: &mut Criterion) {
    push_pop::<_, 8>("small-ferroq_spsc_bounded", handles(spsc::new_bounded(256).unwrap()), c);
}

pub fn push_pop_small_ferroq_spsc_unbounded(c: &mut Criterion) {
    push_pop::<_, 8>("small-ferroq_spsc_unbounded", handles(spsc::new_unbounded(64).unwrap()), c);
}

pub fn push_pop_small_ferroq_mpsc_bounded(c: &mut Criterion) {
    push_pop::<_, 8>("small-ferroq_mpsc_bounded", handles(mpsc::new_bounded(256).unwrap()), c);
}

pub fn push_pop_small_ferroq_mpsc_xadd(c: &mut Criterion) {
    push_pop::<_, 8>("small-ferroq_mpsc_xadd", handles(mpsc::new_xadd(64, 2).unwrap()), c);
}

pub fn push_pop_small_ferroq_spmc_bounded(c: &mut Criterion) {
    push_pop::<_, 8>("small-ferroq_spmc_bounded", handles(spmc::new_bounded(256).unwrap()), c);
}

pub fn push_pop_small_ferroq_mpmc_bounded(c: &mut Criterion) {
    push_pop::<_, 8>("small-ferroq_mpmc_bounded", handles(mpmc::new_bounded(256).unwrap()), c);
}

// endregion

// region push_pop large

pub fn push_pop_large_crossbeam_array_queue(c: &mut Criterion) {
    push_pop::<_, 256>(
        "large-crossbeam_array_queue",
        CrossbeamArray(Arc::new(ArrayQueue::new(256))),
        c,
    );
}

pub fn push_pop_large_crossbeam_seg_queue(c: &mut Criterion) {
    push_pop::<_, 256>(
        "large-crossbeam_seg_queue",
        CrossbeamSeg(Arc::new(SegQueue::new())),
        c,
    );
}

pub fn push_pop_large_ferroq_spsc_bounded(c: &mut Criterion) {
    push_pop::<_, 256>("large-ferroq_spsc_bounded", handles(spsc::new_bounded(256).unwrap()), c);
}

pub fn push_pop_large_ferroq_spsc_growable(c: &mut Criterion) {
    push_pop::<_, 256>(
        "large-ferroq_spsc_growable",
        handles(spsc::new_growable(16, 256).unwrap()),
        c,
    );
}

pub fn push_pop_large_ferroq_mpsc_linked(c: &mut Criterion) {
    push_pop::<_, 256>("large-ferroq_mpsc_linked", handles(mpsc::new_linked()), c);
}

pub fn push_pop_large_ferroq_mpsc_compound(c: &mut Criterion) {
    push_pop::<_, 256>(
        "large-ferroq_mpsc_compound",
        handles(mpsc::new_compound(256, Parallelism::new(4)).unwrap()),
        c,
    );
}

pub fn push_pop_large_ferroq_mpmc_xadd(c: &mut Criterion) {
    push_pop::<_, 256>("large-ferroq_mpmc_xadd", handles(mpmc::new_xadd(64, 4).unwrap()), c);
}

// endregion

// region ping_pong

pub fn ping_pong_ferroq_spsc_bounded(c: &mut Criterion) {
    ping_pong::<_, _, 1024>("ferroq_spsc_bounded", || spsc::new_bounded(256).unwrap(), c);
}

pub fn ping_pong_ferroq_mpsc_bounded(c: &mut Criterion) {
    ping_pong::<_, _, 1024>("ferroq_mpsc_bounded", || mpsc::new_bounded(256).unwrap(), c);
}

pub fn ping_pong_ferroq_mpsc_xadd(c: &mut Criterion) {
    ping_pong::<_, _, 1024>("ferroq_mpsc_xadd", || mpsc::new_xadd(256, 2).unwrap(), c);
}

pub fn ping_pong_ferroq_mpmc_bounded(c: &mut Criterion) {
    ping_pong::<_, _, 1024>("ferroq_mpmc_bounded", || mpmc::new_bounded(256).unwrap(), c);
}

// endregion

criterion_group!(
    push_pop_benchmark,
    push_pop_small_crossbeam_array_queue,
    push_pop_small_crossbeam_seg_queue,
    push_pop_small_ferroq_spsc_bounded,
    push_pop_small_ferroq_spsc_unbounded,
    push_pop_small_ferroq_mpsc_bounded,
    push_pop_small_ferroq_mpsc_xadd,
    push_pop_small_ferroq_spmc_bounded,
    push_pop_small_ferroq_mpmc_bounded,
    push_pop_large_crossbeam_array_queue,
    push_pop_large_crossbeam_seg_queue,
    push_pop_large_ferroq_spsc_bounded,
    push_pop_large_ferroq_spsc_growable,
    push_pop_large_ferroq_mpsc_linked,
    push_pop_large_ferroq_mpsc_compound,
    push_pop_large_ferroq_mpmc_xadd
);

criterion_group!(
    ping_pong_benchmark,
    ping_pong_ferroq_spsc_bounded,
    ping_pong_ferroq_mpsc_bounded,
    ping_pong_ferroq_mpsc_xadd,
    ping_pong_ferroq_mpmc_bounded
);

criterion_main!(push_pop_benchmark, ping_pong_benchmark);
