//! Single-threaded runs of random operations checked against a `VecDeque`.
use ferroq::{mpmc, mpsc, spmc, spsc, Consumer, Parallelism, Producer};
use proptest::prelude::*;
use std::collections::VecDeque;

#[derive(Debug, Clone)]
enum Op {
    Offer,
    Poll,
    Fill(usize),
    Drain(usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => Just(Op::Offer),
        3 => Just(Op::Poll),
        1 => (0..20usize).prop_map(Op::Fill),
        1 => (0..20usize).prop_map(Op::Drain),
    ]
}

/// Runs `ops` on a fresh queue and on a `VecDeque` bounded by the queue capacity.
///
/// The supplier of `fill` pushes to the model, so the model holds whatever was added.
fn check_fifo<P, C>(creator: impl Fn() -> (P, C), ops: &[Op]) -> Result<(), TestCaseError>
where
    P: Producer<u32>,
    C: Consumer<u32>,
{
    let (mut producer, mut consumer) = creator();
    let capacity = producer.capacity().unwrap_or(usize::MAX);
    let mut model = VecDeque::new();
    let mut next = 0;

    for op in ops {
        match *op {
            Op::Offer => {
                let result = producer.offer(next);

                if model.len() < capacity {
                    prop_assert_eq!(result, Ok(()));
                    model.push_back(next);
                } else {
                    prop_assert_eq!(result, Err(next));
                }

                next += 1;
            }
            Op::Poll => prop_assert_eq!(consumer.poll(), model.pop_front()),
            Op::Fill(limit) => {
                let expected = limit.min(capacity - model.len());
                let filled = producer.fill(
                    || {
                        model.push_back(next);
                        next += 1;

                        next - 1
                    },
                    limit,
                );

                // A multi-producer ring may stop at a stale limit, but never adds nothing
                // to a queue with room.
                prop_assert!(filled <= expected);
                prop_assert_eq!(filled == 0, expected == 0);
            }
            Op::Drain(limit) => {
                let mut drained = Vec::new();

                consumer.drain(|value| drained.push(value), limit);

                let expected: Vec<_> = model.drain(..limit.min(model.len())).collect();

                prop_assert_eq!(drained, expected);
            }
        }

        prop_assert_eq!(consumer.len(), model.len());
    }

    Ok(())
}

proptest! {
    #[test]
    fn spsc_queues_behave_like_a_deque(ops in prop::collection::vec(op(), 0..300)) {
        check_fifo(|| spsc::new_bounded(16).unwrap(), &ops)?;
        check_fifo(spsc::new_linked, &ops)?;
        check_fifo(|| spsc::new_chunked(8, 32).unwrap(), &ops)?;
        check_fifo(|| spsc::new_growable(8, 32).unwrap(), &ops)?;
        check_fifo(|| spsc::new_unbounded(16).unwrap(), &ops)?;
    }

    #[test]
    fn mpsc_queues_behave_like_a_deque(ops in prop::collection::vec(op(), 0..300)) {
        check_fifo(|| mpsc::new_bounded(16).unwrap(), &ops)?;
        check_fifo(mpsc::new_linked, &ops)?;
        check_fifo(|| mpsc::new_chunked(4, 32).unwrap(), &ops)?;
        check_fifo(|| mpsc::new_growable(4, 32).unwrap(), &ops)?;
        check_fifo(|| mpsc::new_unbounded(4).unwrap(), &ops)?;
        check_fifo(|| mpsc::new_xadd(4, 2).unwrap(), &ops)?;
        check_fifo(|| mpsc::new_compound(16, Parallelism::new(1)).unwrap(), &ops)?;
    }

    #[test]
    fn multi_consumer_queues_behave_like_a_deque(ops in prop::collection::vec(op(), 0..300)) {
        check_fifo(|| spmc::new_bounded(16).unwrap(), &ops)?;
        check_fifo(|| mpmc::new_bounded(16).unwrap(), &ops)?;
        check_fifo(|| mpmc::new_xadd(4, 2).unwrap(), &ops)?;
        check_fifo(|| mpmc::new_xadd(4, 0).unwrap(), &ops)?;
    }
}
