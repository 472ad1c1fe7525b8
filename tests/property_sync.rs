//! Property-based tests for the sync primitives.
//!
//! Each property drives a primitive with a generated operation sequence and
//! compares it against a plain model (a counter, a `VecDeque`, a `Vec`).

#[macro_use]
mod common;

use common::*;
use coopsync::lab::yield_now;
use coopsync::{Barrier, Mutex, Queue, Semaphore, Stack, SyncError, WaitGroup};
use proptest::prelude::*;
use std::cell::RefCell;
use std::collections::VecDeque;

#[derive(Debug, Clone)]
enum QueueOp {
    Put(u16),
    Get,
}

fn arb_queue_ops(max_len: usize) -> impl Strategy<Value = Vec<QueueOp>> {
    proptest::collection::vec(
        prop_oneof![any::<u16>().prop_map(QueueOp::Put), Just(QueueOp::Get)],
        0..=max_len,
    )
}

proptest! {
    #![proptest_config(test_proptest_config(300))]

    /// Conservation: available + held = capacity after any try_acquire/drop mix.
    #[test]
    fn semaphore_conservation(
        capacity in 1_usize..=32,
        ops in proptest::collection::vec(any::<bool>(), 0..=64)
    ) {
        init_test_logging();
        let semaphore = Semaphore::new(capacity).expect("semaphore");
        let mut held = Vec::new();

        for acquire in ops {
            if acquire {
                match semaphore.try_acquire() {
                    Ok(permit) => held.push(permit),
                    Err(err) => {
                        prop_assert_eq!(held.len(), capacity);
                        prop_assert_eq!(err, SyncError::WouldBlock { primitive: "semaphore" });
                    }
                }
            } else {
                drop(held.pop());
            }
            prop_assert_eq!(semaphore.available_permits() + held.len(), capacity);
        }
    }

    /// A bounded queue behaves like a capped VecDeque under non-waiting calls.
    #[test]
    fn queue_matches_model(
        maxsize in 1_usize..=8,
        ops in arb_queue_ops(64)
    ) {
        init_test_logging();
        let queue = Queue::bounded(maxsize).expect("queue");
        let mut model = VecDeque::new();

        for op in ops {
            match op {
                QueueOp::Put(value) => {
                    let accepted = queue.put_nowait(value).is_ok();
                    prop_assert_eq!(accepted, model.len() < maxsize);
                    if accepted {
                        model.push_back(value);
                    }
                }
                QueueOp::Get => {
                    prop_assert_eq!(queue.get_nowait().ok(), model.pop_front());
                }
            }
            prop_assert_eq!(queue.len(), model.len());
            prop_assert_eq!(queue.is_full(), model.len() == maxsize);
        }
    }

    /// A stack behaves like a Vec under push/pop_nowait.
    #[test]
    fn stack_matches_model(ops in arb_queue_ops(64)) {
        init_test_logging();
        let stack = Stack::new();
        let mut model = Vec::new();

        for op in ops {
            match op {
                QueueOp::Put(value) => {
                    stack.push(value);
                    model.push(value);
                }
                QueueOp::Get => prop_assert_eq!(stack.pop_nowait().ok(), model.pop()),
            }
            prop_assert_eq!(stack.len(), model.len());
        }
    }

    /// The wait group counter never goes negative and rejected deltas leave it unchanged.
    #[test]
    fn wait_group_counter_never_negative(
        deltas in proptest::collection::vec(-4_i64..=4, 0..=64)
    ) {
        init_test_logging();
        let group = WaitGroup::new();
        let mut model = 0_i64;

        for delta in deltas {
            let outcome = group.add(delta);
            if model + delta < 0 {
                prop_assert_eq!(
                    outcome,
                    Err(SyncError::NegativeCounter { counter: model, delta })
                );
            } else {
                prop_assert!(outcome.is_ok());
                model += delta;
            }
            prop_assert_eq!(group.count(), model);
        }
    }
}

proptest! {
    #![proptest_config(test_proptest_config(100))]

    /// Mutex entry order equals spawn order regardless of how long holders keep it.
    #[test]
    fn mutex_entry_order_is_fifo(holds in proptest::collection::vec(0_usize..=4, 1..=12)) {
        init_test_logging();
        let mutex = Mutex::new();
        let entries = RefCell::new(Vec::new());
        let expected: Vec<usize> = (0..holds.len()).collect();

        {
            let mut lab = test_lab();
            for (id, hold) in holds.iter().copied().enumerate() {
                let (mutex, entries) = (&mutex, &entries);
                lab.spawn(async move {
                    mutex
                        .lock(async || {
                            entries.borrow_mut().push(id);
                            for _ in 0..hold {
                                yield_now().await;
                            }
                        })
                        .await;
                });
            }
            lab.run_until_quiescent();
        }

        prop_assert_eq!(entries.into_inner(), expected);
        prop_assert!(!mutex.locked());
    }

    /// Exactly one leader per generation over any number of full rounds.
    #[test]
    fn barrier_one_leader_per_generation(size in 1_usize..=6, rounds in 1_usize..=4) {
        init_test_logging();
        let barrier = Barrier::new(size).expect("barrier");
        let leaders = RefCell::new(0_usize);

        {
            let mut lab = test_lab();
            for _ in 0..size {
                let (barrier, leaders) = (&barrier, &leaders);
                lab.spawn(async move {
                    for _ in 0..rounds {
                        if barrier.wait().await.expect("wait").is_leader() {
                            *leaders.borrow_mut() += 1;
                        }
                    }
                });
            }
            lab.run_until_quiescent();
        }

        prop_assert_eq!(leaders.into_inner(), rounds);
        prop_assert_eq!(barrier.generation(), rounds as u64);
        prop_assert_eq!(barrier.remaining(), size);
    }
}
