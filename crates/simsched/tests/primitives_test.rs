//! Integration Test: Primitive Compositions
//!
//! Larger task sets built from several primitives at once, explored with
//! the loop controller rather than single runs.

use std::collections::VecDeque;

use simsched::infrastructure::logging;
use simsched::{
    Channel, Condvar, Explorer, ExplorerConfig, Mutex, Outcome, Semaphore, SharedCell,
    StopReason, TaskContext, TaskSet,
};

const CAPACITY: usize = 2;
const ITEMS: u32 = 4;

#[derive(Clone)]
struct BoundedQueue {
    lock: Mutex,
    not_full: Condvar,
    not_empty: Condvar,
    items: SharedCell<VecDeque<u32>>,
    consumed: SharedCell<Vec<u32>>,
}

impl BoundedQueue {
    fn new() -> Self {
        Self {
            lock: Mutex::new("queue"),
            not_full: Condvar::new("not_full"),
            not_empty: Condvar::new("not_empty"),
            items: SharedCell::default(),
            consumed: SharedCell::default(),
        }
    }

    fn push(&self, cx: &TaskContext, value: u32) -> simsched::TaskResult {
        self.lock.acquire(cx)?;
        while self.items.with(VecDeque::len) == CAPACITY {
            self.not_full.wait(cx, &self.lock)?;
        }
        self.items.update(|q| q.push_back(value));
        self.not_empty.notify_one(cx)?;
        self.lock.release(cx)
    }

    fn pop(&self, cx: &TaskContext) -> simsched::TaskResult<u32> {
        self.lock.acquire(cx)?;
        while self.items.with(VecDeque::is_empty) {
            self.not_empty.wait(cx, &self.lock)?;
        }
        let value = self.items.update(VecDeque::pop_front);
        self.not_full.notify_one(cx)?;
        self.lock.release(cx)?;
        value.ok_or_else(|| simsched::Interrupt::Failed("queue empty after wait".into()))
    }
}

#[test]
fn test_condvar_bounded_queue_delivers_in_order() {
    logging::init_for_tests();

    let tasks = TaskSet::new(BoundedQueue::new)
        .task(|q: &BoundedQueue| {
            let q = q.clone();
            move |cx: &TaskContext| {
                for value in 0..ITEMS {
                    q.push(cx, value)?;
                }
                Ok(())
            }
        })
        .task(|q: &BoundedQueue| {
            let q = q.clone();
            move |cx: &TaskContext| {
                for _ in 0..ITEMS {
                    let value = q.pop(cx)?;
                    q.consumed.update(|c| c.push(value));
                }
                Ok(())
            }
        })
        .observe(|q: &BoundedQueue| q.consumed.get());

    let report = Explorer::new(tasks, ExplorerConfig::default().max_iterations(300).random_seed(17))
        .unwrap()
        .collect(|outcome| match outcome {
            Outcome::Completed { state, faults } if faults.is_empty() => {
                anyhow::ensure!(*state == vec![0, 1, 2, 3], "out of order: {:?}", state);
                Ok(())
            }
            other => anyhow::bail!("unexpected outcome: {:?}", other),
        })
        .run()
        .unwrap();

    println!("{}", report.stats);
    assert_eq!(report.stats.completed, 300);
    assert_eq!(report.stats.distinct, 1);
}

#[test]
fn test_channel_fan_in_collects_everything() {
    logging::init_for_tests();

    type Shared = (Channel<u32>, SharedCell<Vec<u32>>);

    let tasks = TaskSet::new(|| (Channel::new("inbox"), SharedCell::new(Vec::new())))
        .tasks(3, |(ch, _): &Shared, n| {
            let ch = ch.clone();
            move |cx: &TaskContext| {
                ch.send(cx, n as u32 * 10)?;
                ch.send(cx, n as u32 * 10 + 1)
            }
        })
        .task(|(ch, got): &Shared| {
            let (ch, got) = (ch.clone(), got.clone());
            move |cx: &TaskContext| {
                for _ in 0..6 {
                    let value = ch.recv(cx)?;
                    got.update(|g| g.push(value));
                }
                Ok(())
            }
        })
        .observe(|(ch, got): &Shared| {
            let mut values = got.get();
            values.sort_unstable();
            (ch.len(), values)
        });

    let report = Explorer::new(tasks, ExplorerConfig::default().max_iterations(200).random_seed(3))
        .unwrap()
        .collect(|outcome| {
            let expected = (0, vec![0, 1, 10, 11, 20, 21]);
            anyhow::ensure!(outcome.state() == Some(&expected), "bad outcome: {:?}", outcome);
            Ok(())
        })
        .run()
        .unwrap();

    assert_eq!(report.stop_reason, StopReason::BudgetExhausted);
}

#[test]
fn test_semaphore_gate_with_leaked_permit_deadlocks() {
    logging::init_for_tests();

    // Task0 forgets to return its permit; whoever needs it after that
    // waits forever.
    let tasks = TaskSet::new(|| Semaphore::new("gate", 1))
        .task(|s: &Semaphore| {
            let s = s.clone();
            move |cx: &TaskContext| s.acquire(cx)
        })
        .task(|s: &Semaphore| {
            let s = s.clone();
            move |cx: &TaskContext| {
                s.acquire(cx)?;
                s.release(cx)
            }
        })
        .observe(|s: &Semaphore| s.available());

    let report = Explorer::new(tasks, ExplorerConfig::default().max_iterations(500).random_seed(1))
        .unwrap()
        .stop_when(|outcome| outcome.is_deadlocked())
        .run()
        .unwrap();

    assert_eq!(report.stop_reason, StopReason::PredicateMatched);
    let last = report.last.unwrap();
    match last.outcome {
        Outcome::Deadlocked { blocked, .. } => {
            assert_eq!(blocked.into_iter().map(|t| t.as_usize()).collect::<Vec<_>>(), vec![1]);
        }
        other => panic!("unexpected: {:?}", other),
    }
}
