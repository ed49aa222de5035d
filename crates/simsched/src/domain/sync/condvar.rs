//! Simulated condition variable
//!
//! `wait` releases the associated mutex and parks the caller in one atomic
//! trap. A notify moves waiters from the condvar onto the mutex: a waiter
//! that finds the mutex free is granted it and woken at once, the others
//! queue behind the current holder and wake as it releases. In both cases
//! `wait` returns with the mutex held.
//!
//! There are no spurious wakeups, but a notify with nobody waiting is lost,
//! so callers should still re-check their condition in a loop.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex as StateLock;

use super::mutex::{Mutex, MutexShared};
use crate::domain::task::{
    TaskContext, TaskId, TaskResult, TrapAction, TrapEffect, TrapLabel, UsageFault, Wake,
};

#[derive(Debug)]
struct CondvarShared {
    label: Arc<str>,
    waiters: StateLock<VecDeque<(TaskId, Arc<MutexShared>)>>,
}

/// Wait/notify primitive paired with a [`Mutex`]
#[derive(Clone)]
pub struct Condvar {
    shared: Arc<CondvarShared>,
}

impl Condvar {
    /// Create a condvar with no waiters
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            shared: Arc::new(CondvarShared {
                label: Arc::from(label.into()),
                waiters: StateLock::new(VecDeque::new()),
            }),
        }
    }

    /// Release `mutex`, wait for a notify, and re-acquire `mutex`
    ///
    /// # Errors
    /// Usage fault if the caller does not hold `mutex`.
    pub fn wait(&self, cx: &TaskContext, mutex: &Mutex) -> TaskResult {
        cx.trap(Wait {
            condvar: Arc::clone(&self.shared),
            mutex: Arc::clone(&mutex.shared),
        })
        .map(|_| ())
    }

    /// Move the oldest waiter onto its mutex
    pub fn notify_one(&self, cx: &TaskContext) -> TaskResult {
        cx.trap(Notify {
            condvar: Arc::clone(&self.shared),
            all: false,
        })
        .map(|_| ())
    }

    /// Move every waiter onto its mutex
    pub fn notify_all(&self, cx: &TaskContext) -> TaskResult {
        cx.trap(Notify {
            condvar: Arc::clone(&self.shared),
            all: true,
        })
        .map(|_| ())
    }

    /// Tasks waiting for a notify, oldest first
    pub fn waiters(&self) -> Vec<TaskId> {
        self.shared.waiters.lock().iter().map(|(task, _)| *task).collect()
    }
}

impl fmt::Debug for Condvar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Condvar")
            .field("label", &self.shared.label)
            .field("waiters", &self.waiters())
            .finish()
    }
}

struct Wait {
    condvar: Arc<CondvarShared>,
    mutex: Arc<MutexShared>,
}

impl TrapAction for Wait {
    fn label(&self) -> TrapLabel {
        TrapLabel::new("wait", &self.condvar.label)
    }

    fn apply(self: Box<Self>, caller: TaskId) -> Result<TrapEffect, UsageFault> {
        let Wait { condvar, mutex } = *self;
        let next = mutex.release_from(caller)?;
        condvar.waiters.lock().push_back((caller, mutex));
        Ok(TrapEffect::block().waking_all(next.map(Wake::task)))
    }
}

struct Notify {
    condvar: Arc<CondvarShared>,
    all: bool,
}

impl TrapAction for Notify {
    fn label(&self) -> TrapLabel {
        let op = if self.all { "notify_all" } else { "notify_one" };
        TrapLabel::new(op, &self.condvar.label)
    }

    fn apply(self: Box<Self>, _caller: TaskId) -> Result<TrapEffect, UsageFault> {
        let mut waiters = self.condvar.waiters.lock();
        let count = if self.all { waiters.len() } else { waiters.len().min(1) };

        let granted = waiters
            .drain(..count)
            .filter(|(task, mutex)| mutex.grant_or_enqueue(*task))
            .map(|(task, _)| Wake::task(task))
            .collect::<Vec<_>>();

        Ok(TrapEffect::proceed().waking_all(granted))
    }
}
