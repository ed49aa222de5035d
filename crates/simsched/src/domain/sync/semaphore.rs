//! Simulated counting semaphore
//!
//! Permits released while tasks are waiting go straight to the oldest
//! waiter, so a woken task never has to compete for the permit again.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex as StateLock;

use crate::domain::task::{
    TaskContext, TaskId, TaskResult, TrapAction, TrapEffect, TrapLabel, UsageFault, Wake,
};

#[derive(Debug)]
struct SemaphoreState {
    available: usize,
    waiters: VecDeque<TaskId>,
}

#[derive(Debug)]
struct SemaphoreShared {
    label: Arc<str>,
    capacity: usize,
    state: StateLock<SemaphoreState>,
}

/// Counting semaphore shared by the tasks of one run
#[derive(Clone)]
pub struct Semaphore {
    shared: Arc<SemaphoreShared>,
}

impl Semaphore {
    /// Create a semaphore with `permits` available permits
    pub fn new(label: impl Into<String>, permits: usize) -> Self {
        Self {
            shared: Arc::new(SemaphoreShared {
                label: Arc::from(label.into()),
                capacity: permits,
                state: StateLock::new(SemaphoreState {
                    available: permits,
                    waiters: VecDeque::new(),
                }),
            }),
        }
    }

    /// Take a permit, blocking while none is available
    pub fn acquire(&self, cx: &TaskContext) -> TaskResult {
        cx.trap(Acquire(Arc::clone(&self.shared))).map(|_| ())
    }

    /// Return a permit
    ///
    /// # Errors
    /// Usage fault if every permit is already available.
    pub fn release(&self, cx: &TaskContext) -> TaskResult {
        cx.trap(Release(Arc::clone(&self.shared))).map(|_| ())
    }

    /// Permits currently available
    pub fn available(&self) -> usize {
        self.shared.state.lock().available
    }

    /// Tasks waiting for a permit, oldest first
    pub fn waiters(&self) -> Vec<TaskId> {
        self.shared.state.lock().waiters.iter().copied().collect()
    }

    /// Initial number of permits
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }
}

impl fmt::Debug for Semaphore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("Semaphore")
            .field("label", &self.shared.label)
            .field("available", &state.available)
            .field("capacity", &self.shared.capacity)
            .field("waiters", &state.waiters)
            .finish()
    }
}

struct Acquire(Arc<SemaphoreShared>);

impl TrapAction for Acquire {
    fn label(&self) -> TrapLabel {
        TrapLabel::new("acquire", &self.0.label)
    }

    fn apply(self: Box<Self>, caller: TaskId) -> Result<TrapEffect, UsageFault> {
        let mut state = self.0.state.lock();
        if state.available > 0 {
            state.available -= 1;
            Ok(TrapEffect::proceed())
        } else {
            state.waiters.push_back(caller);
            Ok(TrapEffect::block())
        }
    }
}

struct Release(Arc<SemaphoreShared>);

impl TrapAction for Release {
    fn label(&self) -> TrapLabel {
        TrapLabel::new("release", &self.0.label)
    }

    fn apply(self: Box<Self>, caller: TaskId) -> Result<TrapEffect, UsageFault> {
        let mut state = self.0.state.lock();
        if let Some(next) = state.waiters.pop_front() {
            return Ok(TrapEffect::proceed().waking(Wake::task(next)));
        }
        if state.available >= self.0.capacity {
            return Err(UsageFault::PermitOverflow {
                primitive: self.0.label.to_string(),
                caller,
                capacity: self.0.capacity,
            });
        }
        state.available += 1;
        Ok(TrapEffect::proceed())
    }
}
