//! Simulated Mutex
//!
//! # State
//!
//! ```text
//! holder:  Option<TaskId>      locked ⇔ holder.is_some()
//! waiters: VecDeque<TaskId>    FIFO, never contains the holder
//! ```
//!
//! # Transitions
//!
//! | Trap      | Free mutex                 | Held mutex                          |
//! |-----------|----------------------------|-------------------------------------|
//! | `acquire` | caller becomes holder      | caller queued and BLOCKED           |
//! | `release` | usage fault                | head waiter becomes holder, woken   |
//!
//! Release by anyone but the holder is a usage fault and leaves the state
//! untouched. The holder acquiring again is BLOCKED without joining the
//! queue, which the scheduler then reports as a deadlock.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex as StateLock;

use crate::domain::task::{
    TaskContext, TaskId, TaskResult, TrapAction, TrapEffect, TrapLabel, UsageFault, Wake,
};

#[derive(Debug, Default)]
struct MutexState {
    holder: Option<TaskId>,
    waiters: VecDeque<TaskId>,
}

#[derive(Debug)]
pub(crate) struct MutexShared {
    label: Arc<str>,
    state: StateLock<MutexState>,
}

impl MutexShared {
    /// Hand the lock to `task` if free, otherwise queue it
    ///
    /// Returns `true` when the lock was granted on the spot.
    pub(crate) fn grant_or_enqueue(&self, task: TaskId) -> bool {
        let mut state = self.state.lock();
        match state.holder {
            None => {
                state.holder = Some(task);
                true
            }
            // The holder parks behind itself but is never queued; nothing
            // can hand it the lock again.
            Some(holder) if holder == task => false,
            Some(_) => {
                state.waiters.push_back(task);
                false
            }
        }
    }

    /// Give up the lock on behalf of `caller`
    ///
    /// Returns the waiter that became the new holder, if any.
    pub(crate) fn release_from(&self, caller: TaskId) -> Result<Option<TaskId>, UsageFault> {
        let mut state = self.state.lock();
        if state.holder != Some(caller) {
            return Err(UsageFault::NotHolder {
                primitive: self.label.to_string(),
                caller,
                holder: state.holder,
            });
        }
        let next = state.waiters.pop_front();
        state.holder = next;
        Ok(next)
    }
}

/// Mutual exclusion lock shared by the tasks of one run
///
/// Cloning yields another handle to the same lock.
#[derive(Clone)]
pub struct Mutex {
    pub(crate) shared: Arc<MutexShared>,
}

impl Mutex {
    /// Create an unlocked mutex
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            shared: Arc::new(MutexShared {
                label: Arc::from(label.into()),
                state: StateLock::new(MutexState::default()),
            }),
        }
    }

    /// Acquire the lock, blocking while another task holds it
    ///
    /// # Errors
    /// [`Interrupt::Cancelled`](crate::domain::task::Interrupt::Cancelled)
    /// if the run ends while waiting.
    pub fn acquire(&self, cx: &TaskContext) -> TaskResult {
        cx.trap(Acquire(Arc::clone(&self.shared))).map(|_| ())
    }

    /// Acquire the lock only if it is free; never blocks
    pub fn try_acquire(&self, cx: &TaskContext) -> TaskResult<bool> {
        let payload = cx.trap(TryAcquire(Arc::clone(&self.shared)))?;
        Ok(payload
            .and_then(|p| p.downcast::<bool>().ok())
            .map_or(false, |granted| *granted))
    }

    /// Release the lock
    ///
    /// # Errors
    /// [`Interrupt::Usage`](crate::domain::task::Interrupt::Usage) if the
    /// caller is not the holder. The task is terminated.
    pub fn release(&self, cx: &TaskContext) -> TaskResult {
        cx.trap(Release(Arc::clone(&self.shared))).map(|_| ())
    }

    /// Whether some task holds the lock
    pub fn is_locked(&self) -> bool {
        self.shared.state.lock().holder.is_some()
    }

    /// Current holder
    pub fn holder(&self) -> Option<TaskId> {
        self.shared.state.lock().holder
    }

    /// Queued tasks, oldest first
    pub fn waiters(&self) -> Vec<TaskId> {
        self.shared.state.lock().waiters.iter().copied().collect()
    }

    /// Label used in traces
    pub fn label(&self) -> &str {
        &self.shared.label
    }
}

impl fmt::Debug for Mutex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("Mutex")
            .field("label", &self.shared.label)
            .field("holder", &state.holder)
            .field("waiters", &state.waiters)
            .finish()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trap Actions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct Acquire(Arc<MutexShared>);

impl TrapAction for Acquire {
    fn label(&self) -> TrapLabel {
        TrapLabel::new("acquire", &self.0.label)
    }

    fn apply(self: Box<Self>, caller: TaskId) -> Result<TrapEffect, UsageFault> {
        if self.0.grant_or_enqueue(caller) {
            Ok(TrapEffect::proceed())
        } else {
            Ok(TrapEffect::block())
        }
    }
}

struct TryAcquire(Arc<MutexShared>);

impl TrapAction for TryAcquire {
    fn label(&self) -> TrapLabel {
        TrapLabel::new("try_acquire", &self.0.label)
    }

    fn apply(self: Box<Self>, caller: TaskId) -> Result<TrapEffect, UsageFault> {
        let mut state = self.0.state.lock();
        let granted = state.holder.is_none();
        if granted {
            state.holder = Some(caller);
        }
        Ok(TrapEffect::reply(Box::new(granted)))
    }
}

struct Release(Arc<MutexShared>);

impl TrapAction for Release {
    fn label(&self) -> TrapLabel {
        TrapLabel::new("release", &self.0.label)
    }

    fn apply(self: Box<Self>, caller: TaskId) -> Result<TrapEffect, UsageFault> {
        let next = self.0.release_from(caller)?;
        Ok(TrapEffect::proceed().waking_all(next.map(Wake::task)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::scheduler::{simulate, FaultKind, Outcome, RunConfig, TaskSet};

    #[test]
    fn test_actions_track_holder_and_waiters() {
        let m = Mutex::new("M");

        let effect = Box::new(Acquire(Arc::clone(&m.shared))).apply(TaskId(0)).unwrap();
        assert!(matches!(effect.disposition, crate::domain::task::Disposition::Proceed(None)));
        assert_eq!(m.holder(), Some(TaskId(0)));

        let effect = Box::new(Acquire(Arc::clone(&m.shared))).apply(TaskId(1)).unwrap();
        assert!(matches!(effect.disposition, crate::domain::task::Disposition::Block));
        assert_eq!(m.waiters(), vec![TaskId(1)]);

        let effect = Box::new(Release(Arc::clone(&m.shared))).apply(TaskId(0)).unwrap();
        assert_eq!(effect.wake.len(), 1);
        assert_eq!(effect.wake[0].task, TaskId(1));
        assert_eq!(m.holder(), Some(TaskId(1)));
        assert!(m.waiters().is_empty());

        let effect = Box::new(Release(Arc::clone(&m.shared))).apply(TaskId(1)).unwrap();
        assert!(effect.wake.is_empty());
        assert!(!m.is_locked());
    }

    #[test]
    fn test_foreign_release_leaves_state_untouched() {
        let m = Mutex::new("M");
        Box::new(Acquire(Arc::clone(&m.shared))).apply(TaskId(0)).unwrap();
        Box::new(Acquire(Arc::clone(&m.shared))).apply(TaskId(2)).unwrap();

        let err = Box::new(Release(Arc::clone(&m.shared))).apply(TaskId(1)).unwrap_err();
        assert_eq!(
            err,
            UsageFault::NotHolder {
                primitive: "M".into(),
                caller: TaskId(1),
                holder: Some(TaskId(0)),
            }
        );
        assert_eq!(m.holder(), Some(TaskId(0)));
        assert_eq!(m.waiters(), vec![TaskId(2)]);
    }

    #[test]
    fn test_release_of_free_mutex_is_fault() {
        let tasks = TaskSet::new(|| Mutex::new("M")).task(|m: &Mutex| {
            let m = m.clone();
            move |cx: &TaskContext| m.release(cx)
        });
        let record = simulate(&tasks, &RunConfig::default(), 0).unwrap();
        match record.outcome {
            Outcome::Completed { faults, .. } => {
                assert_eq!(faults.len(), 1);
                assert!(matches!(faults[0].kind, FaultKind::Usage(UsageFault::NotHolder { .. })));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_self_reacquire_deadlocks() {
        let lock = Mutex::new("M");
        let outside = lock.clone();
        let tasks = TaskSet::new(move || lock.clone()).task(|m: &Mutex| {
            let m = m.clone();
            move |cx: &TaskContext| {
                m.acquire(cx)?;
                m.acquire(cx)?;
                m.release(cx)
            }
        });
        let record = simulate(&tasks, &RunConfig::default(), 0).unwrap();
        match record.outcome {
            Outcome::Deadlocked { blocked, .. } => {
                assert_eq!(blocked.into_iter().collect::<Vec<_>>(), vec![TaskId(0)]);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(outside.holder(), Some(TaskId(0)));
        assert!(outside.waiters().is_empty());
    }

    #[test]
    fn test_holder_is_never_queued() {
        let m = Mutex::new("M");
        let first = Box::new(Acquire(Arc::clone(&m.shared))).apply(TaskId(0)).unwrap();
        assert!(matches!(first.disposition, crate::domain::task::Disposition::Proceed(None)));

        let again = Box::new(Acquire(Arc::clone(&m.shared))).apply(TaskId(0)).unwrap();
        assert!(matches!(again.disposition, crate::domain::task::Disposition::Block));
        assert!(again.wake.is_empty());
        assert_eq!(m.holder(), Some(TaskId(0)));
        assert!(m.waiters().is_empty());

        Box::new(Acquire(Arc::clone(&m.shared))).apply(TaskId(1)).unwrap();
        assert_eq!(m.waiters(), vec![TaskId(1)]);
    }

    #[test]
    fn test_try_acquire() {
        let tasks = TaskSet::new(|| (Mutex::new("M"), crate::domain::sync::SharedCell::new(Vec::new())))
            .task(|(m, seen): &(Mutex, crate::domain::sync::SharedCell<Vec<bool>>)| {
                let (m, seen) = (m.clone(), seen.clone());
                move |cx: &TaskContext| {
                    let first = m.try_acquire(cx)?;
                    let second = m.try_acquire(cx)?;
                    seen.update(|v| v.extend([first, second]));
                    m.release(cx)
                }
            })
            .observe(|(m, seen): &(Mutex, crate::domain::sync::SharedCell<Vec<bool>>)| {
                (m.is_locked(), seen.get())
            });
        let record = simulate(&tasks, &RunConfig::default(), 0).unwrap();
        assert_eq!(record.outcome.state(), Some(&(false, vec![true, false])));
    }
}
