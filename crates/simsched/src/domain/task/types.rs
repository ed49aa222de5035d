//! Task Types - Identity, Lifecycle and Interrupts
//!
//! # State Transitions
//!
//! ```text
//! RUNNABLE ──────> BLOCKED      (trap could not be satisfied)
//!    ↑                │
//!    └────────────────┘          (a primitive woke the task)
//!
//! RUNNABLE ──────> FINISHED     (routine returned, faulted or panicked)
//! ```
//!
//! Only the scheduler core moves a task between these states. Primitives
//! never touch task state directly; they describe the transition in a
//! [`TrapEffect`](super::trap::TrapEffect) and the scheduler applies it.

use std::fmt;

use thiserror::Error;

/// Task identifier
///
/// Stable index of a task slot inside one run. Slot `n` of a
/// [`TaskSet`](crate::domain::scheduler::TaskSet) always runs as `TaskId(n)`,
/// which keeps traces comparable across runs.
///
/// # Example
///
/// ```rust
/// use simsched::domain::task::TaskId;
///
/// let first = TaskId::new(0);
/// assert_eq!(first.to_string(), "Task(0)");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub usize);

impl TaskId {
    /// Create a new TaskId
    #[inline(always)]
    pub const fn new(id: usize) -> Self {
        Self(id)
    }

    /// Get the raw numeric ID
    #[inline(always)]
    pub const fn as_usize(self) -> usize {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Task({})", self.0)
    }
}

/// Task state in the scheduler
///
/// A task in RUNNABLE state is a candidate for the next resume. A BLOCKED
/// task is parked inside some primitive's waiter queue and is excluded from
/// selection until that primitive wakes it. FINISHED is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    /// Task can be selected for the next step
    Runnable,

    /// Task is suspended on a primitive and waits for an explicit wake
    Blocked,

    /// Task returned, exited early, or was terminated by a fault
    Finished,
}

impl TaskState {
    /// Check if task can be selected
    #[inline(always)]
    pub const fn is_runnable(self) -> bool {
        matches!(self, TaskState::Runnable)
    }

    /// Check if task is blocked
    #[inline(always)]
    pub const fn is_blocked(self) -> bool {
        matches!(self, TaskState::Blocked)
    }

    /// Check if task is finished
    #[inline(always)]
    pub const fn is_finished(self) -> bool {
        matches!(self, TaskState::Finished)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskState::Runnable => write!(f, "RUNNABLE"),
            TaskState::Blocked => write!(f, "BLOCKED"),
            TaskState::Finished => write!(f, "FINISHED"),
        }
    }
}

/// Misuse of a synchronization primitive
///
/// Raised while a primitive processes a trap. The offending task is
/// terminated and the fault is attached to the run's outcome.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Error)]
pub enum UsageFault {
    /// Release (or condvar wait) by a task that does not hold the lock
    #[error("{caller} does not hold {primitive} (holder: {})", fmt_holder(.holder))]
    NotHolder {
        /// Label of the primitive
        primitive: String,
        /// Task that issued the operation
        caller: TaskId,
        /// Current holder, if any
        holder: Option<TaskId>,
    },

    /// Semaphore released more times than it was acquired
    #[error("{caller} released {primitive} beyond its capacity of {capacity}")]
    PermitOverflow {
        /// Label of the primitive
        primitive: String,
        /// Task that issued the operation
        caller: TaskId,
        /// Configured number of permits
        capacity: usize,
    },
}

fn fmt_holder(holder: &Option<TaskId>) -> String {
    match holder {
        Some(task) => task.to_string(),
        None => "none".to_string(),
    }
}

/// Non-local exit from a routine
///
/// Every trap returns `Result<_, Interrupt>`, so routines propagate
/// interrupts with `?` from arbitrarily nested helpers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Interrupt {
    /// The last trap was rejected by a primitive; the task is terminated
    #[error("usage fault: {0}")]
    Usage(#[from] UsageFault),

    /// Fault raised by routine code itself
    #[error("task failed: {0}")]
    Failed(String),

    /// Early, non-faulting exit
    #[error("task exited")]
    Exit,

    /// The run reached a terminal outcome while this task was suspended
    #[error("run cancelled")]
    Cancelled,
}

/// Result type of a routine and of every trap
pub type TaskResult<T = ()> = Result<T, Interrupt>;
