//! Trap Protocol
//!
//! A trap is the only way routine code talks to the engine. The running task
//! packs an operation into a [`TrapAction`], hands it to the scheduler and
//! suspends. The scheduler applies the action atomically (no other task runs
//! meanwhile) and reads back a [`TrapEffect`] describing what should happen:
//!
//! ```text
//!   task                          scheduler
//!    │  TaskEvent::Trap(action)       │
//!    │ ─────────────────────────────> │  action.apply(caller)
//!    │                                │    ├─ Proceed(payload) → caller stays RUNNABLE
//!    │        (suspended)             │    ├─ Block            → caller BLOCKED
//!    │                                │    └─ wake [t1, ...]   → t1.. RUNNABLE
//!    │  Resume::Continue(payload)     │
//!    │ <───────────────────────────── │  (only once the caller is selected again)
//! ```
//!
//! Primitives implement [`TrapAction`] for each of their operations. The
//! scheduler never inspects primitive internals, it only applies effects.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use super::types::{Interrupt, TaskId, UsageFault};

/// Value carried back into a task on resume
pub type Payload = Box<dyn Any + Send>;

/// Human readable description of a trap, recorded in traces
///
/// Two labels compare equal when they name the same operation on the same
/// object, which is what makes traces from different runs comparable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrapLabel {
    /// Operation name (`acquire`, `release`, `yield`, ...)
    pub op: &'static str,
    /// Label of the primitive instance, if the trap targets one
    pub object: Option<Arc<str>>,
}

impl TrapLabel {
    /// Label for an operation on a named object
    pub fn new(op: &'static str, object: &Arc<str>) -> Self {
        Self {
            op,
            object: Some(Arc::clone(object)),
        }
    }

    /// Label for an operation without a target object
    pub const fn bare(op: &'static str) -> Self {
        Self { op, object: None }
    }
}

impl fmt::Display for TrapLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.object {
            Some(object) => write!(f, "{} {}", self.op, object),
            None => write!(f, "{}", self.op),
        }
    }
}

/// What happens to the trapping task itself
pub enum Disposition {
    /// The request was satisfied; the task stays runnable and receives the
    /// payload on its next resume
    Proceed(Option<Payload>),

    /// The request cannot be satisfied yet; some later trap must wake the
    /// task explicitly
    Block,
}

impl fmt::Debug for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Disposition::Proceed(payload) => f
                .debug_tuple("Proceed")
                .field(&payload.as_ref().map(|_| "<payload>"))
                .finish(),
            Disposition::Block => f.write_str("Block"),
        }
    }
}

/// Request to move a blocked task back to RUNNABLE
pub struct Wake {
    /// Task to wake
    pub task: TaskId,
    /// Value delivered to the task when it is next resumed
    pub payload: Option<Payload>,
}

impl Wake {
    /// Wake without a value
    pub fn task(task: TaskId) -> Self {
        Self {
            task,
            payload: None,
        }
    }

    /// Wake and hand over a value
    pub fn with_payload(task: TaskId, payload: Payload) -> Self {
        Self {
            task,
            payload: Some(payload),
        }
    }
}

impl fmt::Debug for Wake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wake")
            .field("task", &self.task)
            .field("has_payload", &self.payload.is_some())
            .finish()
    }
}

/// Result of applying a trap
#[derive(Debug)]
pub struct TrapEffect {
    /// Fate of the trapping task
    pub disposition: Disposition,
    /// Other tasks released by this operation
    pub wake: Vec<Wake>,
}

impl TrapEffect {
    /// Caller continues, nothing else changes
    pub fn proceed() -> Self {
        Self {
            disposition: Disposition::Proceed(None),
            wake: Vec::new(),
        }
    }

    /// Caller continues and receives `payload`
    pub fn reply(payload: Payload) -> Self {
        Self {
            disposition: Disposition::Proceed(Some(payload)),
            wake: Vec::new(),
        }
    }

    /// Caller blocks
    pub fn block() -> Self {
        Self {
            disposition: Disposition::Block,
            wake: Vec::new(),
        }
    }

    /// Add a wake signal
    pub fn waking(mut self, wake: Wake) -> Self {
        self.wake.push(wake);
        self
    }

    /// Add several wake signals
    pub fn waking_all(mut self, wakes: impl IntoIterator<Item = Wake>) -> Self {
        self.wake.extend(wakes);
        self
    }
}

/// Capability implemented by every primitive operation
///
/// `apply` runs on the scheduler thread while the caller is suspended and no
/// other task executes, so implementations may freely mutate shared state.
/// They must never block, poll or make random choices.
pub trait TrapAction: Send {
    /// Trace label for this operation
    fn label(&self) -> TrapLabel;

    /// Apply the operation on behalf of `caller`
    ///
    /// # Errors
    /// Returns a [`UsageFault`] when the operation is a misuse of the
    /// primitive. The caller is then terminated with that fault.
    fn apply(self: Box<Self>, caller: TaskId) -> Result<TrapEffect, UsageFault>;
}

/// Trap with no semantics, used as a pure interleaving point
pub(crate) struct YieldPoint;

impl TrapAction for YieldPoint {
    fn label(&self) -> TrapLabel {
        TrapLabel::bare("yield")
    }

    fn apply(self: Box<Self>, _caller: TaskId) -> Result<TrapEffect, UsageFault> {
        Ok(TrapEffect::proceed())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Channel Messages
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Scheduler → task
pub(crate) enum Resume {
    /// Continue running, observing the payload of the last trap
    Continue(Option<Payload>),
    /// The last trap was a misuse; unwind and finish
    Abort(UsageFault),
    /// The run is over; unwind and finish
    Cancel,
}

/// How a routine ended
#[derive(Debug)]
pub(crate) enum TaskExit {
    /// Routine returned
    Returned(Result<(), Interrupt>),
    /// Routine panicked; carries the panic message
    Panicked(String),
}

/// Task → scheduler
pub(crate) enum TaskEvent {
    /// Task suspended on a trap
    Trap(Box<dyn TrapAction>),
    /// Task is gone; no further events follow
    Exited(TaskExit),
}
