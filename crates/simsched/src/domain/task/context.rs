//! Task Context - the routine's view of the engine
//!
//! A [`TaskContext`] is handed to every routine when it first runs. Its
//! [`trap`](TaskContext::trap) method is the single suspension point of the
//! whole system: the routine's thread parks inside it until the scheduler
//! picks this task again.
//!
//! # Interrupts
//!
//! Once the scheduler aborts (usage fault) or cancels (run over) a task, the
//! context latches. The interrupted trap returns the interrupt so `?` can
//! carry it out of the routine. A routine that swallows it and traps again
//! is unwound on the spot: the trap never returns, and the worker reports
//! the task as cancelled. A routine that ignores trap results therefore
//! cannot keep its worker alive after the run is over.

use std::cell::Cell;
use std::panic;
use std::thread;

use crossbeam_channel::{Receiver, Sender};

use super::trap::{Payload, Resume, TaskEvent, TrapAction, YieldPoint};
use super::types::{Interrupt, TaskId, TaskResult};

/// Unwind payload used to stop a routine that trapped after an interrupt
pub(crate) struct InterruptUnwind;

/// Handle through which a routine issues traps
pub struct TaskContext {
    id: TaskId,
    events: Sender<TaskEvent>,
    resumes: Receiver<Resume>,
    interrupted: Cell<bool>,
}

impl TaskContext {
    pub(crate) fn new(id: TaskId, events: Sender<TaskEvent>, resumes: Receiver<Resume>) -> Self {
        Self {
            id,
            events,
            resumes,
            interrupted: Cell::new(false),
        }
    }

    /// Identity of the running task
    #[inline(always)]
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Perform a synchronization action and suspend until resumed
    ///
    /// Returns the value the action (or a later waker) produced for this
    /// task, if any.
    ///
    /// # Errors
    /// - [`Interrupt::Usage`] if the primitive rejected the action
    /// - [`Interrupt::Cancelled`] if the run ended while this task was
    ///   suspended
    ///
    /// # Panics
    /// Never returns once an earlier trap was interrupted; the routine is
    /// unwound back to its worker instead.
    pub fn trap<A: TrapAction + 'static>(&self, action: A) -> TaskResult<Option<Payload>> {
        if self.interrupted.get() {
            // A trap from a destructor during unwinding must not unwind twice.
            if thread::panicking() {
                return Err(Interrupt::Cancelled);
            }
            panic::resume_unwind(Box::new(InterruptUnwind));
        }

        if self.events.send(TaskEvent::Trap(Box::new(action))).is_err() {
            self.interrupted.set(true);
            return Err(Interrupt::Cancelled);
        }

        match self.resumes.recv() {
            Ok(Resume::Continue(payload)) => Ok(payload),
            Ok(Resume::Abort(fault)) => {
                self.interrupted.set(true);
                Err(Interrupt::Usage(fault))
            }
            Ok(Resume::Cancel) | Err(_) => {
                self.interrupted.set(true);
                Err(Interrupt::Cancelled)
            }
        }
    }

    /// Pure interleaving point
    pub fn yield_now(&self) -> TaskResult {
        self.trap(YieldPoint).map(|_| ())
    }

    /// End this task early without a fault
    ///
    /// Usable from nested helpers: `cx.finish()?` unwinds to the routine's
    /// top and the task is recorded as finished normally.
    pub fn finish(&self) -> TaskResult {
        Err(Interrupt::Exit)
    }

    /// End this task with a user-defined fault
    pub fn fail(&self, message: impl Into<String>) -> TaskResult {
        Err(Interrupt::Failed(message.into()))
    }

    /// Whether the scheduler has aborted or cancelled this task
    pub fn is_interrupted(&self) -> bool {
        self.interrupted.get()
    }
}
