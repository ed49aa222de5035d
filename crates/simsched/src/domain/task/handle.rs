//! Task Handle - scheduler side of one cooperative routine
//!
//! Each routine runs on a dedicated worker thread, but only ever while the
//! scheduler is waiting for it. The handle and the worker exchange messages
//! with strict one-in-one-out discipline:
//!
//! ```text
//!   scheduler (TaskHandle)            worker thread
//!         │  Resume::Continue              │ (parked in recv)
//!         │ ─────────────────────────────> │
//!         │                                │ runs routine code
//!         │  TaskEvent::Trap / Exited      │
//!         │ <───────────────────────────── │ (parked again)
//! ```
//!
//! Exactly one event answers every resume, so at most one side is ever
//! running. The first resume starts the routine; a worker that is cancelled
//! before its first resume exits without running any user code.
//!
//! # Design Notes
//!
//! Panics are caught on the worker with `catch_unwind` and reported as a
//! [`TaskExit::Panicked`] event, so one bad routine cannot take down the
//! scheduler thread. The unwind a [`TaskContext`] raises for a trap issued
//! after an interrupt is caught the same way and reported as a cancelled
//! return.

use std::any::Any;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender};
use tracing::{trace, warn};

use super::context::{InterruptUnwind, TaskContext};
use super::trap::{Payload, Resume, TaskEvent, TaskExit};
use super::types::{Interrupt, TaskId, TaskResult, TaskState, UsageFault};

/// One cooperative routine, ready to run on its own worker
pub type Routine = Box<dyn FnOnce(&TaskContext) -> TaskResult + Send>;

/// Scheduler-side handle of a running task
pub(crate) struct TaskHandle {
    id: TaskId,
    state: TaskState,
    /// Value delivered on the next resume
    pending: Option<Payload>,
    resumes: Sender<Resume>,
    events: Receiver<TaskEvent>,
    worker: Option<JoinHandle<()>>,
}

impl TaskHandle {
    /// Spawn the worker thread for `routine`
    ///
    /// The routine does not start until the first [`resume`](Self::resume).
    pub(crate) fn spawn(id: TaskId, routine: Routine) -> io::Result<Self> {
        let (resume_tx, resume_rx) = bounded(0);
        let (event_tx, event_rx) = bounded(0);

        let worker = thread::Builder::new()
            .name(format!("simsched-task-{}", id.as_usize()))
            .spawn(move || run_worker(id, routine, resume_rx, event_tx))?;

        Ok(Self {
            id,
            state: TaskState::Runnable,
            pending: None,
            resumes: resume_tx,
            events: event_rx,
            worker: Some(worker),
        })
    }

    #[inline(always)]
    pub(crate) fn id(&self) -> TaskId {
        self.id
    }

    #[inline(always)]
    pub(crate) fn state(&self) -> TaskState {
        self.state
    }

    #[inline(always)]
    pub(crate) fn set_state(&mut self, state: TaskState) {
        self.state = state;
    }

    /// Stash a value for the next resume
    pub(crate) fn deliver(&mut self, payload: Option<Payload>) {
        if payload.is_some() {
            self.pending = payload;
        }
    }

    /// Run the task until its next trap or exit
    ///
    /// Returns `None` if the worker vanished without reporting an exit.
    pub(crate) fn resume(&mut self) -> Option<TaskEvent> {
        let payload = self.pending.take();
        self.exchange(Resume::Continue(payload))
    }

    /// Terminate the task after a rejected trap
    pub(crate) fn abort(&mut self, fault: UsageFault) -> Option<TaskExit> {
        let event = self.exchange(Resume::Abort(fault));
        self.drain(event)
    }

    /// Terminate the task because the run is over
    pub(crate) fn cancel(&mut self) -> Option<TaskExit> {
        let event = self.exchange(Resume::Cancel);
        self.drain(event)
    }

    /// Wait for the worker thread to finish
    pub(crate) fn join(&mut self) {
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!(task = %self.id, "worker thread panicked outside its routine");
            }
        }
    }

    fn exchange(&mut self, message: Resume) -> Option<TaskEvent> {
        if self.resumes.send(message).is_err() {
            return None;
        }
        self.events.recv().ok()
    }

    /// An interrupted routine can no longer trap, so the next event is its exit
    fn drain(&mut self, mut event: Option<TaskEvent>) -> Option<TaskExit> {
        loop {
            match event {
                Some(TaskEvent::Exited(exit)) => return Some(exit),
                Some(TaskEvent::Trap(action)) => {
                    warn!(task = %self.id, trap = %action.label(), "trap after interrupt");
                    event = self.exchange(Resume::Cancel);
                }
                None => return None,
            }
        }
    }
}

fn run_worker(id: TaskId, routine: Routine, resumes: Receiver<Resume>, events: Sender<TaskEvent>) {
    let exit = match resumes.recv() {
        Ok(Resume::Continue(_)) => {
            trace!(task = %id, "routine started");
            let cx = TaskContext::new(id, events.clone(), resumes);
            match panic::catch_unwind(AssertUnwindSafe(|| routine(&cx))) {
                Ok(result) => TaskExit::Returned(result),
                Err(panic) if panic.is::<InterruptUnwind>() => {
                    trace!(task = %id, "routine unwound after interrupt");
                    TaskExit::Returned(Err(Interrupt::Cancelled))
                }
                Err(panic) => TaskExit::Panicked(panic_message(panic.as_ref())),
            }
        }
        Ok(Resume::Abort(fault)) => TaskExit::Returned(Err(Interrupt::Usage(fault))),
        Ok(Resume::Cancel) | Err(_) => TaskExit::Returned(Err(Interrupt::Cancelled)),
    };

    // The scheduler may already be gone on error paths.
    let _ = events.send(TaskEvent::Exited(exit));
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spawn(routine: impl FnOnce(&TaskContext) -> TaskResult + Send + 'static) -> TaskHandle {
        TaskHandle::spawn(TaskId(0), Box::new(routine)).unwrap()
    }

    #[test]
    fn test_routine_waits_for_first_resume() {
        let mut handle = spawn(|_| Ok(()));
        assert_eq!(handle.state(), TaskState::Runnable);
        match handle.resume() {
            Some(TaskEvent::Exited(TaskExit::Returned(Ok(())))) => {}
            _ => panic!("expected clean exit"),
        }
        handle.join();
    }

    #[test]
    fn test_trap_then_exit() {
        let mut handle = spawn(|cx| {
            cx.yield_now()?;
            cx.yield_now()
        });

        assert!(matches!(handle.resume(), Some(TaskEvent::Trap(_))));
        assert!(matches!(handle.resume(), Some(TaskEvent::Trap(_))));
        assert!(matches!(
            handle.resume(),
            Some(TaskEvent::Exited(TaskExit::Returned(Ok(()))))
        ));
        handle.join();
    }

    #[test]
    fn test_payload_delivered_on_resume() {
        let mut handle = spawn(|cx| {
            let value = cx
                .trap(crate::domain::task::trap::YieldPoint)?
                .and_then(|p| p.downcast::<i32>().ok())
                .map(|b| *b);
            if value == Some(9) {
                Ok(())
            } else {
                cx.fail(format!("got {:?}", value))
            }
        });

        assert!(matches!(handle.resume(), Some(TaskEvent::Trap(_))));
        handle.deliver(Some(Box::new(9i32)));
        assert!(matches!(
            handle.resume(),
            Some(TaskEvent::Exited(TaskExit::Returned(Ok(()))))
        ));
        handle.join();
    }

    #[test]
    fn test_cancel_before_start_skips_routine() {
        let mut handle = spawn(|_| panic!("must not run"));
        match handle.cancel() {
            Some(TaskExit::Returned(Err(Interrupt::Cancelled))) => {}
            other => panic!("unexpected exit: {:?}", other),
        }
        handle.join();
    }

    #[test]
    fn test_cancel_suspended_routine() {
        let mut handle = spawn(|cx| loop {
            // Leaves on the first interrupted trap.
            if cx.yield_now().is_err() {
                return Err(Interrupt::Cancelled);
            }
        });
        assert!(matches!(handle.resume(), Some(TaskEvent::Trap(_))));
        assert!(matches!(
            handle.cancel(),
            Some(TaskExit::Returned(Err(Interrupt::Cancelled)))
        ));
        handle.join();
    }

    #[test]
    fn test_cancel_routine_ignoring_trap_results() {
        let mut handle = spawn(|cx| loop {
            let _ = cx.yield_now();
        });
        assert!(matches!(handle.resume(), Some(TaskEvent::Trap(_))));
        assert!(matches!(
            handle.cancel(),
            Some(TaskExit::Returned(Err(Interrupt::Cancelled)))
        ));
        handle.join();
    }

    #[test]
    fn test_abort_routine_ignoring_trap_results() {
        let mut handle = spawn(|cx| loop {
            let _ = cx.yield_now();
        });
        assert!(matches!(handle.resume(), Some(TaskEvent::Trap(_))));
        let fault = UsageFault::NotHolder {
            primitive: "M".to_string(),
            caller: TaskId(0),
            holder: None,
        };
        assert!(matches!(
            handle.abort(fault),
            Some(TaskExit::Returned(Err(Interrupt::Cancelled)))
        ));
        handle.join();
    }

    #[test]
    fn test_panic_is_caught() {
        let mut handle = spawn(|_| panic!("boom"));
        match handle.resume() {
            Some(TaskEvent::Exited(TaskExit::Panicked(message))) => assert_eq!(message, "boom"),
            _ => panic!("expected panic exit"),
        }
        handle.join();
    }
}
