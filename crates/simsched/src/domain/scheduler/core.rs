//! Scheduler Core - one run of a task set
//!
//! # Step Loop
//!
//! ```text
//! loop:
//!   all FINISHED?                 → Completed
//!   no RUNNABLE?                  → Deadlocked (every unfinished task is BLOCKED)
//!   steps == max_steps?           → Diverged
//!   i    = choice.choose(runnable)   runnable sorted by id
//!   task = runnable[i]
//!   resume(task) ──┬─ Trap(action) → action.apply(task)
//!                  │                   ├─ Ok(effect) → disposition + wakes
//!                  │                   └─ Err(fault) → abort task, record fault
//!                  └─ Exited(exit) → FINISHED (fault recorded if abnormal)
//! ```
//!
//! Exactly one task executes at any time: the scheduler thread blocks on the
//! resumed task's next event, and every other worker is parked in its
//! resume channel.
//!
//! # Design Notes
//!
//! The core never looks inside a primitive. It only reads the
//! [`TrapEffect`] an action returns, which keeps new primitives out of this
//! file entirely.
//!
//! Termination checks run before the budget check, so a run that finishes
//! on exactly `max_steps` resumes is still `Completed`.

use std::collections::BTreeSet;

use tracing::{debug, trace, warn};

use super::choice::{ChoiceSource, ReplayChoice, UniformChoice};
use super::task_set::TaskSet;
use super::types::{
    FaultKind, Outcome, RunConfig, RunRecord, SimError, Step, StepEvent, TaskFault, Trace,
};
use crate::domain::task::trap::{TaskEvent, TaskExit};
use crate::domain::task::{
    Disposition, Interrupt, Routine, TaskHandle, TaskId, TaskState, TrapEffect,
};

/// How a run ended, before the observation is taken
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RunEnd {
    Completed,
    Deadlocked(BTreeSet<TaskId>),
    Diverged,
}

/// Everything a finished run reports
#[derive(Debug)]
pub(crate) struct RunResult {
    pub(crate) end: RunEnd,
    pub(crate) trace: Trace,
    pub(crate) faults: Vec<TaskFault>,
    pub(crate) steps: usize,
}

/// One simulated execution of a task set
pub(crate) struct Run {
    tasks: Vec<TaskHandle>,
    choice: Box<dyn ChoiceSource>,
    max_steps: usize,
    steps: usize,
    trace: Trace,
    faults: Vec<TaskFault>,
}

impl Run {
    /// Spawn one worker per routine; slot `n` becomes `TaskId(n)`
    pub(crate) fn new(
        routines: Vec<Routine>,
        config: &RunConfig,
        choice: Box<dyn ChoiceSource>,
    ) -> Result<Self, SimError> {
        let mut tasks = Vec::with_capacity(routines.len());
        for (slot, routine) in routines.into_iter().enumerate() {
            let task = TaskId::new(slot);
            let handle =
                TaskHandle::spawn(task, routine).map_err(|source| SimError::Spawn { task, source })?;
            tasks.push(handle);
        }

        Ok(Self {
            tasks,
            choice,
            max_steps: config.max_steps,
            steps: 0,
            trace: Trace::default(),
            faults: Vec::new(),
        })
    }

    /// Drive the run to a terminal state
    ///
    /// Unfinished tasks are cancelled and every worker is joined before
    /// this returns, so run-local state is quiescent afterwards.
    pub(crate) fn execute(mut self) -> RunResult {
        let end = loop {
            if self.tasks.iter().all(|t| t.state().is_finished()) {
                break RunEnd::Completed;
            }

            let runnable: Vec<TaskId> = self
                .tasks
                .iter()
                .filter(|t| t.state().is_runnable())
                .map(TaskHandle::id)
                .collect();

            if runnable.is_empty() {
                let blocked = self
                    .tasks
                    .iter()
                    .filter(|t| t.state().is_blocked())
                    .map(TaskHandle::id)
                    .collect();
                break RunEnd::Deadlocked(blocked);
            }

            if self.steps >= self.max_steps {
                break RunEnd::Diverged;
            }

            let index = self.choice.choose(&runnable).min(runnable.len() - 1);
            self.trace.choices.push(index);
            self.step(runnable[index]);
        };

        self.shutdown();

        RunResult {
            end,
            trace: self.trace,
            faults: self.faults,
            steps: self.steps,
        }
    }

    fn step(&mut self, task: TaskId) {
        let seq = self.steps;
        self.steps += 1;

        match self.tasks[task.as_usize()].resume() {
            Some(TaskEvent::Trap(action)) => {
                let label = action.label();
                trace!(seq, task = %task, trap = %label, "trap");
                self.record(seq, task, StepEvent::Trap(label.clone()));

                match action.apply(task) {
                    Ok(effect) => self.apply(task, effect),
                    Err(fault) => {
                        warn!(task = %task, trap = %label, %fault, "usage fault");
                        let exit = self.tasks[task.as_usize()].abort(fault.clone());
                        debug!(task = %task, ?exit, "aborted task exited");
                        self.retire(seq, task, Err(FaultKind::Usage(fault)));
                    }
                }
            }
            Some(TaskEvent::Exited(exit)) => {
                let result = classify(exit);
                self.retire(seq, task, result);
            }
            None => {
                warn!(task = %task, "worker lost");
                self.retire(seq, task, Err(FaultKind::WorkerLost));
            }
        }
    }

    fn apply(&mut self, task: TaskId, effect: TrapEffect) {
        let caller = &mut self.tasks[task.as_usize()];
        match effect.disposition {
            Disposition::Proceed(payload) => caller.deliver(payload),
            Disposition::Block => caller.set_state(TaskState::Blocked),
        }

        for wake in effect.wake {
            match self.tasks.get_mut(wake.task.as_usize()) {
                Some(target) if target.state().is_blocked() => {
                    trace!(waker = %task, task = %wake.task, "wake");
                    target.set_state(TaskState::Runnable);
                    target.deliver(wake.payload);
                }
                Some(target) => {
                    warn!(waker = %task, task = %wake.task, state = %target.state(), "ignoring wake of task that is not blocked");
                }
                None => {
                    warn!(waker = %task, task = %wake.task, "ignoring wake of unknown task");
                }
            }
        }
    }

    fn retire(&mut self, seq: usize, task: TaskId, result: Result<(), FaultKind>) {
        self.tasks[task.as_usize()].set_state(TaskState::Finished);
        let event = match result {
            Ok(()) => {
                trace!(seq, task = %task, "exit");
                StepEvent::Exited
            }
            Err(kind) => {
                debug!(seq, task = %task, fault = %kind, "task faulted");
                self.faults.push(TaskFault {
                    task,
                    kind: kind.clone(),
                });
                StepEvent::Faulted(kind)
            }
        };
        self.record(seq, task, event);
    }

    fn record(&mut self, seq: usize, task: TaskId, event: StepEvent) {
        self.trace.steps.push(Step { seq, task, event });
    }

    fn shutdown(&mut self) {
        for handle in &mut self.tasks {
            if !handle.state().is_finished() {
                let exit = handle.cancel();
                trace!(task = %handle.id(), ?exit, "cancelled");
                handle.set_state(TaskState::Finished);
            }
        }
        for handle in &mut self.tasks {
            handle.join();
        }
    }
}

/// Classify an exit observed while stepping
///
/// The scheduler only cancels tasks at shutdown, so a `Cancelled` return
/// seen here was produced by the routine itself.
fn classify(exit: TaskExit) -> Result<(), FaultKind> {
    match exit {
        TaskExit::Returned(Ok(())) | TaskExit::Returned(Err(Interrupt::Exit)) => Ok(()),
        TaskExit::Returned(Err(Interrupt::Cancelled)) => Err(FaultKind::UnrequestedCancel),
        TaskExit::Returned(Err(Interrupt::Usage(fault))) => Err(FaultKind::Usage(fault)),
        TaskExit::Returned(Err(Interrupt::Failed(message))) => Err(FaultKind::Failed(message)),
        TaskExit::Panicked(message) => Err(FaultKind::Panicked(message)),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Entry Points
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Execute one run with an explicit choice source
pub(crate) fn run_once<S: 'static, O: 'static>(
    task_set: &TaskSet<S, O>,
    config: &RunConfig,
    choice: Box<dyn ChoiceSource>,
    index: usize,
    seed: u64,
) -> Result<RunRecord<O>, SimError> {
    let (state, routines) = task_set.instantiate();
    let result = Run::new(routines, config, choice)?.execute();

    let faults = result.faults;
    let outcome = match result.end {
        RunEnd::Completed => Outcome::Completed {
            state: task_set.observe_state(&state),
            faults,
        },
        RunEnd::Deadlocked(blocked) => Outcome::Deadlocked {
            blocked,
            trace: result.trace.clone(),
            faults,
        },
        RunEnd::Diverged => Outcome::Diverged {
            step_count: result.steps,
            faults,
        },
    };

    Ok(RunRecord {
        index,
        seed,
        outcome,
        trace: result.trace,
    })
}

/// Run a task set once with uniformly random choices
///
/// # Errors
/// [`SimError::Config`] for an empty task set or a zero step budget,
/// [`SimError::Spawn`] if a worker thread cannot be started.
pub fn simulate<S: 'static, O: 'static>(
    task_set: &TaskSet<S, O>,
    config: &RunConfig,
    seed: u64,
) -> Result<RunRecord<O>, SimError> {
    task_set.validate()?;
    config.validate()?;
    run_once(task_set, config, Box::new(UniformChoice::new(seed)), 0, seed)
}

/// Re-execute a run from its recorded scheduling decisions
///
/// With the same task set and config, the replay produces an identical
/// trace and outcome.
///
/// # Errors
/// Same as [`simulate`].
pub fn replay<S: 'static, O: 'static>(
    task_set: &TaskSet<S, O>,
    config: &RunConfig,
    trace: &Trace,
) -> Result<RunRecord<O>, SimError> {
    task_set.validate()?;
    config.validate()?;
    let choice = ReplayChoice::new(trace.choices.clone());
    run_once(task_set, config, Box::new(choice), 0, 0)
}
