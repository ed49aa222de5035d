//! Scheduler Types - Outcomes, Traces and Errors
//!
//! # Outcome Classification
//!
//! Every run ends in exactly one of three terminal states:
//!
//! ```text
//! all tasks FINISHED                         → Completed { state }
//! none RUNNABLE, at least one BLOCKED        → Deadlocked { blocked, trace }
//! step budget spent with work still pending  → Diverged { step_count }
//! ```
//!
//! Per-task faults never end a run early. They are collected and attached to
//! whichever terminal outcome the run eventually reaches.

use std::collections::BTreeSet;
use std::fmt;
use std::io;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::task::{TaskId, TrapLabel, UsageFault};

/// Default per-run step budget
pub const DEFAULT_MAX_STEPS: usize = 10_000;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Faults
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Why a task finished abnormally
#[derive(Debug, Clone, PartialEq, Eq, Hash, Error)]
pub enum FaultKind {
    /// A primitive rejected one of the task's traps
    #[error("{0}")]
    Usage(UsageFault),

    /// The routine returned a user-defined failure
    #[error("failed: {0}")]
    Failed(String),

    /// The routine panicked
    #[error("panicked: {0}")]
    Panicked(String),

    /// The routine returned `Interrupt::Cancelled` while the run was still
    /// going
    #[error("reported cancellation without being cancelled")]
    UnrequestedCancel,

    /// The worker thread disappeared without reporting an exit
    #[error("worker lost")]
    WorkerLost,
}

/// Fault attached to a run outcome
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskFault {
    /// Offending task
    pub task: TaskId,
    /// What went wrong
    pub kind: FaultKind,
}

impl fmt::Display for TaskFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.task, self.kind)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trace
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// What a resumed task did
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StepEvent {
    /// Task suspended on a trap
    Trap(TrapLabel),
    /// Task finished normally
    Exited,
    /// Task finished with a fault
    Faulted(FaultKind),
}

impl fmt::Display for StepEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepEvent::Trap(label) => write!(f, "{}", label),
            StepEvent::Exited => write!(f, "exit"),
            StepEvent::Faulted(kind) => write!(f, "fault ({})", kind),
        }
    }
}

/// One entry of a run trace
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Step {
    /// Resume number this entry belongs to (0-based)
    pub seq: usize,
    /// Task that was resumed
    pub task: TaskId,
    /// What the task did
    pub event: StepEvent,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:<4} {}: {}", self.seq, self.task, self.event)
    }
}

/// Ordered record of a run
///
/// `steps` is the human readable part. `choices` holds the raw index picked
/// from the (id-sorted) runnable set at every resume, which is all a
/// [`ReplayChoice`](super::ReplayChoice) needs to reproduce the run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Trace {
    /// Events in execution order
    pub steps: Vec<Step>,
    /// Scheduling decisions in execution order
    pub choices: Vec<usize>,
}

impl Trace {
    /// Number of recorded events
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether nothing was recorded
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Sequence of tasks in resume order
    pub fn schedule(&self) -> Vec<TaskId> {
        let mut schedule: Vec<TaskId> = Vec::with_capacity(self.choices.len());
        let mut last_seq = None;
        for step in &self.steps {
            if last_seq != Some(step.seq) {
                schedule.push(step.task);
                last_seq = Some(step.seq);
            }
        }
        schedule
    }
}

impl fmt::Display for Trace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for step in &self.steps {
            writeln!(f, "{}", step)?;
        }
        Ok(())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Outcome
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Terminal classification of a run
///
/// `O` is the observation taken from the run-local state once every task
/// has finished. Only completed runs carry one: a deadlocked or diverged
/// run has tasks frozen mid-routine, so its state is not a final state.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Outcome<O> {
    /// Every task finished
    Completed {
        /// Observed final state
        state: O,
        /// Faults raised along the way
        faults: Vec<TaskFault>,
    },

    /// No task could make progress
    Deadlocked {
        /// Tasks stuck in BLOCKED state
        blocked: BTreeSet<TaskId>,
        /// How the run got there
        trace: Trace,
        /// Faults raised along the way
        faults: Vec<TaskFault>,
    },

    /// The step budget ran out
    Diverged {
        /// Number of resumes performed
        step_count: usize,
        /// Faults raised along the way
        faults: Vec<TaskFault>,
    },
}

impl<O> Outcome<O> {
    /// Faults raised during the run
    pub fn faults(&self) -> &[TaskFault] {
        match self {
            Outcome::Completed { faults, .. }
            | Outcome::Deadlocked { faults, .. }
            | Outcome::Diverged { faults, .. } => faults,
        }
    }

    /// Check for [`Outcome::Completed`]
    pub fn is_completed(&self) -> bool {
        matches!(self, Outcome::Completed { .. })
    }

    /// Check for [`Outcome::Deadlocked`]
    pub fn is_deadlocked(&self) -> bool {
        matches!(self, Outcome::Deadlocked { .. })
    }

    /// Check for [`Outcome::Diverged`]
    pub fn is_diverged(&self) -> bool {
        matches!(self, Outcome::Diverged { .. })
    }

    /// Check whether any task faulted
    pub fn is_faulted(&self) -> bool {
        !self.faults().is_empty()
    }

    /// Observed state of a completed run
    pub fn state(&self) -> Option<&O> {
        match self {
            Outcome::Completed { state, .. } => Some(state),
            _ => None,
        }
    }

    /// Short name of the variant
    pub fn kind(&self) -> &'static str {
        match self {
            Outcome::Completed { .. } => "completed",
            Outcome::Deadlocked { .. } => "deadlocked",
            Outcome::Diverged { .. } => "diverged",
        }
    }
}

impl<O: fmt::Debug> fmt::Display for Outcome<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Completed { state, .. } => write!(f, "completed with {:?}", state)?,
            Outcome::Deadlocked { blocked, .. } => {
                let names: Vec<String> = blocked.iter().map(ToString::to_string).collect();
                write!(f, "deadlocked on [{}]", names.join(", "))?;
            }
            Outcome::Diverged { step_count, .. } => {
                write!(f, "diverged after {} steps", step_count)?;
            }
        }
        match self.faults().len() {
            0 => Ok(()),
            n => write!(f, " ({} fault{})", n, if n == 1 { "" } else { "s" }),
        }
    }
}

/// One run as seen by the loop controller
#[derive(Debug, Clone)]
pub struct RunRecord<O> {
    /// Run index within an exploration
    pub index: usize,
    /// Seed of the run's choice source
    pub seed: u64,
    /// Terminal outcome
    pub outcome: Outcome<O>,
    /// Full trace, kept for every outcome kind
    pub trace: Trace,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Configuration & Errors
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Per-run limits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Maximum number of resumes before the run is declared diverged
    pub max_steps: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_steps: DEFAULT_MAX_STEPS,
        }
    }
}

impl RunConfig {
    /// Set the step budget
    pub fn max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Reject unusable values
    ///
    /// # Errors
    /// [`ConfigError::ZeroStepBudget`] if `max_steps` is zero
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_steps == 0 {
            return Err(ConfigError::ZeroStepBudget);
        }
        Ok(())
    }
}

/// Configuration rejected before any run starts
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Task set has no task slots
    #[error("task set is empty")]
    NoTasks,

    /// `max_steps` is zero
    #[error("max_steps must be at least 1")]
    ZeroStepBudget,

    /// `max_iterations` is `Some(0)`
    #[error("max_iterations must be at least 1 when set")]
    ZeroIterations,

    /// PCT depth is zero
    #[error("pct depth must be at least 1")]
    ZeroPctDepth,

    /// PCT horizon is zero
    #[error("pct horizon must be at least 1")]
    ZeroPctHorizon,
}

/// Errors that abort a simulation or an exploration
#[derive(Debug, Error)]
pub enum SimError {
    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// A worker thread could not be started
    #[error("failed to spawn worker for {task}")]
    Spawn {
        /// Task slot being started
        task: TaskId,
        /// Underlying OS error
        #[source]
        source: io::Error,
    },

    /// A collector or reporter returned an error
    #[error("exploration callback failed")]
    Callback(#[source] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn label(op: &'static str) -> StepEvent {
        StepEvent::Trap(TrapLabel::bare(op))
    }

    #[test]
    fn test_run_config_validation() {
        assert!(RunConfig::default().validate().is_ok());
        assert_eq!(RunConfig::default().max_steps, DEFAULT_MAX_STEPS);
        assert_eq!(
            RunConfig::default().max_steps(0).validate(),
            Err(ConfigError::ZeroStepBudget)
        );
    }

    #[test]
    fn test_outcome_predicates() {
        let completed: Outcome<u32> = Outcome::Completed {
            state: 3,
            faults: vec![],
        };
        assert!(completed.is_completed());
        assert!(!completed.is_faulted());
        assert_eq!(completed.state(), Some(&3));
        assert_eq!(completed.to_string(), "completed with 3");

        let diverged: Outcome<u32> = Outcome::Diverged {
            step_count: 10,
            faults: vec![TaskFault {
                task: TaskId(1),
                kind: FaultKind::Failed("x".into()),
            }],
        };
        assert!(diverged.is_diverged());
        assert!(diverged.is_faulted());
        assert_eq!(diverged.state(), None);
        assert_eq!(diverged.to_string(), "diverged after 10 steps (1 fault)");
    }

    #[test]
    fn test_deadlock_display() {
        let outcome: Outcome<()> = Outcome::Deadlocked {
            blocked: [TaskId(0), TaskId(1)].into_iter().collect(),
            trace: Trace::default(),
            faults: vec![],
        };
        assert_eq!(outcome.to_string(), "deadlocked on [Task(0), Task(1)]");
        assert_eq!(outcome.kind(), "deadlocked");
    }

    #[test]
    fn test_trace_schedule_merges_same_seq() {
        let trace = Trace {
            steps: vec![
                Step { seq: 0, task: TaskId(1), event: label("yield") },
                Step { seq: 1, task: TaskId(0), event: label("release") },
                Step {
                    seq: 1,
                    task: TaskId(0),
                    event: StepEvent::Faulted(FaultKind::WorkerLost),
                },
                Step { seq: 2, task: TaskId(1), event: StepEvent::Exited },
            ],
            choices: vec![1, 0, 0],
        };
        assert_eq!(trace.schedule(), vec![TaskId(1), TaskId(0), TaskId(1)]);
        assert_eq!(trace.len(), 4);
        assert!(trace.to_string().contains("Task(0): fault (worker lost)"));
    }

    #[test]
    fn test_sim_error_from_config() {
        let err: SimError = ConfigError::NoTasks.into();
        assert_eq!(err.to_string(), "invalid configuration: task set is empty");
    }
}
