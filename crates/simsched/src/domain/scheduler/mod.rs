//! Scheduler Core
//!
//! Drives one run: selects a runnable task, resumes it until its next trap,
//! applies the trap's effect, and detects completion, deadlock and
//! divergence.

mod choice;
mod core;
mod task_set;
mod types;

pub use choice::{seed_for, ChoiceSource, PctChoice, ReplayChoice, Strategy, UniformChoice};
pub use core::{replay, simulate};
pub(crate) use core::run_once;
pub use task_set::TaskSet;
pub use types::{
    ConfigError, FaultKind, Outcome, RunConfig, RunRecord, SimError, Step, StepEvent, TaskFault,
    Trace, DEFAULT_MAX_STEPS,
};
