//! Task Handle and Trap Channel
//!
//! A task is a user routine plus the plumbing that lets the scheduler run it
//! one slice at a time. Routine code only ever sees [`TaskContext`]; the
//! scheduler only ever sees the crate-private `TaskHandle`.

mod context;
mod handle;
pub mod trap;
pub mod types;

pub use context::TaskContext;
pub use handle::Routine;
pub(crate) use handle::TaskHandle;
pub use trap::{Disposition, Payload, TrapAction, TrapEffect, TrapLabel, Wake};
pub use types::{Interrupt, TaskId, TaskResult, TaskState, UsageFault};
