//! Simulated Scheduling Engine
//!
//! # Overview
//!
//! `simsched` explores the interleavings of a set of cooperative tasks.
//! Tasks are ordinary Rust closures that suspend only at explicit traps
//! (lock, unlock, wait, notify, send, receive, yield). The engine replays
//! the task set many times, picking the next runnable task at random at
//! every trap, and reports how each run ended: completed, deadlocked or
//! diverged.
//!
//! # Trinity Architecture
//!
//! - **Domain**: tasks and the trap channel, the scheduler core,
//!   synchronization primitives, and the exploration loop
//! - **Infrastructure**: logging subscriber setup
//! - **Adapters**: progress sinks for long explorations
//!
//! # Engine Laws (Invariants)
//!
//! - Exactly one task executes at any time; all others are parked at a
//!   trap or finished
//! - Primitive state changes only while the scheduler applies a trap
//! - A run is a pure function of its task set and its choice sequence, so
//!   a recorded trace replays bit-identically
//! - Task faults never end a run; they ride along with its outcome
//!
//! # Usage
//!
//! ```rust
//! use simsched::{Explorer, ExplorerConfig, Mutex, TaskContext, TaskSet};
//!
//! // Two tasks taking two locks in opposite order.
//! let tasks = TaskSet::new(|| (Mutex::new("A"), Mutex::new("B")))
//!     .task(|(a, b): &(Mutex, Mutex)| {
//!         let (a, b) = (a.clone(), b.clone());
//!         move |cx: &TaskContext| {
//!             a.acquire(cx)?;
//!             b.acquire(cx)?;
//!             b.release(cx)?;
//!             a.release(cx)
//!         }
//!     })
//!     .task(|(a, b): &(Mutex, Mutex)| {
//!         let (a, b) = (a.clone(), b.clone());
//!         move |cx: &TaskContext| {
//!             b.acquire(cx)?;
//!             a.acquire(cx)?;
//!             a.release(cx)?;
//!             b.release(cx)
//!         }
//!     });
//!
//! let report = Explorer::new(tasks, ExplorerConfig::default().max_iterations(1000).random_seed(7))
//!     .unwrap()
//!     .stop_when(|outcome| outcome.is_deadlocked())
//!     .run()
//!     .unwrap();
//!
//! let last = report.last.unwrap();
//! assert!(last.outcome.is_deadlocked());
//! println!("{}", last.trace);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

// Trinity Architecture Layers
pub mod adapters;
pub mod domain;
pub mod infrastructure;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Re-export Primary Types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

// Task types
pub use domain::task::{Interrupt, TaskContext, TaskId, TaskResult, TaskState, UsageFault};

// Scheduler types
pub use domain::scheduler::{
    replay, simulate, ChoiceSource, ConfigError, FaultKind, Outcome, PctChoice, ReplayChoice,
    RunConfig, RunRecord, SimError, Step, StepEvent, Strategy, TaskFault, TaskSet, Trace,
    UniformChoice,
};

// Primitives
pub use domain::sync::{Channel, Condvar, Mutex, Semaphore, SharedCell};

// Explorer types
pub use domain::explorer::{
    ExplorationReport, Explorer, ExplorerConfig, ProgressSink, RunStats, StopHandle, StopReason,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
