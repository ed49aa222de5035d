//! Domain Layer
//!
//! # Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Domain Layer                             │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  Explorer (Loop Controller)                                 │
//! │  ├─ Explorer<S, O>          repeats runs, stop policy       │
//! │  ├─ ExplorerConfig          budget, seed, strategy, dedup   │
//! │  └─ RunStats                per-kind tallies                │
//! │              │ TaskSet + ChoiceSource per run               │
//! │              ▼                                              │
//! │  Scheduler (one Run)                                        │
//! │  ├─ Run                     select / resume / apply         │
//! │  ├─ ChoiceSource            Uniform, Pct, Replay            │
//! │  └─ Outcome                 Completed / Deadlocked / Diverged│
//! │              │ Resume ▼   ▲ TaskEvent                       │
//! │  Task (Handle + Trap Channel)                               │
//! │  ├─ TaskHandle              worker thread, rendezvous pair  │
//! │  └─ TaskContext             trap(), yield_now(), finish()   │
//! │              │ TrapAction                                   │
//! │              ▼                                              │
//! │  Sync primitives                                            │
//! │  └─ Mutex, Semaphore, Condvar, Channel, SharedCell          │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Dependencies point downwards only: primitives know the trap protocol but
//! nothing about scheduling, and the scheduler knows [`TrapEffect`]s but
//! nothing about primitives.
//!
//! [`TrapEffect`]: task::TrapEffect

pub mod explorer;
pub mod scheduler;
pub mod sync;
pub mod task;

pub use explorer::{ExplorationReport, Explorer, ExplorerConfig, RunStats, StopHandle, StopReason};
pub use scheduler::{
    replay, simulate, ChoiceSource, ConfigError, FaultKind, Outcome, RunConfig, RunRecord,
    SimError, Strategy, TaskFault, TaskSet, Trace,
};
pub use sync::{Channel, Condvar, Mutex, Semaphore, SharedCell};
pub use task::{Interrupt, TaskContext, TaskId, TaskResult, TaskState, UsageFault};
