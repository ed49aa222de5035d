//! Loop Controller
//!
//! Repeats runs, applies the stopping policy and aggregates outcomes.

mod config;
#[allow(clippy::module_inception)]
mod explorer;
mod stats;

pub use config::ExplorerConfig;
pub use explorer::{ExplorationReport, Explorer, ProgressSink, StopHandle, StopReason};
pub use stats::RunStats;
