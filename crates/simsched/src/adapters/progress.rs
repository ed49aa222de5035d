//! Progress sinks
//!
//! Ready-made [`ProgressSink`] implementations for long explorations.

use std::time::Duration;

use tracing::info;

use crate::domain::explorer::{ProgressSink, RunStats};

/// Logs a progress line at `info` level
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn report(&mut self, elapsed: Duration, stats: &RunStats) {
        info!(
            elapsed_s = elapsed.as_secs(),
            runs_per_s = rate(stats.total, elapsed),
            "{}",
            stats
        );
    }
}

/// Writes a human readable line to stderr
///
/// Mirrors the classic "N runs in T seconds" ticker; handy when logging is
/// off.
#[derive(Debug, Default, Clone, Copy)]
pub struct StderrProgress;

impl ProgressSink for StderrProgress {
    fn report(&mut self, elapsed: Duration, stats: &RunStats) {
        eprintln!("[{:>6.1}s] {}", elapsed.as_secs_f64(), stats);
    }
}

fn rate(runs: usize, elapsed: Duration) -> u64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        (runs as f64 / secs) as u64
    } else {
        0
    }
}
