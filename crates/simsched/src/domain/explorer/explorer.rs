//! Loop Controller
//!
//! Repeats independent runs of a [`TaskSet`] and reduces their outcomes.
//!
//! ```text
//! base_seed ─┬─ seed_for(base, 0) → run 0 → collector? → stop_when? ─┐
//!            ├─ seed_for(base, 1) → run 1 → collector? → stop_when? ─┤
//!            └─ ...                                                   │
//!    stop on: max_iterations │ predicate match │ stop handle ←────────┘
//! ```
//!
//! Runs execute one after another, so the collector sees outcomes in run
//! order. Every run gets a fresh task set instance and its own choice
//! source; nothing leaks from one run into the next.
//!
//! Callback errors are never swallowed: a failing collector ends the
//! exploration with [`SimError::Callback`].
//!
//! Distinct outcomes are remembered by a 64-bit fingerprint, not by value,
//! so memory stays flat however long an unbounded exploration runs.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use super::config::ExplorerConfig;
use super::stats::RunStats;
use crate::domain::scheduler::{
    run_once, seed_for, ConfigError, Outcome, RunRecord, SimError, TaskSet,
};

type StopPredicate<O> = Box<dyn FnMut(&Outcome<O>) -> bool>;
type Collector<O> = Box<dyn FnMut(&Outcome<O>) -> anyhow::Result<()>>;

/// Receives periodic progress updates
pub trait ProgressSink {
    /// Called with the time since the exploration started
    fn report(&mut self, elapsed: Duration, stats: &RunStats);
}

impl<F: FnMut(Duration, &RunStats)> ProgressSink for F {
    fn report(&mut self, elapsed: Duration, stats: &RunStats) {
        self(elapsed, stats);
    }
}

/// Cooperative cancellation flag, safe to trip from another thread
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    /// Ask the exploration to stop after the current run
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether a stop was requested
    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Why an exploration ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// `max_iterations` runs were executed
    BudgetExhausted,
    /// The stop predicate matched the last run
    PredicateMatched,
    /// The stop handle was tripped
    Interrupted,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::BudgetExhausted => write!(f, "iteration budget exhausted"),
            StopReason::PredicateMatched => write!(f, "stop predicate matched"),
            StopReason::Interrupted => write!(f, "interrupted"),
        }
    }
}

/// Summary of an exploration
#[derive(Debug, Clone)]
pub struct ExplorationReport<O> {
    /// Final tally
    pub stats: RunStats,
    /// Base seed the run seeds were derived from
    pub base_seed: u64,
    /// Why the loop ended
    pub stop_reason: StopReason,
    /// Most recent run, kept for diagnosis
    pub last: Option<RunRecord<O>>,
}

struct Ticker {
    interval: Duration,
    started: Instant,
    last: Instant,
    sink: Box<dyn ProgressSink>,
}

impl Ticker {
    fn tick(&mut self, stats: &RunStats) {
        let now = Instant::now();
        if now.duration_since(self.last) >= self.interval {
            self.last = now;
            self.sink.report(now.duration_since(self.started), stats);
        }
    }
}

/// Drives many runs of one task set
pub struct Explorer<S, O> {
    task_set: TaskSet<S, O>,
    config: ExplorerConfig,
    stop_when: Option<StopPredicate<O>>,
    collector: Option<Collector<O>>,
    progress: Option<Box<dyn ProgressSink>>,
    stop: StopHandle,
}

impl<S: 'static, O: Hash + 'static> Explorer<S, O> {
    /// Validate the task set and config
    ///
    /// # Errors
    /// [`ConfigError`] if the task set is empty or an option is unusable.
    pub fn new(task_set: TaskSet<S, O>, config: ExplorerConfig) -> Result<Self, ConfigError> {
        task_set.validate()?;
        config.validate()?;
        Ok(Self {
            task_set,
            config,
            stop_when: None,
            collector: None,
            progress: None,
            stop: StopHandle::default(),
        })
    }

    /// Stop as soon as an outcome satisfies `predicate`
    pub fn stop_when(mut self, predicate: impl FnMut(&Outcome<O>) -> bool + 'static) -> Self {
        self.stop_when = Some(Box::new(predicate));
        self
    }

    /// Hand outcomes to `collector`
    ///
    /// Called once per run in run order, or once per distinct outcome when
    /// `dedup_outcomes` is set.
    pub fn collect(
        mut self,
        collector: impl FnMut(&Outcome<O>) -> anyhow::Result<()> + 'static,
    ) -> Self {
        self.collector = Some(Box::new(collector));
        self
    }

    /// Report progress through `sink` every `interval`
    pub fn report_every(mut self, interval: Duration, sink: impl ProgressSink + 'static) -> Self {
        self.config.report_interval = interval;
        self.progress = Some(Box::new(sink));
        self
    }

    /// Handle that stops the exploration after the current run
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Effective configuration
    pub fn config(&self) -> &ExplorerConfig {
        &self.config
    }

    /// Run until the budget is spent, the predicate matches or a stop is
    /// requested
    ///
    /// # Errors
    /// [`SimError::Spawn`] if a worker cannot be started,
    /// [`SimError::Callback`] if the collector fails.
    pub fn run(mut self) -> Result<ExplorationReport<O>, SimError> {
        let base_seed = self.config.random_seed.unwrap_or_else(rand::random);
        let run_config = self.config.run_config();

        info!(
            base_seed,
            tasks = self.task_set.len(),
            max_iterations = ?self.config.max_iterations,
            strategy = ?self.config.strategy,
            "exploration started"
        );

        let started = Instant::now();
        let mut ticker = self.progress.take().map(|sink| Ticker {
            interval: self.config.report_interval,
            started,
            last: started,
            sink,
        });

        let mut stats = RunStats::default();
        let mut seen: HashSet<u64> = HashSet::new();
        let mut last = None;
        let mut index = 0;

        let stop_reason = loop {
            if self.config.max_iterations.map_or(false, |max| index >= max) {
                break StopReason::BudgetExhausted;
            }
            if self.stop.is_stopped() {
                break StopReason::Interrupted;
            }

            let seed = seed_for(base_seed, index);
            let choice = self.config.strategy.source(seed);
            let record = run_once(&self.task_set, &run_config, choice, index, seed)?;

            let first_occurrence = seen.insert(fingerprint(&record.outcome));
            stats.record(&record.outcome, first_occurrence);
            debug!(run = index, seed, outcome = record.outcome.kind(), first_occurrence, "run finished");

            if !self.config.dedup_outcomes || first_occurrence {
                if let Some(collector) = self.collector.as_mut() {
                    collector(&record.outcome).map_err(SimError::Callback)?;
                }
            }

            let matched = self
                .stop_when
                .as_mut()
                .map_or(false, |predicate| predicate(&record.outcome));

            last = Some(record);
            index += 1;

            if let Some(ticker) = ticker.as_mut() {
                ticker.tick(&stats);
            }
            if matched {
                break StopReason::PredicateMatched;
            }
        };

        info!(
            %stats,
            reason = %stop_reason,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "exploration finished"
        );

        Ok(ExplorationReport {
            stats,
            base_seed,
            stop_reason,
            last,
        })
    }
}

fn fingerprint<O: Hash>(outcome: &Outcome<O>) -> u64 {
    let mut hasher = DefaultHasher::new();
    outcome.hash(&mut hasher);
    hasher.finish()
}
