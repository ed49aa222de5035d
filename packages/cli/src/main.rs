use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use simsched::adapters::LogProgress;
use simsched::infrastructure::logging;
use simsched::{
    ExplorationReport, Explorer, ExplorerConfig, Mutex, Outcome, SharedCell, Strategy,
    TaskContext, TaskSet,
};
use tracing::info;

/// simsched - explore interleavings of cooperative tasks
#[derive(Parser)]
#[command(name = "simsched", version)]
#[command(about = "Simulated scheduling demos", long_about = None)]
struct Cli {
    #[command(flatten)]
    explore: ExploreArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ExploreArgs {
    /// Number of runs (unbounded until Ctrl+C when omitted)
    #[arg(long, global = true)]
    iterations: Option<usize>,

    /// Base seed for reproducible explorations
    #[arg(long, global = true)]
    seed: Option<u64>,

    /// Step budget per run
    #[arg(long, global = true, default_value_t = simsched::domain::scheduler::DEFAULT_MAX_STEPS)]
    max_steps: usize,

    /// Use PCT scheduling with this bug depth instead of uniform choice
    #[arg(long, global = true)]
    pct_depth: Option<usize>,

    /// Steps per run assumed by PCT
    #[arg(long, global = true, default_value_t = 100)]
    pct_horizon: usize,

    /// Progress report interval in seconds
    #[arg(long, global = true, default_value_t = 1)]
    report_secs: u64,

    /// Print the final summary as JSON
    #[arg(long, global = true)]
    json: bool,
}

impl ExploreArgs {
    fn config(&self) -> ExplorerConfig {
        let mut config = ExplorerConfig::default()
            .max_steps(self.max_steps)
            .report_interval(Duration::from_secs(self.report_secs));
        if let Some(runs) = self.iterations {
            config = config.max_iterations(runs);
        }
        if let Some(seed) = self.seed {
            config = config.random_seed(seed);
        }
        if let Some(depth) = self.pct_depth {
            config = config.strategy(Strategy::Pct {
                depth,
                horizon: self.pct_horizon,
            });
        }
        config
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Tasks locking mutex pairs in a cycle; prints every distinct deadlock
    Mutexes {
        /// Number of tasks (and mutexes) in the cycle
        #[arg(long, default_value_t = 3)]
        tasks: usize,
    },
    /// Non-atomic shared counter; prints a histogram of final values
    Counter {
        /// Number of incrementing tasks
        #[arg(long, default_value_t = 3)]
        tasks: usize,

        /// Increments per task
        #[arg(long, default_value_t = 1)]
        incs: usize,
    },
}

fn main() -> Result<()> {
    logging::init("info");

    let cli = Cli::parse();
    let config = cli.explore.config();

    info!("simsched {}", simsched::VERSION);

    match cli.command {
        Commands::Mutexes { tasks } => run_mutexes(tasks, config, cli.explore.json),
        Commands::Counter { tasks, incs } => run_counter(tasks, incs, config, cli.explore.json),
    }
}

/// Wire Ctrl+C and progress reporting, then run
fn explore<S: 'static, O: std::hash::Hash + 'static>(
    explorer: Explorer<S, O>,
) -> Result<ExplorationReport<O>> {
    let handle = explorer.stop_handle();
    ctrlc::set_handler(move || handle.stop()).context("failed to install Ctrl+C handler")?;

    let interval = explorer.config().report_interval;
    let report = explorer.report_every(interval, LogProgress).run()?;
    Ok(report)
}

/// Print the run summary; with `--json`, `results` lands in the same document
fn print_summary<O>(
    report: &ExplorationReport<O>,
    config: &ExplorerConfig,
    json: bool,
    results: (&str, serde_json::Value),
) -> Result<()> {
    if json {
        let mut summary = serde_json::json!({
            "base_seed": report.base_seed,
            "stop_reason": report.stop_reason,
            "stats": report.stats,
            "config": config,
        });
        let (key, value) = results;
        summary[key] = value;
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("{} (base seed {}, {})", report.stats, report.base_seed, report.stop_reason);
    }
    Ok(())
}

fn run_mutexes(tasks: usize, config: ExplorerConfig, json: bool) -> Result<()> {
    let task_set = TaskSet::new(move || {
        (0..tasks)
            .map(|i| Mutex::new(format!("L{}", i)))
            .collect::<Vec<_>>()
    })
    .tasks(tasks, move |locks: &Vec<Mutex>, n| {
        let first = locks[n].clone();
        let second = locks[(n + 1) % locks.len()].clone();
        move |cx: &TaskContext| {
            first.acquire(cx)?;
            second.acquire(cx)?;
            second.release(cx)?;
            first.release(cx)
        }
    });

    let deadlocks = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&deadlocks);

    let explorer = Explorer::new(task_set, config.clone().dedup_outcomes(true))?.collect(
        move |outcome: &Outcome<()>| {
            if let Outcome::Deadlocked { trace, .. } = outcome {
                sink.borrow_mut().push(trace.to_string());
            }
            Ok(())
        },
    );
    let report = explore(explorer)?;

    let deadlocks = deadlocks.take();
    if !json {
        for (i, trace) in deadlocks.iter().enumerate() {
            println!("--- deadlock #{} ---\n{}", i + 1, trace);
        }
    }
    print_summary(&report, &config, json, ("deadlocks", deadlocks.into()))
}

fn run_counter(tasks: usize, incs: usize, config: ExplorerConfig, json: bool) -> Result<()> {
    let task_set = TaskSet::new(|| SharedCell::new(0usize))
        .tasks(tasks, move |cell: &SharedCell<usize>, _| {
            let cell = cell.clone();
            move |cx: &TaskContext| {
                for _ in 0..incs {
                    let value = cell.get();
                    cx.yield_now()?;
                    cell.set(value + 1);
                }
                Ok(())
            }
        })
        .observe(|cell: &SharedCell<usize>| cell.get());

    let histogram = Rc::new(RefCell::new(BTreeMap::<usize, usize>::new()));
    let sink = Rc::clone(&histogram);

    let explorer = Explorer::new(task_set, config.clone())?.collect(move |outcome| {
        if let Some(value) = outcome.state() {
            *sink.borrow_mut().entry(*value).or_default() += 1;
        }
        Ok(())
    });
    let report = explore(explorer)?;

    let histogram = histogram.take();
    if !json {
        println!("final value histogram (expected {}):", tasks * incs);
        for (value, count) in &histogram {
            println!("  {:>4}: {}", value, count);
        }
    }
    let histogram: BTreeMap<String, usize> = histogram
        .into_iter()
        .map(|(value, count)| (value.to_string(), count))
        .collect();
    print_summary(&report, &config, json, ("histogram", serde_json::to_value(histogram)?))
}
