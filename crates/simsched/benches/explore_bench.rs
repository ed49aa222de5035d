//! Exploration Benchmark Suite
//!
//! Measures the per-run cost of the engine, which is dominated by worker
//! thread start-up and the rendezvous hand-off at every trap.
//!
//! # Scenarios
//!
//! 1. **Single run**: N tasks yielding K times each
//!    - Raw trap round-trip cost
//!
//! 2. **AB-BA exploration**: 100 runs of the classic deadlock
//!    - Spawn/cancel/join overhead for short runs
//!
//! 3. **Strategy comparison**: uniform vs PCT on the same task set

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use simsched::{
    simulate, Explorer, ExplorerConfig, Mutex, RunConfig, Strategy, TaskContext, TaskSet,
};

fn yielding(tasks: usize, yields: usize) -> TaskSet<()> {
    TaskSet::stateless().tasks(tasks, move |_: &(), _| {
        move |cx: &TaskContext| {
            for _ in 0..yields {
                cx.yield_now()?;
            }
            Ok(())
        }
    })
}

fn abba() -> TaskSet<(Mutex, Mutex)> {
    TaskSet::new(|| (Mutex::new("A"), Mutex::new("B")))
        .task(|(a, b): &(Mutex, Mutex)| {
            let (a, b) = (a.clone(), b.clone());
            move |cx: &TaskContext| {
                a.acquire(cx)?;
                b.acquire(cx)?;
                b.release(cx)?;
                a.release(cx)
            }
        })
        .task(|(a, b): &(Mutex, Mutex)| {
            let (a, b) = (a.clone(), b.clone());
            move |cx: &TaskContext| {
                b.acquire(cx)?;
                a.acquire(cx)?;
                a.release(cx)?;
                b.release(cx)
            }
        })
}

// ============================================================================
// Benchmarks
// ============================================================================

fn bench_single_run(c: &mut Criterion) {
    let mut group = c.benchmark_group("single_run");
    for &(tasks, yields) in &[(2, 10), (4, 10), (4, 100)] {
        let set = yielding(tasks, yields);
        group.bench_with_input(
            BenchmarkId::new("yield", format!("{}x{}", tasks, yields)),
            &set,
            |b, set| {
                let mut seed = 0u64;
                b.iter(|| {
                    seed += 1;
                    black_box(simulate(set, &RunConfig::default(), seed).unwrap())
                });
            },
        );
    }
    group.finish();
}

fn bench_abba_exploration(c: &mut Criterion) {
    c.bench_function("abba_100_runs", |b| {
        b.iter(|| {
            let report = Explorer::new(abba(), ExplorerConfig::default().max_iterations(100).random_seed(1))
                .unwrap()
                .run()
                .unwrap();
            black_box(report.stats)
        });
    });
}

fn bench_strategies(c: &mut Criterion) {
    let mut group = c.benchmark_group("strategy");
    let strategies = [
        ("uniform", Strategy::Uniform),
        ("pct_d2", Strategy::Pct { depth: 2, horizon: 40 }),
        ("pct_d3", Strategy::Pct { depth: 3, horizon: 40 }),
    ];
    for (name, strategy) in strategies {
        group.bench_function(name, |b| {
            b.iter(|| {
                let config = ExplorerConfig::default()
                    .max_iterations(50)
                    .random_seed(9)
                    .strategy(strategy);
                black_box(Explorer::new(yielding(3, 10), config).unwrap().run().unwrap().stats)
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_single_run, bench_abba_exploration, bench_strategies);
criterion_main!(benches);
