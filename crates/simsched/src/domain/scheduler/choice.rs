//! Choice Sources - the only nondeterminism in a run
//!
//! At every step the scheduler hands the id-sorted list of runnable tasks to
//! a [`ChoiceSource`] and resumes the task at the returned index. Everything
//! else in a run is deterministic, so the sequence of indices fully
//! describes the interleaving.
//!
//! | Source            | Behaviour                                         |
//! |-------------------|---------------------------------------------------|
//! | [`UniformChoice`] | uniform pick, seeded `SmallRng`                   |
//! | [`PctChoice`]     | random priorities with `depth - 1` change points  |
//! | [`ReplayChoice`]  | recorded indices, then index 0                    |

use std::collections::HashMap;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::types::ConfigError;
use crate::domain::task::TaskId;

/// Picks the next task to resume
pub trait ChoiceSource: Send {
    /// Return an index into `runnable` (never empty, sorted by id)
    ///
    /// Out-of-range answers are clamped to the last element.
    fn choose(&mut self, runnable: &[TaskId]) -> usize;
}

/// Uniform random selection
pub struct UniformChoice {
    rng: SmallRng,
}

impl UniformChoice {
    /// Create a source with a fixed seed
    pub fn new(seed: u64) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
        }
    }
}

impl ChoiceSource for UniformChoice {
    fn choose(&mut self, runnable: &[TaskId]) -> usize {
        self.rng.gen_range(0..runnable.len())
    }
}

/// Replays recorded decisions
pub struct ReplayChoice {
    choices: Vec<usize>,
    cursor: usize,
}

impl ReplayChoice {
    /// Replay `choices` in order
    pub fn new(choices: Vec<usize>) -> Self {
        Self { choices, cursor: 0 }
    }
}

impl ChoiceSource for ReplayChoice {
    fn choose(&mut self, _runnable: &[TaskId]) -> usize {
        let choice = self.choices.get(self.cursor).copied().unwrap_or(0);
        self.cursor += 1;
        choice
    }
}

/// Probabilistic concurrency testing
///
/// Each task gets a random initial priority above `depth` when first seen.
/// `depth - 1` change points are drawn uniformly from `1..=horizon`; when
/// the step counter hits the i-th change point, the task about to run is
/// demoted to priority `i`, below every initial priority. The runnable task
/// with the highest priority always runs.
///
/// A bug that needs `d` ordering constraints is found with probability at
/// least `1 / (n * k^(d-1))` per run, for `n` tasks and `k` steps.
pub struct PctChoice {
    rng: SmallRng,
    depth: usize,
    priorities: HashMap<TaskId, u64>,
    change_points: Vec<usize>,
    step: usize,
}

impl PctChoice {
    /// Create a PCT source for bugs of the given depth
    pub fn new(seed: u64, depth: usize, horizon: usize) -> Self {
        let mut rng = SmallRng::seed_from_u64(seed);
        let change_points = (1..depth.max(1))
            .map(|_| rng.gen_range(1..=horizon.max(1)))
            .collect();
        Self {
            rng,
            depth,
            priorities: HashMap::new(),
            change_points,
            step: 0,
        }
    }

    fn priority(&mut self, task: TaskId) -> u64 {
        let floor = self.depth as u64;
        let rng = &mut self.rng;
        *self
            .priorities
            .entry(task)
            .or_insert_with(|| floor + u64::from(rng.gen::<u32>()))
    }

    fn highest(&mut self, runnable: &[TaskId]) -> usize {
        let mut best = 0;
        let mut best_priority = 0;
        for (index, task) in runnable.iter().enumerate() {
            let priority = self.priority(*task);
            if index == 0 || priority > best_priority {
                best = index;
                best_priority = priority;
            }
        }
        best
    }
}

impl ChoiceSource for PctChoice {
    fn choose(&mut self, runnable: &[TaskId]) -> usize {
        self.step += 1;
        let mut chosen = self.highest(runnable);

        let step = self.step;
        if let Some(i) = self.change_points.iter().position(|&p| p == step) {
            self.priorities.insert(runnable[chosen], i as u64 + 1);
            chosen = self.highest(runnable);
        }
        chosen
    }
}

/// Exploration strategy, i.e. which choice source each run gets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Strategy {
    /// [`UniformChoice`]
    #[default]
    Uniform,

    /// [`PctChoice`]
    Pct {
        /// Bug depth targeted
        depth: usize,
        /// Expected number of steps per run
        horizon: usize,
    },
}

impl Strategy {
    /// Build the choice source for one run
    pub fn source(&self, seed: u64) -> Box<dyn ChoiceSource> {
        match *self {
            Strategy::Uniform => Box::new(UniformChoice::new(seed)),
            Strategy::Pct { depth, horizon } => Box::new(PctChoice::new(seed, depth, horizon)),
        }
    }

    /// Reject unusable parameters
    ///
    /// # Errors
    /// [`ConfigError::ZeroPctDepth`] or [`ConfigError::ZeroPctHorizon`]
    pub fn validate(&self) -> Result<(), ConfigError> {
        match *self {
            Strategy::Uniform => Ok(()),
            Strategy::Pct { depth: 0, .. } => Err(ConfigError::ZeroPctDepth),
            Strategy::Pct { horizon: 0, .. } => Err(ConfigError::ZeroPctHorizon),
            Strategy::Pct { .. } => Ok(()),
        }
    }
}

/// Seed of run `index` derived from an exploration's base seed (SplitMix64)
///
/// Any single run of an exploration can be reproduced from
/// `(base_seed, index)` without replaying the runs before it.
pub fn seed_for(base_seed: u64, index: usize) -> u64 {
    let mut z = base_seed.wrapping_add((index as u64).wrapping_add(1).wrapping_mul(0x9E37_79B9_7F4A_7C15));
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
