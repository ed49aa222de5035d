//! Explorer Configuration
//!
//! Plain data with builder-style setters. Serializable so a front end can
//! load it from, or echo it as, JSON.
//!
//! # Example
//!
//! ```rust
//! use simsched::domain::explorer::ExplorerConfig;
//! use simsched::domain::scheduler::Strategy;
//!
//! let config = ExplorerConfig::default()
//!     .max_iterations(1000)
//!     .random_seed(42)
//!     .strategy(Strategy::Pct { depth: 2, horizon: 50 })
//!     .dedup_outcomes(true);
//!
//! assert!(config.validate().is_ok());
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::scheduler::{ConfigError, RunConfig, Strategy, DEFAULT_MAX_STEPS};

/// Loop controller options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplorerConfig {
    /// Stop after this many runs; `None` runs until stopped
    pub max_iterations: Option<usize>,

    /// Per-run step budget
    pub max_steps: usize,

    /// Base seed; drawn from entropy when `None`
    pub random_seed: Option<u64>,

    /// Choice source used for each run
    pub strategy: Strategy,

    /// Hand only the first occurrence of each distinct outcome to the
    /// collector
    pub dedup_outcomes: bool,

    /// How often the progress reporter fires
    #[serde(with = "millis")]
    pub report_interval: Duration,
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            max_iterations: None,
            max_steps: DEFAULT_MAX_STEPS,
            random_seed: None,
            strategy: Strategy::Uniform,
            dedup_outcomes: false,
            report_interval: Duration::from_secs(1),
        }
    }
}

impl ExplorerConfig {
    /// Cap the number of runs
    pub fn max_iterations(mut self, runs: usize) -> Self {
        self.max_iterations = Some(runs);
        self
    }

    /// Set the per-run step budget
    pub fn max_steps(mut self, steps: usize) -> Self {
        self.max_steps = steps;
        self
    }

    /// Fix the base seed
    pub fn random_seed(mut self, seed: u64) -> Self {
        self.random_seed = Some(seed);
        self
    }

    /// Choose the exploration strategy
    pub fn strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Enable or disable outcome deduplication
    pub fn dedup_outcomes(mut self, enabled: bool) -> Self {
        self.dedup_outcomes = enabled;
        self
    }

    /// Set the progress interval
    pub fn report_interval(mut self, interval: Duration) -> Self {
        self.report_interval = interval;
        self
    }

    /// Per-run part of the configuration
    pub fn run_config(&self) -> RunConfig {
        RunConfig::default().max_steps(self.max_steps)
    }

    /// Reject unusable values
    ///
    /// # Errors
    /// The first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_iterations == Some(0) {
            return Err(ConfigError::ZeroIterations);
        }
        self.run_config().validate()?;
        self.strategy.validate()
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
