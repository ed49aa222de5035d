//! Run Statistics

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::scheduler::Outcome;

/// Running tally of an exploration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    /// Runs executed
    pub total: usize,
    /// Runs that completed
    pub completed: usize,
    /// Runs that deadlocked
    pub deadlocked: usize,
    /// Runs that hit the step budget
    pub diverged: usize,
    /// Runs with at least one task fault, whatever their outcome
    pub faulted: usize,
    /// Distinct outcomes seen so far
    pub distinct: usize,
}

impl RunStats {
    /// Count one run
    pub fn record<O>(&mut self, outcome: &Outcome<O>, first_occurrence: bool) {
        self.total += 1;
        match outcome {
            Outcome::Completed { .. } => self.completed += 1,
            Outcome::Deadlocked { .. } => self.deadlocked += 1,
            Outcome::Diverged { .. } => self.diverged += 1,
        }
        if outcome.is_faulted() {
            self.faulted += 1;
        }
        if first_occurrence {
            self.distinct += 1;
        }
    }
}

impl fmt::Display for RunStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} runs: {} completed, {} deadlocked, {} diverged, {} faulted, {} distinct",
            self.total, self.completed, self.deadlocked, self.diverged, self.faulted, self.distinct
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::scheduler::{FaultKind, TaskFault, Trace};
    use crate::domain::task::TaskId;

    #[test]
    fn test_record_counts_each_kind() {
        let mut stats = RunStats::default();
        stats.record(&Outcome::Completed { state: 1, faults: vec![] }, true);
        stats.record(&Outcome::Completed { state: 1, faults: vec![] }, false);
        stats.record(
            &Outcome::<i32>::Deadlocked {
                blocked: [TaskId(0)].into_iter().collect(),
                trace: Trace::default(),
                faults: vec![TaskFault {
                    task: TaskId(1),
                    kind: FaultKind::WorkerLost,
                }],
            },
            true,
        );
        stats.record(&Outcome::<i32>::Diverged { step_count: 9, faults: vec![] }, true);

        assert_eq!(
            stats,
            RunStats {
                total: 4,
                completed: 2,
                deadlocked: 1,
                diverged: 1,
                faulted: 1,
                distinct: 3,
            }
        );
    }

    #[test]
    fn test_stats_serialize() {
        let stats = RunStats {
            total: 2,
            completed: 2,
            ..RunStats::default()
        };
        let json = serde_json::to_string(&stats).unwrap();
        assert!(json.contains("\"total\":2"));
        let back: RunStats = serde_json::from_str(&json).unwrap();
        assert_eq!(back, stats);
    }
}
