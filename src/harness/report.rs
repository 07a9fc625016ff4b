//! Outcome records for experiments and runs.
//!
//! Each repetition produces one [`RepetitionOutcome`]; the runner folds them
//! into per-experiment and per-run reports. The records are plain data so a
//! failure can be diagnosed after the fact without re-running.

use serde::{Deserialize, Serialize};

use crate::process::ExitStatus;
use crate::sync::Backend;

/// Which stage of a repetition failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureStage {
    /// The backend's OS resource could not be created.
    Init,
    /// Process creation was refused.
    Spawn,
    /// The rendezvous protocol itself failed.
    Sync,
    /// The child could not be reaped, or exited abnormally.
    Reap,
    /// Resource teardown failed.
    Cleanup,
}

/// Result of a single repetition of an experiment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RepetitionOutcome {
    Passed {
        /// The child's exit record, present when the experiment was
        /// configured to observe it.
        exit: Option<ExitStatus>,
    },
    Failed {
        stage: FailureStage,
        error: String,
    },
}

impl RepetitionOutcome {
    pub fn passed(exit: Option<ExitStatus>) -> Self {
        RepetitionOutcome::Passed { exit }
    }

    pub fn failed(stage: FailureStage, error: impl Into<String>) -> Self {
        RepetitionOutcome::Failed {
            stage,
            error: error.into(),
        }
    }

    pub fn is_pass(&self) -> bool {
        matches!(self, RepetitionOutcome::Passed { .. })
    }
}

/// All repetition outcomes for one experiment.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExperimentReport {
    pub label: String,
    pub backend: Backend,
    pub outcomes: Vec<RepetitionOutcome>,
}

impl ExperimentReport {
    pub fn passed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_pass()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.passed()
    }

    pub fn all_passed(&self) -> bool {
        self.failed() == 0
    }
}

/// Aggregate of a whole run.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RunReport {
    pub experiments: Vec<ExperimentReport>,
}

impl RunReport {
    pub fn all_passed(&self) -> bool {
        self.experiments.iter().all(|e| e.all_passed())
    }

    pub fn total_repetitions(&self) -> usize {
        self.experiments.iter().map(|e| e.outcomes.len()).sum()
    }

    pub fn total_failed(&self) -> usize {
        self.experiments.iter().map(|e| e.failed()).sum()
    }
}
