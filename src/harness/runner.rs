//! Sequences experiments and folds their outcomes into a run report.

use super::experiment::Experiment;
use super::report::{ExperimentReport, RepetitionOutcome, RunReport};
use crate::sync::SyncOptions;

/// Runs a fixed ordered list of experiments, each repeated sequentially.
///
/// Repetitions never overlap: several backends reuse one well-known name or
/// key, and a second fork/sync/reap cycle starting before the first has
/// fully torn down would corrupt its signal. One experiment failing never
/// aborts the rest of the run.
pub struct Runner {
    opts: SyncOptions,
}

impl Runner {
    pub fn new(opts: SyncOptions) -> Self {
        Runner { opts }
    }

    pub fn run(&self, experiments: &[Experiment]) -> RunReport {
        let mut report = RunReport::default();
        for experiment in experiments {
            report.experiments.push(self.run_experiment(experiment));
        }
        report
    }

    fn run_experiment(&self, experiment: &Experiment) -> ExperimentReport {
        println!("{}", experiment.label);
        println!("------");
        let mut outcomes = Vec::with_capacity(experiment.repetitions as usize);
        for repetition in 0..experiment.repetitions {
            println!("\t----{}", repetition);
            let outcome = experiment.run_once(&self.opts);
            match &outcome {
                RepetitionOutcome::Passed { .. } => {
                    println!(
                        "[RUNNER] {} repetition {}: pass",
                        experiment.backend, repetition
                    );
                }
                RepetitionOutcome::Failed { stage, error } => {
                    eprintln!(
                        "[RUNNER] {} repetition {}: FAILED at {:?}: {}",
                        experiment.backend, repetition, stage, error
                    );
                }
            }
            outcomes.push(outcome);
            println!("\t----{}", repetition);
        }
        println!("------");
        ExperimentReport {
            label: experiment.label.clone(),
            backend: experiment.backend,
            outcomes,
        }
    }
}
