//! Experiment harness: declarative scenarios, the sequential runner, and
//! per-repetition outcome records.

pub mod experiment;
pub mod report;
pub mod runner;


pub use experiment::Experiment;
pub use report::{ExperimentReport, FailureStage, RepetitionOutcome, RunReport};
pub use runner::Runner;
