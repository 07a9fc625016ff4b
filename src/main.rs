mod harness;
mod process;
mod sync;

use std::env;

use harness::{Experiment, RunReport, Runner};
use sync::{Backend, SyncOptions};

fn main() {
    let args: Vec<String> = env::args().collect();

    match args.get(1).map(String::as_str) {
        Some("list") => {
            list_suite();
        }
        Some("one") => match args.get(2).and_then(|s| Backend::from_label(s)) {
            Some(backend) => {
                let report = run(&experiments_for(backend));
                finish(&report);
            }
            None => {
                eprintln!("Unknown backend: {:?}", args.get(2));
                print_usage();
                std::process::exit(2);
            }
        },
        Some("run") | None => {
            let report = run(&full_suite());
            finish(&report);
        }
        _ => {
            print_usage();
            std::process::exit(2);
        }
    }
}

fn print_usage() {
    eprintln!("Usage: forksync [command]");
    eprintln!("Commands:");
    eprintln!("  run             - Run the full experiment suite (default)");
    eprintln!("  one <backend>   - Run one backend's experiments");
    eprintln!("  list            - List the suite without running it");
    eprintln!("Backends:");
    for backend in Backend::ALL {
        eprintln!("  {}", backend);
    }
}

/// The canned pair every backend gets: two waited repetitions plus one
/// where the parent does not observe the exit status.
fn experiments_for(backend: Backend) -> Vec<Experiment> {
    vec![
        Experiment::standard(backend, 2, true),
        Experiment::standard(backend, 1, false),
    ]
}

fn full_suite() -> Vec<Experiment> {
    Backend::ALL
        .iter()
        .flat_map(|&b| experiments_for(b))
        .collect()
}

fn list_suite() {
    for experiment in full_suite() {
        println!(
            "{:<40} backend={:<8} repetitions={} parent_waits={}",
            experiment.label, experiment.backend, experiment.repetitions, experiment.parent_waits
        );
    }
}

fn run(experiments: &[Experiment]) -> RunReport {
    println!(
        "[M]: ({},{})",
        process::current_pid(),
        process::parent_pid()
    );
    let runner = Runner::new(SyncOptions::for_run());
    runner.run(experiments)
}

fn finish(report: &RunReport) {
    let failed = report.total_failed();
    println!(
        "[RUNNER] {} repetitions, {} failed",
        report.total_repetitions(),
        failed
    );
    if failed > 0 {
        std::process::exit(1);
    }
}
