//! A declarative scenario and the per-repetition state machine that runs it.
//!
//! One repetition walks: create primitive -> fork -> role logic on each side
//! (the child signals, the parent waits, except the lock backend's inverted
//! lead-in) -> reap -> cleanup. The child path terminates its process and
//! never returns to harness code.

use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::report::{FailureStage, RepetitionOutcome};
use crate::process::{self, ExitStatus, Forked, Pid, Role};
use crate::sync::{Backend, SyncError, SyncOptions, SyncPrimitive};

/// Immutable description of one scenario. Owned by the runner for the whole
/// run; both roles see an independent copy-on-write snapshot of it after the
/// fork point.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Experiment {
    /// Human-readable label for report lines.
    pub label: String,
    pub backend: Backend,
    pub repetitions: u32,
    /// Parent's sleep before it starts waiting.
    pub sleep_parent: Duration,
    /// Child's critical-section sleep before it signals.
    pub sleep_child: Duration,
    /// Both roles' sleep after the rendezvous.
    pub sleep_post: Duration,
    /// Whether the child's exit status is part of the observed outcome. The
    /// child is reaped before the repetition returns either way, so no
    /// zombie ever survives into the next repetition.
    pub parent_waits: bool,
}

impl Experiment {
    /// Scenario with the canned timing the demo suite uses.
    pub fn standard(backend: Backend, repetitions: u32, parent_waits: bool) -> Self {
        let label = if parent_waits {
            format!("{} synchronization", backend)
        } else {
            format!("{} synchronization, no wait", backend)
        };
        Experiment {
            label,
            backend,
            repetitions,
            sleep_parent: Duration::from_secs(1),
            sleep_child: Duration::from_secs(3),
            sleep_post: Duration::from_secs(1),
            parent_waits,
        }
    }

    /// Run one repetition to completion.
    ///
    /// On the child path this never returns: the child exits once its role
    /// logic is done (0 on success, 1 if its side of the protocol failed).
    pub fn run_once(&self, opts: &SyncOptions) -> RepetitionOutcome {
        let mut primitive = match SyncPrimitive::create(self.backend, opts) {
            Ok(p) => p,
            Err(e) => return RepetitionOutcome::failed(FailureStage::Init, e.to_string()),
        };

        match process::fork() {
            Ok(Forked::Child) => {
                let code = match self.child_path(&mut primitive) {
                    Ok(()) => 0,
                    Err(e) => {
                        eprintln!("[C]: ({}) {}", process::current_pid(), e);
                        1
                    }
                };
                process::exit_child(code);
            }
            Ok(Forked::Parent { child }) => self.parent_path(&mut primitive, child),
            Err(e) => {
                // Fork refused: no child exists, the parent owns teardown.
                let _ = primitive.cleanup(Role::Parent);
                RepetitionOutcome::failed(FailureStage::Spawn, e.to_string())
            }
        }
    }

    fn child_path(&self, primitive: &mut SyncPrimitive) -> Result<(), SyncError> {
        let role = Role::Child;
        announce(role);
        primitive.post_fork(role)?;
        primitive.lead_in(role)?;
        sleep_role(role, self.sleep_child);
        event(role, &format!("signaling through {}", self.backend));
        primitive.signal_ready()?;
        sleep_role(role, self.sleep_post);
        primitive.cleanup(role)?;
        Ok(())
    }

    fn parent_path(&self, primitive: &mut SyncPrimitive, child: Pid) -> RepetitionOutcome {
        let role = Role::Parent;
        announce(role);
        let mut failure: Option<(FailureStage, String)> = None;

        if let Err(e) = primitive.post_fork(role) {
            failure = Some((FailureStage::Sync, e.to_string()));
        }

        if failure.is_none() {
            sleep_role(role, self.sleep_parent);
            event(role, &format!("waiting on {} rendezvous", self.backend));
            match primitive.wait_ready() {
                Ok(()) => {
                    event(role, "rendezvous complete");
                    sleep_role(role, self.sleep_post);
                }
                Err(e) => failure = Some((FailureStage::Sync, e.to_string())),
            }
        }

        // Reap on every path; the process table must be clean before the
        // next repetition reuses the backend's well-known name or key.
        let mut exit = None;
        match process::reap(child) {
            Ok(status) => {
                if self.parent_waits {
                    event(role, &format!("child has exited: {}", status));
                    exit = Some(status);
                    if failure.is_none() && status != ExitStatus::Exited(0) {
                        failure = Some((
                            FailureStage::Reap,
                            format!("child reported failure: {}", status),
                        ));
                    }
                }
            }
            Err(e) => {
                if failure.is_none() {
                    failure = Some((FailureStage::Reap, e.to_string()));
                }
            }
        }

        if let Err(e) = primitive.cleanup(role) {
            if failure.is_none() {
                failure = Some((FailureStage::Cleanup, e.to_string()));
            }
        }

        match failure {
            None => RepetitionOutcome::passed(exit),
            Some((stage, error)) => RepetitionOutcome::failed(stage, error),
        }
    }
}

/// Event line in the `[{role}]: (pid,ppid)` shape the harness logs with.
fn event(role: Role, msg: &str) {
    println!(
        "[{}]: ({},{}) {}",
        role.tag(),
        process::current_pid(),
        process::parent_pid(),
        msg
    );
}

fn announce(role: Role) {
    println!(
        "[{}]: ({},{})",
        role.tag(),
        process::current_pid(),
        process::parent_pid()
    );
}

fn sleep_role(role: Role, duration: Duration) {
    if duration.is_zero() {
        return;
    }
    event(role, &format!("sleep for {:?}", duration));
    thread::sleep(duration);
}
