//! Interchangeable parent/child synchronization backends.
//!
//! Every backend implements the same two-operation contract: the signaling
//! role calls `signal_ready` exactly once per experiment, the waiting role
//! calls `wait_ready` and blocks until that signal has been observed. The
//! single guarantee everything else depends on is that `signal_ready`
//! happens-before the corresponding `wait_ready` return.
//!
//! # Ownership of named resources
//!
//! Named artifacts (FIFO path, socket path, lock file, SysV queue/semaphore
//! keys) are single-owner-per-experiment: the role that created them (the
//! parent, since creation happens before the fork point) removes them in
//! `cleanup`, and the other role never attempts removal. Anonymous
//! resources (pipe descriptors, shared mappings, the signal flag) are
//! inherited through the fork and need only per-process teardown.
//!
//! # Blocking behavior
//!
//! `wait_ready` blocks in the kernel for every backend except the two
//! flag-polling ones (`SharedMemoryFlag`, `Signal`), which sleep in a
//! bounded poll loop at [`SyncOptions::poll_interval`]. No backend supports
//! cancellation or timeouts; a peer that crashes before signaling is only
//! detectable on the byte-channel backends (as [`SyncError::Broken`]).

pub mod errors;
mod ffi;
pub mod fifo;
pub mod file_lock;
pub mod msg_queue;
pub mod pipe;
pub mod semaphore;
pub mod shm_flag;
pub mod signal;
pub mod socket;

#[cfg(test)]
mod tests;

pub use errors::{ResourceInitError, SyncError};
pub use fifo::FifoChannel;
pub use file_lock::LockFile;
pub use msg_queue::MsgQueue;
pub use pipe::PipeChannel;
pub use semaphore::SemSet;
pub use shm_flag::ShmFlag;
pub use signal::SignalFlag;
pub use socket::SocketRendezvous;

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::process::Role;

/// Tag selecting a synchronization backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Backend {
    Fifo,
    Pipe,
    SharedMemoryFlag,
    FileLock,
    MessageQueue,
    Semaphore,
    Signal,
    UnixSocket,
}

impl Backend {
    /// Every backend, in the order the demo suite runs them.
    pub const ALL: [Backend; 8] = [
        Backend::Fifo,
        Backend::Pipe,
        Backend::SharedMemoryFlag,
        Backend::FileLock,
        Backend::MessageQueue,
        Backend::Semaphore,
        Backend::Signal,
        Backend::UnixSocket,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Backend::Fifo => "fifo",
            Backend::Pipe => "pipe",
            Backend::SharedMemoryFlag => "shm",
            Backend::FileLock => "flock",
            Backend::MessageQueue => "msgq",
            Backend::Semaphore => "sem",
            Backend::Signal => "signal",
            Backend::UnixSocket => "socket",
        }
    }

    pub fn from_label(s: &str) -> Option<Backend> {
        Backend::ALL.iter().copied().find(|b| b.label() == s)
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Naming and timing knobs shared by every backend.
#[derive(Clone, Debug)]
pub struct SyncOptions {
    /// Directory under which named rendezvous artifacts live. SysV keys are
    /// derived from it via ftok, so two runs pointed at different
    /// directories can never collide on a queue or semaphore.
    pub base_dir: PathBuf,
    /// Distinguishes this run's filesystem artifacts from a previous run's
    /// leftovers.
    pub run_tag: u32,
    /// Poll delay for the flag-based backends.
    pub poll_interval: Duration,
}

impl SyncOptions {
    /// Options for a normal run: artifacts under the system temp directory,
    /// a random run tag, 10ms polls.
    pub fn for_run() -> Self {
        SyncOptions {
            base_dir: std::env::temp_dir(),
            run_tag: rand::thread_rng().gen(),
            poll_interval: Duration::from_millis(10),
        }
    }

    /// Unique rendezvous path for a named artifact.
    pub(crate) fn path_for(&self, stem: &str) -> PathBuf {
        self.base_dir
            .join(format!("{}-{}-{:08x}", stem, std::process::id(), self.run_tag))
    }
}

/// A constructed backend instance for one experiment.
///
/// The factory is [`SyncPrimitive::create`]; everything else dispatches to
/// the chosen variant. Variants with no work for an operation return `Ok`.
pub enum SyncPrimitive {
    Fifo(FifoChannel),
    Pipe(PipeChannel),
    SharedMemoryFlag(ShmFlag),
    FileLock(LockFile),
    MessageQueue(MsgQueue),
    Semaphore(SemSet),
    Signal(SignalFlag),
    UnixSocket(SocketRendezvous),
}

impl SyncPrimitive {
    /// Build a fresh instance. Must be called before the fork point so both
    /// roles inherit the resource or can reach it by name.
    pub fn create(backend: Backend, opts: &SyncOptions) -> Result<Self, ResourceInitError> {
        match backend {
            Backend::Fifo => FifoChannel::create(opts).map(SyncPrimitive::Fifo),
            Backend::Pipe => PipeChannel::create(opts).map(SyncPrimitive::Pipe),
            Backend::SharedMemoryFlag => ShmFlag::create(opts).map(SyncPrimitive::SharedMemoryFlag),
            Backend::FileLock => LockFile::create(opts).map(SyncPrimitive::FileLock),
            Backend::MessageQueue => MsgQueue::create(opts).map(SyncPrimitive::MessageQueue),
            Backend::Semaphore => SemSet::create(opts).map(SyncPrimitive::Semaphore),
            Backend::Signal => SignalFlag::create(opts).map(SyncPrimitive::Signal),
            Backend::UnixSocket => SocketRendezvous::create(opts).map(SyncPrimitive::UnixSocket),
        }
    }

    pub fn backend(&self) -> Backend {
        match self {
            SyncPrimitive::Fifo(_) => Backend::Fifo,
            SyncPrimitive::Pipe(_) => Backend::Pipe,
            SyncPrimitive::SharedMemoryFlag(_) => Backend::SharedMemoryFlag,
            SyncPrimitive::FileLock(_) => Backend::FileLock,
            SyncPrimitive::MessageQueue(_) => Backend::MessageQueue,
            SyncPrimitive::Semaphore(_) => Backend::Semaphore,
            SyncPrimitive::Signal(_) => Backend::Signal,
            SyncPrimitive::UnixSocket(_) => Backend::UnixSocket,
        }
    }

    /// Descriptor discipline right after the fork point: close or drop the
    /// endpoint copies this role must not hold.
    pub fn post_fork(&mut self, role: Role) -> Result<(), SyncError> {
        match self {
            SyncPrimitive::Pipe(p) => p.post_fork(role),
            SyncPrimitive::FileLock(l) => l.post_fork(role),
            SyncPrimitive::UnixSocket(s) => s.post_fork(role),
            _ => Ok(()),
        }
    }

    /// Role-specific protocol step before the child's critical-section
    /// sleep. Only the file-lock backend does anything here: its child must
    /// already hold the lock when the parent tries to take it.
    pub fn lead_in(&mut self, role: Role) -> Result<(), SyncError> {
        match self {
            SyncPrimitive::FileLock(l) => l.lead_in(role),
            _ => Ok(()),
        }
    }

    /// Announce readiness/completion. Exactly once per experiment; only the
    /// message-queue and semaphore backends tolerate a second call.
    pub fn signal_ready(&mut self) -> Result<(), SyncError> {
        match self {
            SyncPrimitive::Fifo(f) => f.signal_ready(),
            SyncPrimitive::Pipe(p) => p.signal_ready(),
            SyncPrimitive::SharedMemoryFlag(s) => s.signal_ready(),
            SyncPrimitive::FileLock(l) => l.signal_ready(),
            SyncPrimitive::MessageQueue(q) => q.signal_ready(),
            SyncPrimitive::Semaphore(s) => s.signal_ready(),
            SyncPrimitive::Signal(s) => s.signal_ready(),
            SyncPrimitive::UnixSocket(s) => s.signal_ready(),
        }
    }

    /// Block until the signal has been observed.
    pub fn wait_ready(&mut self) -> Result<(), SyncError> {
        match self {
            SyncPrimitive::Fifo(f) => f.wait_ready(),
            SyncPrimitive::Pipe(p) => p.wait_ready(),
            SyncPrimitive::SharedMemoryFlag(s) => s.wait_ready(),
            SyncPrimitive::FileLock(l) => l.wait_ready(),
            SyncPrimitive::MessageQueue(q) => q.wait_ready(),
            SyncPrimitive::Semaphore(s) => s.wait_ready(),
            SyncPrimitive::Signal(s) => s.wait_ready(),
            SyncPrimitive::UnixSocket(s) => s.wait_ready(),
        }
    }

    /// Release the resource. Named artifacts are removed only when `role`
    /// is the owning role (the parent).
    pub fn cleanup(&mut self, role: Role) -> Result<(), SyncError> {
        match self {
            SyncPrimitive::Fifo(f) => f.cleanup(role),
            SyncPrimitive::Pipe(p) => p.cleanup(role),
            SyncPrimitive::SharedMemoryFlag(s) => s.cleanup(role),
            SyncPrimitive::FileLock(l) => l.cleanup(role),
            SyncPrimitive::MessageQueue(q) => q.cleanup(role),
            SyncPrimitive::Semaphore(s) => s.cleanup(role),
            SyncPrimitive::Signal(s) => s.cleanup(role),
            SyncPrimitive::UnixSocket(s) => s.cleanup(role),
        }
    }
}
