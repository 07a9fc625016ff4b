//! Process-pair primitives: the fork point, role tracking, and reaping.
//!
//! A fork duplicates the calling process into two independently scheduled
//! processes sharing a copy-on-write snapshot of memory. Writes made after
//! the fork point are never visible across the boundary except through a
//! sync primitive or a mapping that was deliberately shared before the fork.

use std::fmt;
use std::io;

use serde::{Deserialize, Serialize};

use super::errors::{ReapError, SpawnError};

/// Operating-system process id.
pub type Pid = libc::pid_t;

/// Which side of the fork point this process is on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Parent,
    Child,
}

impl Role {
    /// One-letter tag used in event lines.
    pub fn tag(self) -> &'static str {
        match self {
            Role::Parent => "P",
            Role::Child => "C",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// The two divergent control paths produced by the fork point.
#[derive(Clone, Copy, Debug)]
pub enum Forked {
    /// Parent path; holds the child's pid for signaling and reaping.
    Parent { child: Pid },
    /// Child path. Must terminate via [`exit_child`], never fall through
    /// into parent-only logic.
    Child,
}

impl Forked {
    pub fn role(&self) -> Role {
        match self {
            Forked::Parent { .. } => Role::Parent,
            Forked::Child => Role::Child,
        }
    }
}

/// Duplicate the calling process.
pub fn fork() -> Result<Forked, SpawnError> {
    // SAFETY: plain fork. The child path is constrained by callers to run
    // its role logic and terminate with `exit_child`.
    let pid = unsafe { libc::fork() };
    if pid < 0 {
        return Err(SpawnError::Refused(io::Error::last_os_error()));
    }
    if pid == 0 {
        Ok(Forked::Child)
    } else {
        Ok(Forked::Parent { child: pid })
    }
}

/// Terminate the child path without unwinding back into harness code.
///
/// Uses `_exit` so the child never runs the parent's atexit handlers or
/// flushes inherited stdio buffers twice.
pub fn exit_child(code: i32) -> ! {
    unsafe { libc::_exit(code) }
}

/// Pid of the calling process.
pub fn current_pid() -> Pid {
    unsafe { libc::getpid() }
}

/// Pid of the calling process's parent, as observed right now.
pub fn parent_pid() -> Pid {
    unsafe { libc::getppid() }
}

/// Exit record of a reaped child.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitStatus {
    /// Child exited normally with this code.
    Exited(i32),
    /// Child was terminated by this signal number.
    Signaled(i32),
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitStatus::Exited(code) => write!(f, "exit status {}", code),
            ExitStatus::Signaled(sig) => write!(f, "killed by signal {}", sig),
        }
    }
}

/// Blocking wait for a specific child, converting the handle into an exit
/// record. After this returns the child's pid is invalid.
pub fn reap(child: Pid) -> Result<ExitStatus, ReapError> {
    let mut status: libc::c_int = 0;
    let ret = unsafe { libc::waitpid(child, &mut status, 0) };
    if ret < 0 {
        return Err(ReapError::WaitFailed(io::Error::last_os_error()));
    }
    if libc::WIFEXITED(status) {
        Ok(ExitStatus::Exited(libc::WEXITSTATUS(status)))
    } else if libc::WIFSIGNALED(status) {
        Ok(ExitStatus::Signaled(libc::WTERMSIG(status)))
    } else {
        Err(ReapError::Unexpected { raw: status })
    }
}
