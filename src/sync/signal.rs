//! Signal rendezvous.
//!
//! The waiting role installs a SIGUSR1 handler before the fork point; the
//! signaling role later `kill`s the waiter's pid, recorded at construction
//! time (construction happens in the process that becomes the parent). The
//! handler runs preemptively and therefore does exactly one thing: an
//! atomic store into a flag. The waiter polls that flag at the configured
//! interval, which gives this backend the same documented polling latency
//! as the shared-memory flag.
//!
//! The flag is necessarily process-global: a signal handler cannot reach
//! instance state. `create` resets it, so at most one signal rendezvous is
//! meaningful per process at a time.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use super::errors::{ResourceInitError, SyncError};
use super::{Backend, SyncOptions};
use crate::process::{current_pid, Pid, Role};

/// Set from the handler, read from the waiting flow. Async-signal-safe
/// because the handler performs only this atomic store.
static SIGNAL_SEEN: AtomicBool = AtomicBool::new(false);

extern "C" fn on_sigusr1(signum: libc::c_int) {
    if signum == libc::SIGUSR1 {
        SIGNAL_SEEN.store(true, Ordering::SeqCst);
    }
}

/// SIGUSR1-based rendezvous. The handler stays installed after cleanup;
/// reverting to SIG_DFL would turn a late stray signal into process death.
pub struct SignalFlag {
    /// Pid the signaler targets: the creating (parent-to-be) process.
    target: Pid,
    poll_interval: Duration,
}

impl SignalFlag {
    pub fn create(opts: &SyncOptions) -> Result<Self, ResourceInitError> {
        // SAFETY: sigaction with a handler that is async-signal-safe (one
        // atomic store, no allocation, no locks).
        let ret = unsafe {
            let mut sa: libc::sigaction = std::mem::zeroed();
            sa.sa_sigaction = on_sigusr1 as extern "C" fn(libc::c_int) as libc::sighandler_t;
            libc::sigemptyset(&mut sa.sa_mask);
            libc::sigaction(libc::SIGUSR1, &sa, std::ptr::null_mut())
        };
        if ret == -1 {
            return Err(ResourceInitError::new(
                Backend::Signal,
                "sigaction",
                io::Error::last_os_error(),
            ));
        }
        SIGNAL_SEEN.store(false, Ordering::SeqCst);
        Ok(SignalFlag {
            target: current_pid(),
            poll_interval: opts.poll_interval,
        })
    }

    pub fn signal_ready(&mut self) -> Result<(), SyncError> {
        let ret = unsafe { libc::kill(self.target, libc::SIGUSR1) };
        if ret == -1 {
            return Err(SyncError::io(
                Backend::Signal,
                "kill",
                io::Error::last_os_error(),
            ));
        }
        Ok(())
    }

    pub fn wait_ready(&mut self) -> Result<(), SyncError> {
        while !SIGNAL_SEEN.load(Ordering::SeqCst) {
            thread::sleep(self.poll_interval);
        }
        Ok(())
    }

    pub fn cleanup(&mut self, _role: Role) -> Result<(), SyncError> {
        // Anonymous backend: no named resource, nothing to remove.
        Ok(())
    }
}

/// Serializes tests that exercise the process-global flag.
#[cfg(test)]
pub(crate) static SIGNAL_TEST_GUARD: std::sync::Mutex<()> = std::sync::Mutex::new(());
