use std::fmt;
use std::io;

use super::Backend;

/// A named OS resource for a backend could not be created.
/// Fatal to the current experiment only; the run continues.
#[derive(Debug)]
pub struct ResourceInitError {
    pub backend: Backend,
    /// Which creation step failed (e.g. "mkfifo", "semget").
    pub op: &'static str,
    pub source: io::Error,
}

impl ResourceInitError {
    pub fn new(backend: Backend, op: &'static str, source: io::Error) -> Self {
        ResourceInitError {
            backend,
            op,
            source,
        }
    }
}

impl fmt::Display for ResourceInitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} backend: {} failed during resource creation: {}",
            self.backend, self.op, self.source
        )
    }
}

/// Mid-protocol failure of a backend operation.
#[derive(Debug)]
pub enum SyncError {
    /// The signaling side vanished without ever signaling. Detected on the
    /// byte-channel backends (Pipe, Fifo, UnixSocket) as a zero-byte read.
    Broken { backend: Backend },
    /// Reserved for timed waits. No backend implements timeouts; a waiter
    /// whose peer never signals and never closes blocks forever.
    Timeout { backend: Backend },
    /// An underlying OS operation failed.
    Io {
        backend: Backend,
        op: &'static str,
        source: io::Error,
    },
}

impl SyncError {
    pub fn io(backend: Backend, op: &'static str, source: io::Error) -> Self {
        SyncError::Io {
            backend,
            op,
            source,
        }
    }

    pub fn is_broken(&self) -> bool {
        matches!(self, SyncError::Broken { .. })
    }
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncError::Broken { backend } => {
                write!(f, "{} backend: peer closed without signaling", backend)
            }
            SyncError::Timeout { backend } => {
                write!(f, "{} backend: wait timed out", backend)
            }
            SyncError::Io {
                backend,
                op,
                source,
            } => {
                write!(f, "{} backend: {} failed: {}", backend, op, source)
            }
        }
    }
}
