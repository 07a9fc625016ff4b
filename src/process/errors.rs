use std::fmt;
use std::io;

/// Process creation was refused by the OS.
/// Fatal to the current experiment, never to the whole run.
#[derive(Debug)]
pub enum SpawnError {
    /// `fork` returned -1 (typically EAGAIN under resource exhaustion).
    Refused(io::Error),
}

impl fmt::Display for SpawnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpawnError::Refused(e) => write!(f, "fork refused by OS: {}", e),
        }
    }
}

impl From<io::Error> for SpawnError {
    fn from(e: io::Error) -> Self {
        SpawnError::Refused(e)
    }
}

/// Collecting a child's exit status failed or produced something unexpected.
/// Reported, not fatal.
#[derive(Debug)]
pub enum ReapError {
    /// `waitpid` itself failed.
    WaitFailed(io::Error),
    /// The child was neither exited nor signaled (e.g. stopped).
    Unexpected {
        /// Raw wait status as returned by the OS.
        raw: i32,
    },
}

impl fmt::Display for ReapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReapError::WaitFailed(e) => write!(f, "waitpid failed: {}", e),
            ReapError::Unexpected { raw } => {
                write!(f, "unexpected wait status 0x{:x}", raw)
            }
        }
    }
}

impl From<io::Error> for ReapError {
    fn from(e: io::Error) -> Self {
        ReapError::WaitFailed(e)
    }
}
