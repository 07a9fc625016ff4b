//! Lock-file rendezvous.
//!
//! Unlike every other backend there is no literal message or flag here: lock
//! acquisition order itself is the signal. The child takes the exclusive
//! lock before its critical-section sleep and releases it afterwards; the
//! parent's wait is its own acquisition of the same lock, which blocks until
//! the child lets go.
//!
//! Two deliberate properties carried over from the protocol this models:
//!
//! - The rendezvous only works if the child locks before the parent tries
//!   to. With a zero parent sleep the parent can win the race and acquire
//!   immediately, learning nothing. Callers keep the parent's pre-wait sleep
//!   above zero to give the child its head start; this race is documented,
//!   not fixed.
//! - `flock` locks belong to the open file description. Each role therefore
//!   opens its own descriptor after the fork point; a descriptor inherited
//!   from before the fork would make both roles share one description and
//!   the second acquisition would succeed instantly instead of blocking.

use std::io;
use std::os::unix::io::RawFd;
use std::path::{Path, PathBuf};

use super::errors::{ResourceInitError, SyncError};
use super::{ffi, Backend, SyncOptions};
use crate::process::Role;

/// An exclusively lockable file created before the fork point. Each role
/// holds its own descriptor, opened in `post_fork`.
pub struct LockFile {
    path: PathBuf,
    fd: Option<RawFd>,
}

impl LockFile {
    pub fn create(opts: &SyncOptions) -> Result<Self, ResourceInitError> {
        let path = opts.path_for("sync-lock");
        let fd = ffi::open(&path, libc::O_RDWR | libc::O_CREAT, 0o666)
            .map_err(|e| ResourceInitError::new(Backend::FileLock, "open lock file", e))?;
        // Give the file some content, as a plain marker of what it is.
        let ret = unsafe { libc::write(fd, b"lock".as_ptr() as *const libc::c_void, 4) };
        ffi::close_quiet(fd);
        if ret == -1 {
            return Err(ResourceInitError::new(
                Backend::FileLock,
                "write lock file",
                io::Error::last_os_error(),
            ));
        }
        Ok(LockFile { path, fd: None })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn post_fork(&mut self, _role: Role) -> Result<(), SyncError> {
        // Per-role descriptor, so the two roles get distinct open file
        // descriptions and flock actually blocks between them.
        let fd = ffi::open(&self.path, libc::O_RDWR, 0)
            .map_err(|e| SyncError::io(Backend::FileLock, "open lock file", e))?;
        self.fd = Some(fd);
        Ok(())
    }

    /// Child-side head start: take the exclusive lock before the
    /// critical-section sleep begins.
    pub fn lead_in(&mut self, role: Role) -> Result<(), SyncError> {
        if role != Role::Child {
            return Ok(());
        }
        let fd = self.descriptor()?;
        ffi::flock(fd, libc::LOCK_EX).map_err(|e| SyncError::io(Backend::FileLock, "flock", e))
    }

    /// Release the lock held since `lead_in`.
    pub fn signal_ready(&mut self) -> Result<(), SyncError> {
        let fd = self.descriptor()?;
        ffi::flock(fd, libc::LOCK_UN).map_err(|e| SyncError::io(Backend::FileLock, "unlock", e))
    }

    /// Acquire the lock, blocking until the child's release, then drop it
    /// again right away. The acquisition is the rendezvous; nothing is
    /// otherwise done under the lock, and releasing here leaves the file
    /// free for the next repetition.
    pub fn wait_ready(&mut self) -> Result<(), SyncError> {
        let fd = self.descriptor()?;
        ffi::flock(fd, libc::LOCK_EX).map_err(|e| SyncError::io(Backend::FileLock, "flock", e))?;
        ffi::flock(fd, libc::LOCK_UN).map_err(|e| SyncError::io(Backend::FileLock, "unlock", e))
    }

    pub fn cleanup(&mut self, role: Role) -> Result<(), SyncError> {
        if let Some(fd) = self.fd.take() {
            ffi::close_quiet(fd);
        }
        if role != Role::Parent {
            return Ok(());
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SyncError::io(Backend::FileLock, "unlink", e)),
        }
    }

    fn descriptor(&self) -> Result<RawFd, SyncError> {
        self.fd.ok_or_else(|| {
            SyncError::io(
                Backend::FileLock,
                "lock descriptor",
                io::Error::new(io::ErrorKind::NotConnected, "post_fork not called"),
            )
        })
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        if let Some(fd) = self.fd.take() {
            ffi::close_quiet(fd);
        }
    }
}
