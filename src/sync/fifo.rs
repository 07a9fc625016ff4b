//! Named-pipe rendezvous.
//!
//! The FIFO is a filesystem-visible channel created before the fork point so
//! both processes can open it independently by path. The protocol is a
//! single byte: the signaler opens the write end and writes it, the waiter
//! opens the read end and blocks until it arrives. A writer that opens its
//! end and exits without writing shows up as EOF on the read side.

use std::io;
use std::path::{Path, PathBuf};

use super::errors::{ResourceInitError, SyncError};
use super::{ffi, Backend, SyncOptions};
use crate::process::Role;

const SIGNAL_BYTE: u8 = b'X';

/// A FIFO created before the fork point. The parent created the name and
/// owns its removal.
pub struct FifoChannel {
    path: PathBuf,
}

impl FifoChannel {
    pub fn create(opts: &SyncOptions) -> Result<Self, ResourceInitError> {
        let path = opts.path_for("sync-fifo");
        let c = ffi::cstring(&path)
            .map_err(|e| ResourceInitError::new(Backend::Fifo, "fifo path", e))?;
        let ret = unsafe { libc::mkfifo(c.as_ptr(), 0o666) };
        if ret == -1 {
            let err = io::Error::last_os_error();
            // A leftover FIFO from an aborted run is reusable as-is.
            if err.raw_os_error() != Some(libc::EEXIST) {
                return Err(ResourceInitError::new(Backend::Fifo, "mkfifo", err));
            }
        }
        Ok(FifoChannel { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn signal_ready(&mut self) -> Result<(), SyncError> {
        // Blocks in open until the waiter has the read end open.
        let fd = ffi::open(&self.path, libc::O_WRONLY, 0)
            .map_err(|e| SyncError::io(Backend::Fifo, "open write end", e))?;
        let res = ffi::write_byte(fd, SIGNAL_BYTE);
        ffi::close_quiet(fd);
        res.map_err(|e| SyncError::io(Backend::Fifo, "write", e))
    }

    pub fn wait_ready(&mut self) -> Result<(), SyncError> {
        let fd = ffi::open(&self.path, libc::O_RDONLY, 0)
            .map_err(|e| SyncError::io(Backend::Fifo, "open read end", e))?;
        let res = ffi::read_byte(fd);
        ffi::close_quiet(fd);
        match res {
            Ok(Some(_)) => Ok(()),
            Ok(None) => Err(SyncError::Broken {
                backend: Backend::Fifo,
            }),
            Err(e) => Err(SyncError::io(Backend::Fifo, "read", e)),
        }
    }

    pub fn cleanup(&mut self, role: Role) -> Result<(), SyncError> {
        // Single-owner teardown: only the creator removes the name, so the
        // other side never deletes a FIFO its peer is still using.
        if role != Role::Parent {
            return Ok(());
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SyncError::io(Backend::Fifo, "unlink", e)),
        }
    }
}
