//! Anonymous-pipe rendezvous.
//!
//! The pipe is created before the fork point so both processes inherit the
//! descriptors. After the fork each side closes the end it does not use;
//! without that, the waiter's own inherited write end would keep the pipe
//! open and EOF detection of a vanished peer could never fire.

use std::io;
use std::os::unix::io::RawFd;

use super::errors::{ResourceInitError, SyncError};
use super::{ffi, Backend, SyncOptions};
use crate::process::Role;

const SIGNAL_BYTE: u8 = b'X';

/// Both pipe ends, inherited through the fork. The waiter (parent) keeps the
/// read end, the signaler (child) keeps the write end.
pub struct PipeChannel {
    read_fd: Option<RawFd>,
    write_fd: Option<RawFd>,
}

impl PipeChannel {
    pub fn create(_opts: &SyncOptions) -> Result<Self, ResourceInitError> {
        let mut fds = [0 as libc::c_int; 2];
        ffi::cvt(unsafe { libc::pipe(fds.as_mut_ptr()) })
            .map_err(|e| ResourceInitError::new(Backend::Pipe, "pipe", e))?;
        Ok(PipeChannel {
            read_fd: Some(fds[0]),
            write_fd: Some(fds[1]),
        })
    }

    pub fn post_fork(&mut self, role: Role) -> Result<(), SyncError> {
        match role {
            Role::Parent => {
                if let Some(fd) = self.write_fd.take() {
                    ffi::close_quiet(fd);
                }
            }
            Role::Child => {
                if let Some(fd) = self.read_fd.take() {
                    ffi::close_quiet(fd);
                }
            }
        }
        Ok(())
    }

    pub fn signal_ready(&mut self) -> Result<(), SyncError> {
        let fd = self
            .write_fd
            .ok_or_else(|| closed_end(Backend::Pipe, "write end"))?;
        ffi::write_byte(fd, SIGNAL_BYTE).map_err(|e| SyncError::io(Backend::Pipe, "write", e))
    }

    pub fn wait_ready(&mut self) -> Result<(), SyncError> {
        let fd = self
            .read_fd
            .ok_or_else(|| closed_end(Backend::Pipe, "read end"))?;
        match ffi::read_byte(fd).map_err(|e| SyncError::io(Backend::Pipe, "read", e))? {
            Some(_) => Ok(()),
            None => Err(SyncError::Broken {
                backend: Backend::Pipe,
            }),
        }
    }

    pub fn cleanup(&mut self, _role: Role) -> Result<(), SyncError> {
        // Nothing named to unlink; each process closes its own copies.
        self.close_all();
        Ok(())
    }

    fn close_all(&mut self) {
        if let Some(fd) = self.read_fd.take() {
            ffi::close_quiet(fd);
        }
        if let Some(fd) = self.write_fd.take() {
            ffi::close_quiet(fd);
        }
    }
}

impl Drop for PipeChannel {
    fn drop(&mut self) {
        self.close_all();
    }
}

fn closed_end(backend: Backend, end: &'static str) -> SyncError {
    SyncError::io(
        backend,
        end,
        io::Error::new(io::ErrorKind::NotConnected, "descriptor already closed"),
    )
}
