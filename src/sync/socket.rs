//! Unix-domain socket rendezvous.
//!
//! A listener is bound to a well-known path before the fork point. After the
//! fork the waiting role acts as server and blocks in accept; the signaling
//! role connects as a client and sends a fixed payload, then closes. The
//! server reads to end-of-stream, so a client that connects and dies without
//! sending anything is distinguishable (zero bytes) from a real signal.

use std::io::{self, Read, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};

use super::errors::{ResourceInitError, SyncError};
use super::{Backend, SyncOptions};
use crate::process::Role;

const DONE_PAYLOAD: &[u8] = b"CHILD_DONE";

/// Listening endpoint bound before the fork point; the parent created the
/// path and owns its removal.
pub struct SocketRendezvous {
    path: PathBuf,
    listener: Option<UnixListener>,
}

impl SocketRendezvous {
    pub fn create(opts: &SyncOptions) -> Result<Self, ResourceInitError> {
        let path = opts.path_for("sync-socket");
        // A stale path from an aborted run would make bind fail.
        match std::fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(ResourceInitError::new(
                    Backend::UnixSocket,
                    "unlink stale socket",
                    e,
                ))
            }
        }
        let listener = UnixListener::bind(&path)
            .map_err(|e| ResourceInitError::new(Backend::UnixSocket, "bind", e))?;
        Ok(SocketRendezvous {
            path,
            listener: Some(listener),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn post_fork(&mut self, role: Role) -> Result<(), SyncError> {
        // The client side drops its inherited copy of the listener so only
        // the server holds the accepting descriptor.
        if role == Role::Child {
            self.listener = None;
        }
        Ok(())
    }

    pub fn signal_ready(&mut self) -> Result<(), SyncError> {
        let mut stream = UnixStream::connect(&self.path)
            .map_err(|e| SyncError::io(Backend::UnixSocket, "connect", e))?;
        stream
            .write_all(DONE_PAYLOAD)
            .map_err(|e| SyncError::io(Backend::UnixSocket, "send", e))
    }

    pub fn wait_ready(&mut self) -> Result<(), SyncError> {
        let listener = self.listener.as_ref().ok_or_else(|| {
            SyncError::io(
                Backend::UnixSocket,
                "accept",
                io::Error::new(io::ErrorKind::NotConnected, "listener not held by this role"),
            )
        })?;
        let (mut stream, _addr) = listener
            .accept()
            .map_err(|e| SyncError::io(Backend::UnixSocket, "accept", e))?;
        // Read until the client closes; short reads are possible in theory
        // even for a 10-byte payload.
        let mut received = Vec::with_capacity(DONE_PAYLOAD.len());
        stream
            .read_to_end(&mut received)
            .map_err(|e| SyncError::io(Backend::UnixSocket, "recv", e))?;
        if received.is_empty() {
            return Err(SyncError::Broken {
                backend: Backend::UnixSocket,
            });
        }
        Ok(())
    }

    pub fn cleanup(&mut self, role: Role) -> Result<(), SyncError> {
        self.listener = None;
        if role != Role::Parent {
            return Ok(());
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SyncError::io(Backend::UnixSocket, "unlink", e)),
        }
    }
}
