//! System V message-queue rendezvous.
//!
//! The queue is keyed by `ftok` of the rendezvous directory and a fixed
//! project tag, so both processes (and nothing else pointed at a different
//! directory) resolve the same queue. The signal is a single type-1 message
//! carrying a fixed-size `CHILD_DONE` text; the waiter blocks in `msgrcv`
//! until a message of that type arrives.
//!
//! A second `signal_ready` on this backend is harmless: it just enqueues
//! another message, which the parent removes with the queue.

use std::io;

use super::errors::{ResourceInitError, SyncError};
use super::{ffi, Backend, SyncOptions};
use crate::process::Role;

/// ftok project tag for the queue key.
const PROJECT_TAG: u8 = b'A';
/// Message type used for the done notification. SysV types must be > 0.
const DONE_TYPE: libc::c_long = 1;
const TEXT_LEN: usize = 20;
const DONE_TEXT: &[u8] = b"CHILD_DONE";

#[repr(C)]
struct MsgBuf {
    mtype: libc::c_long,
    mtext: [u8; TEXT_LEN],
}

/// Queue id shared through the fork; the parent created the queue and owns
/// its removal.
pub struct MsgQueue {
    id: libc::c_int,
    removed: bool,
}

impl MsgQueue {
    pub fn create(opts: &SyncOptions) -> Result<Self, ResourceInitError> {
        let key = ffi::ftok(&opts.base_dir, PROJECT_TAG)
            .map_err(|e| ResourceInitError::new(Backend::MessageQueue, "ftok", e))?;
        let id = unsafe { libc::msgget(key, 0o666 | libc::IPC_CREAT) };
        if id == -1 {
            return Err(ResourceInitError::new(
                Backend::MessageQueue,
                "msgget",
                io::Error::last_os_error(),
            ));
        }
        // Drain messages left behind by an aborted prior run. A stale
        // CHILD_DONE would satisfy this run's wait before any signal was
        // sent; this is the queue's equivalent of the semaphore's SETVAL
        // reset.
        let mut buf = MsgBuf {
            mtype: 0,
            mtext: [0; TEXT_LEN],
        };
        loop {
            let n = unsafe {
                libc::msgrcv(
                    id,
                    &mut buf as *mut MsgBuf as *mut libc::c_void,
                    TEXT_LEN,
                    0,
                    libc::IPC_NOWAIT,
                )
            };
            if n < 0 {
                // ENOMSG: empty. Any other error surfaces on first real use.
                break;
            }
        }
        Ok(MsgQueue { id, removed: false })
    }

    pub fn signal_ready(&mut self) -> Result<(), SyncError> {
        let mut buf = MsgBuf {
            mtype: DONE_TYPE,
            mtext: [0; TEXT_LEN],
        };
        buf.mtext[..DONE_TEXT.len()].copy_from_slice(DONE_TEXT);
        let ret = unsafe {
            libc::msgsnd(
                self.id,
                &buf as *const MsgBuf as *const libc::c_void,
                TEXT_LEN,
                0,
            )
        };
        ffi::cvt(ret)
            .map(|_| ())
            .map_err(|e| SyncError::io(Backend::MessageQueue, "msgsnd", e))
    }

    pub fn wait_ready(&mut self) -> Result<(), SyncError> {
        let mut buf = MsgBuf {
            mtype: 0,
            mtext: [0; TEXT_LEN],
        };
        loop {
            let n = unsafe {
                libc::msgrcv(
                    self.id,
                    &mut buf as *mut MsgBuf as *mut libc::c_void,
                    TEXT_LEN,
                    DONE_TYPE,
                    0,
                )
            };
            if n >= 0 {
                return Ok(());
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(SyncError::io(Backend::MessageQueue, "msgrcv", err));
            }
        }
    }

    pub fn cleanup(&mut self, role: Role) -> Result<(), SyncError> {
        if role != Role::Parent || self.removed {
            return Ok(());
        }
        self.removed = true;
        let ret = unsafe { libc::msgctl(self.id, libc::IPC_RMID, std::ptr::null_mut()) };
        if ret == -1 {
            let err = io::Error::last_os_error();
            // Already gone is fine; a previous cleanup or crashed run won.
            if err.raw_os_error() != Some(libc::EINVAL)
                && err.raw_os_error() != Some(libc::EIDRM)
            {
                return Err(SyncError::io(Backend::MessageQueue, "msgctl IPC_RMID", err));
            }
        }
        Ok(())
    }
}
