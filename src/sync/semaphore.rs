//! System V semaphore rendezvous.
//!
//! A set of one counting semaphore, keyed like the message queue by `ftok`
//! of the rendezvous directory, initialized to 0 (locked). The signal is the
//! classic V operation (+1); the wait is P (-1), which blocks in the kernel
//! until the counter goes positive. A second signal merely leaves the
//! counter at 1, which the removal of the set discards.

use std::io;

use super::errors::{ResourceInitError, SyncError};
use super::{ffi, Backend, SyncOptions};
use crate::process::Role;

/// ftok project tag for the semaphore key, distinct from the queue's.
const PROJECT_TAG: u8 = b'B';

/// Semaphore-set id shared through the fork; parent owns removal.
pub struct SemSet {
    id: libc::c_int,
    removed: bool,
}

impl SemSet {
    pub fn create(opts: &SyncOptions) -> Result<Self, ResourceInitError> {
        let key = ffi::ftok(&opts.base_dir, PROJECT_TAG)
            .map_err(|e| ResourceInitError::new(Backend::Semaphore, "ftok", e))?;
        let id = unsafe { libc::semget(key, 1, 0o666 | libc::IPC_CREAT) };
        if id == -1 {
            return Err(ResourceInitError::new(
                Backend::Semaphore,
                "semget",
                io::Error::last_os_error(),
            ));
        }
        // Start locked. This also resets a leftover set from a prior run.
        let ret = unsafe { libc::semctl(id, 0, libc::SETVAL, 0 as libc::c_int) };
        if ret == -1 {
            return Err(ResourceInitError::new(
                Backend::Semaphore,
                "semctl SETVAL",
                io::Error::last_os_error(),
            ));
        }
        Ok(SemSet { id, removed: false })
    }

    pub fn signal_ready(&mut self) -> Result<(), SyncError> {
        self.semop(1, "semop signal")
    }

    pub fn wait_ready(&mut self) -> Result<(), SyncError> {
        self.semop(-1, "semop wait")
    }

    fn semop(&self, delta: libc::c_short, op_name: &'static str) -> Result<(), SyncError> {
        let mut op = libc::sembuf {
            sem_num: 0,
            sem_op: delta,
            sem_flg: 0,
        };
        loop {
            let ret = unsafe { libc::semop(self.id, &mut op, 1) };
            if ret == 0 {
                return Ok(());
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(SyncError::io(Backend::Semaphore, op_name, err));
            }
        }
    }

    pub fn cleanup(&mut self, role: Role) -> Result<(), SyncError> {
        if role != Role::Parent || self.removed {
            return Ok(());
        }
        self.removed = true;
        let ret = unsafe { libc::semctl(self.id, 0, libc::IPC_RMID) };
        if ret == -1 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() != Some(libc::EINVAL)
                && err.raw_os_error() != Some(libc::EIDRM)
            {
                return Err(SyncError::io(Backend::Semaphore, "semctl IPC_RMID", err));
            }
        }
        Ok(())
    }
}
