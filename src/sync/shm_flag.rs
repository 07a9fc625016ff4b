//! Shared-memory flag rendezvous.
//!
//! One integer flag in an anonymous shared mapping created before the fork
//! point, so both processes see the same physical pages. The signaler stores
//! a non-zero sentinel; the waiter polls at a small fixed interval.
//!
//! This is the one backend with inherent polling latency: the waiter burns a
//! short scheduling quantum every `poll_interval` instead of blocking in the
//! kernel. That trade-off is intentional for a teaching harness and is what
//! the latency tests characterize.

use std::mem;
use std::sync::atomic::{AtomicU32, Ordering};
use std::thread;
use std::time::Duration;

use super::errors::{ResourceInitError, SyncError};
use super::{ffi, Backend, SyncOptions};
use crate::process::Role;

const SIGNALED: u32 = 1;

/// Anonymous shared mapping of a single `AtomicU32`, zero until signaled.
pub struct ShmFlag {
    ptr: *mut libc::c_void,
    poll_interval: Duration,
}

// SAFETY: the mapping stays valid for the struct's lifetime and is only
// accessed through the atomic it contains.
unsafe impl Send for ShmFlag {}

impl ShmFlag {
    pub fn create(opts: &SyncOptions) -> Result<Self, ResourceInitError> {
        let ptr = ffi::map_shared_anon(mem::size_of::<AtomicU32>())
            .map_err(|e| ResourceInitError::new(Backend::SharedMemoryFlag, "mmap", e))?;
        let flag = ShmFlag {
            ptr,
            poll_interval: opts.poll_interval,
        };
        flag.cell().store(0, Ordering::Release);
        Ok(flag)
    }

    fn cell(&self) -> &AtomicU32 {
        // SAFETY: `ptr` is a live, properly aligned mapping of at least one
        // AtomicU32, initialized in `create`.
        unsafe { &*(self.ptr as *const AtomicU32) }
    }

    pub fn signal_ready(&mut self) -> Result<(), SyncError> {
        self.cell().store(SIGNALED, Ordering::Release);
        Ok(())
    }

    pub fn wait_ready(&mut self) -> Result<(), SyncError> {
        // Bounded busy-wait; see the module docs for the latency trade-off.
        while self.cell().load(Ordering::Acquire) == 0 {
            thread::sleep(self.poll_interval);
        }
        Ok(())
    }

    pub fn cleanup(&mut self, _role: Role) -> Result<(), SyncError> {
        // Anonymous mapping: nothing named to remove. Each process unmaps
        // its own view.
        self.unmap();
        Ok(())
    }

    fn unmap(&mut self) {
        if !self.ptr.is_null() {
            // SAFETY: mapping created by us, unmapped exactly once.
            unsafe { ffi::unmap(self.ptr, mem::size_of::<AtomicU32>()) };
            self.ptr = std::ptr::null_mut();
        }
    }
}

impl Drop for ShmFlag {
    fn drop(&mut self) {
        self.unmap();
    }
}
