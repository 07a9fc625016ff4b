//! Thin wrappers over the raw libc calls the backends share.
//!
//! Every wrapper converts the -1-on-error convention into `io::Result` and
//! retries EINTR on the calls where the kernel can interrupt us.

use std::ffi::CString;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::io::RawFd;
use std::path::Path;

/// Convert a -1-on-error libc return into an `io::Result`.
pub fn cvt(ret: libc::c_int) -> io::Result<libc::c_int> {
    if ret == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(ret)
    }
}

/// NUL-terminated copy of a filesystem path for the raw calls.
pub fn cstring(path: &Path) -> io::Result<CString> {
    CString::new(path.as_os_str().as_bytes())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "path contains NUL byte"))
}

/// `open(2)` with EINTR retry. `mode` only matters when `flags` has O_CREAT.
pub fn open(path: &Path, flags: libc::c_int, mode: libc::c_uint) -> io::Result<RawFd> {
    let c = cstring(path)?;
    loop {
        let fd = unsafe { libc::open(c.as_ptr(), flags, mode) };
        if fd >= 0 {
            return Ok(fd);
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
}

/// Close a descriptor, swallowing errors. Teardown only.
pub fn close_quiet(fd: RawFd) {
    unsafe {
        libc::close(fd);
    }
}

/// Write exactly one byte, retrying EINTR.
pub fn write_byte(fd: RawFd, byte: u8) -> io::Result<()> {
    loop {
        let n = unsafe { libc::write(fd, &byte as *const u8 as *const libc::c_void, 1) };
        if n == 1 {
            return Ok(());
        }
        if n == 0 {
            return Err(io::Error::new(io::ErrorKind::WriteZero, "zero-byte write"));
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
}

/// Read one byte, retrying EINTR. `None` means EOF: every writer closed
/// without writing, i.e. the peer vanished.
pub fn read_byte(fd: RawFd) -> io::Result<Option<u8>> {
    let mut byte = 0u8;
    loop {
        let n = unsafe { libc::read(fd, &mut byte as *mut u8 as *mut libc::c_void, 1) };
        if n == 1 {
            return Ok(Some(byte));
        }
        if n == 0 {
            return Ok(None);
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
}

/// Anonymous shared mapping, inherited as the same physical pages across a
/// fork. The caller owns the mapping and must `unmap` it.
pub fn map_shared_anon(len: usize) -> io::Result<*mut libc::c_void> {
    // SAFETY: anonymous mapping, no fd, kernel picks the address.
    let ptr = unsafe {
        libc::mmap(
            std::ptr::null_mut(),
            len,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_SHARED | libc::MAP_ANONYMOUS,
            -1,
            0,
        )
    };
    if ptr == libc::MAP_FAILED {
        Err(io::Error::last_os_error())
    } else {
        Ok(ptr)
    }
}

/// Unmap a region obtained from [`map_shared_anon`].
///
/// # Safety
/// `ptr`/`len` must describe a live mapping owned by the caller, with no
/// outstanding references into it.
pub unsafe fn unmap(ptr: *mut libc::c_void, len: usize) {
    libc::munmap(ptr, len);
}

/// `ftok(3)` key derived from an existing path and a one-byte project tag.
pub fn ftok(path: &Path, proj: u8) -> io::Result<libc::key_t> {
    let c = cstring(path)?;
    let key = unsafe { libc::ftok(c.as_ptr(), proj as libc::c_int) };
    if key == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(key)
    }
}

/// `flock(2)` with EINTR retry (the blocking LOCK_EX case sleeps in the
/// kernel and can be interrupted).
pub fn flock(fd: RawFd, operation: libc::c_int) -> io::Result<()> {
    loop {
        if unsafe { libc::flock(fd, operation) } == 0 {
            return Ok(());
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
}
