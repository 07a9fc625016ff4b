//! Property tests for the synchronization backends.
//!
//! These fork real child processes. Each test roots its named artifacts in a
//! private directory so SysV keys and rendezvous paths cannot collide with a
//! concurrently running test, and every child terminates through `_exit` so
//! it never re-enters the test harness.

use std::fs;
use std::sync::atomic::{AtomicU32, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::bounded;
use rand::Rng;

use super::errors::SyncError;
use super::ffi;
use super::fifo::FifoChannel;
use super::file_lock::LockFile;
use super::msg_queue::MsgQueue;
use super::semaphore::SemSet;
use super::signal::SIGNAL_TEST_GUARD;
use super::{Backend, SyncOptions, SyncPrimitive};
use crate::process::{self, ExitStatus, Forked, Role};

/// Options rooted in a fresh private directory.
fn test_opts(name: &str) -> SyncOptions {
    let dir = std::env::temp_dir().join(format!(
        "forksync-test-{}-{}-{:08x}",
        name,
        std::process::id(),
        rand::thread_rng().gen::<u32>()
    ));
    fs::create_dir_all(&dir).expect("create test dir");
    SyncOptions {
        base_dir: dir,
        run_tag: rand::thread_rng().gen(),
        poll_interval: Duration::from_millis(5),
    }
}

fn cleanup_dir(opts: &SyncOptions) {
    let _ = fs::remove_dir_all(&opts.base_dir);
}

/// One shared u32 living outside any primitive under test, for verifying
/// ordering across the process boundary.
struct SharedCounter {
    ptr: *mut libc::c_void,
}

// SAFETY: the mapping stays valid for the struct's lifetime.
unsafe impl Send for SharedCounter {}

impl SharedCounter {
    fn new() -> Self {
        let ptr = ffi::map_shared_anon(std::mem::size_of::<AtomicU32>()).expect("mmap");
        let counter = SharedCounter { ptr };
        counter.cell().store(0, Ordering::SeqCst);
        counter
    }

    fn cell(&self) -> &AtomicU32 {
        // SAFETY: live mapping of at least one AtomicU32.
        unsafe { &*(self.ptr as *const AtomicU32) }
    }
}

impl Drop for SharedCounter {
    fn drop(&mut self) {
        // SAFETY: mapping created in `new`, dropped exactly once.
        unsafe { ffi::unmap(self.ptr, std::mem::size_of::<AtomicU32>()) };
    }
}

/// Core ordering property: the child's bump of an external counter before
/// `signal_ready` must be visible to the parent once `wait_ready` returns.
fn assert_happens_before(backend: Backend, parent_delay: Duration) {
    let opts = test_opts(backend.label());
    let counter = SharedCounter::new();
    let mut primitive = SyncPrimitive::create(backend, &opts).expect("create primitive");

    match process::fork().expect("fork") {
        Forked::Child => {
            let ok = primitive.post_fork(Role::Child).is_ok()
                && primitive.lead_in(Role::Child).is_ok()
                && {
                    counter.cell().fetch_add(1, Ordering::SeqCst);
                    true
                }
                && primitive.signal_ready().is_ok()
                && primitive.cleanup(Role::Child).is_ok();
            process::exit_child(if ok { 0 } else { 1 });
        }
        Forked::Parent { child } => {
            primitive.post_fork(Role::Parent).expect("post_fork");
            if !parent_delay.is_zero() {
                thread::sleep(parent_delay);
            }
            primitive.wait_ready().expect("wait_ready");
            assert_eq!(
                counter.cell().load(Ordering::SeqCst),
                1,
                "{}: counter bump must be visible after wait_ready returns",
                backend
            );
            assert_eq!(process::reap(child).expect("reap"), ExitStatus::Exited(0));
            primitive.cleanup(Role::Parent).expect("cleanup");
            cleanup_dir(&opts);
        }
    }
}

#[test]
fn test_happens_before_fifo() {
    assert_happens_before(Backend::Fifo, Duration::ZERO);
}

#[test]
fn test_happens_before_pipe() {
    assert_happens_before(Backend::Pipe, Duration::ZERO);
}

#[test]
fn test_happens_before_shm_flag() {
    assert_happens_before(Backend::SharedMemoryFlag, Duration::ZERO);
}

#[test]
fn test_happens_before_file_lock() {
    // The parent must give the child its head start; acquisition order is
    // the signal here and the child has to lock first.
    assert_happens_before(Backend::FileLock, Duration::from_millis(100));
}

#[test]
fn test_happens_before_msg_queue() {
    assert_happens_before(Backend::MessageQueue, Duration::ZERO);
}

#[test]
fn test_happens_before_semaphore() {
    assert_happens_before(Backend::Semaphore, Duration::ZERO);
}

#[test]
fn test_happens_before_unix_socket() {
    assert_happens_before(Backend::UnixSocket, Duration::ZERO);
}

#[test]
fn test_happens_before_and_latency_signal() {
    let _guard = SIGNAL_TEST_GUARD
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    assert_happens_before(Backend::Signal, Duration::ZERO);

    // Polling latency: the waiter should notice within poll_interval plus
    // generous scheduling slack of the moment the signal was sent.
    let opts = test_opts("signal-latency");
    let mut primitive = SyncPrimitive::create(Backend::Signal, &opts).expect("create");
    let clock = SharedCounter::new();
    let t0 = Instant::now();
    match process::fork().expect("fork") {
        Forked::Child => {
            thread::sleep(Duration::from_millis(50));
            clock.cell().store(t0.elapsed().as_millis() as u32, Ordering::SeqCst);
            let ok = primitive.signal_ready().is_ok();
            process::exit_child(if ok { 0 } else { 1 });
        }
        Forked::Parent { child } => {
            primitive.wait_ready().expect("wait_ready");
            let returned_ms = t0.elapsed().as_millis() as u32;
            let signaled_ms = clock.cell().load(Ordering::SeqCst);
            assert!(signaled_ms > 0, "child must have recorded its signal time");
            assert!(
                returned_ms.saturating_sub(signaled_ms) < 100,
                "wait returned {}ms after the signal",
                returned_ms - signaled_ms
            );
            assert_eq!(process::reap(child).expect("reap"), ExitStatus::Exited(0));
            cleanup_dir(&opts);
        }
    }
}

#[test]
fn test_shm_flag_polling_latency() {
    let opts = test_opts("shm-latency");
    let mut primitive = SyncPrimitive::create(Backend::SharedMemoryFlag, &opts).expect("create");
    let clock = SharedCounter::new();
    let t0 = Instant::now();
    match process::fork().expect("fork") {
        Forked::Child => {
            thread::sleep(Duration::from_millis(50));
            clock.cell().store(t0.elapsed().as_millis() as u32, Ordering::SeqCst);
            let ok = primitive.signal_ready().is_ok();
            process::exit_child(if ok { 0 } else { 1 });
        }
        Forked::Parent { child } => {
            primitive.wait_ready().expect("wait_ready");
            let returned_ms = t0.elapsed().as_millis() as u32;
            let signaled_ms = clock.cell().load(Ordering::SeqCst);
            assert!(signaled_ms > 0);
            assert!(
                returned_ms.saturating_sub(signaled_ms) < 100,
                "wait returned {}ms after the signal",
                returned_ms - signaled_ms
            );
            assert_eq!(process::reap(child).expect("reap"), ExitStatus::Exited(0));
            primitive.cleanup(Role::Parent).expect("cleanup");
            cleanup_dir(&opts);
        }
    }
}

#[test]
fn test_pipe_broken_peer_detected() {
    let opts = test_opts("pipe-broken");
    let mut primitive = SyncPrimitive::create(Backend::Pipe, &opts).expect("create");
    let child = match process::fork().expect("fork") {
        Forked::Child => {
            // Close both ends without ever writing.
            let ok = primitive.post_fork(Role::Child).is_ok()
                && primitive.cleanup(Role::Child).is_ok();
            process::exit_child(if ok { 0 } else { 1 });
        }
        Forked::Parent { child } => child,
    };
    primitive.post_fork(Role::Parent).expect("post_fork");

    let (tx, rx) = bounded(1);
    let handle = thread::spawn(move || {
        let _ = tx.send(primitive.wait_ready());
    });
    let result = rx
        .recv_timeout(Duration::from_secs(5))
        .expect("wait_ready must not hang past peer exit");
    assert!(result.as_ref().err().is_some_and(|e| e.is_broken()));
    handle.join().expect("join waiter");
    assert_eq!(process::reap(child).expect("reap"), ExitStatus::Exited(0));
    cleanup_dir(&opts);
}

#[test]
fn test_fifo_broken_peer_detected() {
    let opts = test_opts("fifo-broken");
    let fifo = FifoChannel::create(&opts).expect("create");
    let path = fifo.path().to_path_buf();
    let child = match process::fork().expect("fork") {
        Forked::Child => {
            // Open the write end, then exit without writing anything.
            let ok = match ffi::open(&path, libc::O_WRONLY, 0) {
                Ok(fd) => {
                    ffi::close_quiet(fd);
                    true
                }
                Err(_) => false,
            };
            process::exit_child(if ok { 0 } else { 1 });
        }
        Forked::Parent { child } => child,
    };

    let (tx, rx) = bounded(1);
    let mut fifo = fifo;
    let handle = thread::spawn(move || {
        let _ = tx.send(fifo.wait_ready());
    });
    let result = rx
        .recv_timeout(Duration::from_secs(5))
        .expect("wait_ready must not hang past peer exit");
    assert!(matches!(result, Err(SyncError::Broken { .. })));
    handle.join().expect("join waiter");
    assert_eq!(process::reap(child).expect("reap"), ExitStatus::Exited(0));
    let _ = fs::remove_file(&path);
    cleanup_dir(&opts);
}

#[test]
fn test_unix_socket_broken_peer_detected() {
    let opts = test_opts("socket-broken");
    let mut primitive = SyncPrimitive::create(Backend::UnixSocket, &opts).expect("create");
    let path = match &primitive {
        SyncPrimitive::UnixSocket(s) => s.path().to_path_buf(),
        _ => unreachable!(),
    };
    let child = match process::fork().expect("fork") {
        Forked::Child => {
            // Connect, then close without sending the payload.
            let ok = std::os::unix::net::UnixStream::connect(&path).is_ok();
            process::exit_child(if ok { 0 } else { 1 });
        }
        Forked::Parent { child } => child,
    };
    primitive.post_fork(Role::Parent).expect("post_fork");

    let (tx, rx) = bounded(1);
    let handle = thread::spawn(move || {
        let result = primitive.wait_ready();
        let _ = tx.send((result, primitive));
    });
    let (result, mut primitive) = rx
        .recv_timeout(Duration::from_secs(5))
        .expect("wait_ready must not hang past peer exit");
    assert!(matches!(result, Err(SyncError::Broken { .. })));
    handle.join().expect("join waiter");
    assert_eq!(process::reap(child).expect("reap"), ExitStatus::Exited(0));
    primitive.cleanup(Role::Parent).expect("cleanup");
    cleanup_dir(&opts);
}

#[test]
fn test_file_lock_repeated_experiments_leave_lock_free() {
    let opts = test_opts("flock-repeat");
    for _ in 0..50 {
        let mut lock = LockFile::create(&opts).expect("create");
        let path = lock.path().to_path_buf();
        match process::fork().expect("fork") {
            Forked::Child => {
                let ok = lock.post_fork(Role::Child).is_ok()
                    && lock.lead_in(Role::Child).is_ok()
                    && lock.signal_ready().is_ok()
                    && lock.cleanup(Role::Child).is_ok();
                process::exit_child(if ok { 0 } else { 1 });
            }
            Forked::Parent { child } => {
                lock.post_fork(Role::Parent).expect("post_fork");
                thread::sleep(Duration::from_millis(10));
                lock.wait_ready().expect("wait_ready");
                assert_eq!(process::reap(child).expect("reap"), ExitStatus::Exited(0));

                // The lock must be free again: a non-blocking exclusive
                // acquisition from a fresh descriptor succeeds.
                let fd = ffi::open(&path, libc::O_RDWR, 0).expect("probe open");
                ffi::flock(fd, libc::LOCK_EX | libc::LOCK_NB).expect("lock must be free");
                ffi::flock(fd, libc::LOCK_UN).expect("probe unlock");
                ffi::close_quiet(fd);

                lock.cleanup(Role::Parent).expect("cleanup");
                assert!(!path.exists(), "lock file removed after each experiment");
            }
        }
    }
    cleanup_dir(&opts);
}

#[test]
fn test_msg_queue_second_signal_is_harmless() {
    let opts = test_opts("msgq-double");
    let mut queue = MsgQueue::create(&opts).expect("create");
    queue.signal_ready().expect("first signal");
    queue.signal_ready().expect("second signal");
    queue.wait_ready().expect("first wait");
    queue.wait_ready().expect("second wait drains the extra message");
    queue.cleanup(Role::Parent).expect("cleanup");
    cleanup_dir(&opts);
}

#[test]
fn test_msg_queue_stale_message_does_not_satisfy_new_run() {
    let opts = test_opts("msgq-stale");

    // An aborted run: the child signaled, but the parent never ran cleanup,
    // so the queue survives with CHILD_DONE still enqueued.
    let mut aborted = MsgQueue::create(&opts).expect("create");
    aborted.signal_ready().expect("signal");
    drop(aborted);

    // A fresh run over the same key must block until its own signal instead
    // of consuming the leftover message.
    let mut queue = MsgQueue::create(&opts).expect("re-create");
    let (tx, rx) = bounded(1);
    let waiter = thread::spawn(move || {
        let result = queue.wait_ready();
        let _ = tx.send((result, queue));
    });
    assert!(
        rx.recv_timeout(Duration::from_millis(300)).is_err(),
        "wait returned from stale state"
    );

    let mut signaler = MsgQueue::create(&opts).expect("signaler handle");
    signaler.signal_ready().expect("fresh signal");
    let (result, mut queue) = rx
        .recv_timeout(Duration::from_secs(5))
        .expect("waiter wakes on the fresh signal");
    result.expect("wait");
    waiter.join().expect("join waiter");

    queue.cleanup(Role::Parent).expect("cleanup");
    cleanup_dir(&opts);
}

#[test]
fn test_semaphore_second_signal_is_harmless() {
    let opts = test_opts("sem-double");
    let mut sem = SemSet::create(&opts).expect("create");
    sem.signal_ready().expect("first signal");
    sem.signal_ready().expect("second signal");
    sem.wait_ready().expect("first wait");
    sem.wait_ready().expect("counter covers the second wait");
    sem.cleanup(Role::Parent).expect("cleanup");
    cleanup_dir(&opts);
}

#[test]
fn test_fifo_creation_is_idempotent() {
    let opts = test_opts("fifo-exists");
    let first = FifoChannel::create(&opts).expect("first create");
    // Same options resolve the same path; the leftover FIFO is reused.
    let _second = FifoChannel::create(&opts).expect("create over existing FIFO");
    let mut first = first;
    first.cleanup(Role::Parent).expect("cleanup");
    assert!(!first.path().exists());
    cleanup_dir(&opts);
}

#[test]
fn test_cleanup_ownership_is_parent_only() {
    let opts = test_opts("fifo-owner");
    let mut fifo = FifoChannel::create(&opts).expect("create");
    let path = fifo.path().to_path_buf();
    // The non-owning role must never remove the name.
    fifo.cleanup(Role::Child).expect("child cleanup");
    assert!(path.exists(), "child cleanup must not unlink the FIFO");
    fifo.cleanup(Role::Parent).expect("parent cleanup");
    assert!(!path.exists());
    cleanup_dir(&opts);
}

#[test]
fn test_factory_builds_every_backend() {
    let _guard = SIGNAL_TEST_GUARD
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    let opts = test_opts("factory");
    for backend in Backend::ALL {
        let mut primitive = SyncPrimitive::create(backend, &opts).expect("create");
        assert_eq!(primitive.backend(), backend);
        primitive.cleanup(Role::Parent).expect("cleanup");
    }
    cleanup_dir(&opts);
}

#[test]
fn test_backend_labels_round_trip() {
    for backend in Backend::ALL {
        assert_eq!(Backend::from_label(backend.label()), Some(backend));
    }
    assert_eq!(Backend::from_label("bogus"), None);
}
