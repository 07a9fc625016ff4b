//! Process-pair layer: spawning a child from a parent and tracking both
//! sides of the fork point through to the child's exit record.

pub mod errors;
pub mod pair;

pub use errors::{ReapError, SpawnError};
pub use pair::{current_pid, exit_child, fork, parent_pid, reap, ExitStatus, Forked, Pid, Role};
