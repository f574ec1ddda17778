//! Process lifecycle
//!
//! Creation (fork), termination (exit), collection of a child's status
//! (waitpid) and image replacement (execv). Each process control record
//! carries its own lock and wait queue; the directory that maps
//! identities to records is a separate, narrower lock. No flow ever holds
//! two record locks at once. Reclaiming a record takes the directory lock
//! and then the record's, never the other way round.

use alloc::sync::Arc;

use crate::task::Scheduler;

pub mod context;
pub mod exec;
mod exit;
mod fork;
pub mod manager;
pub mod process;
pub mod table;
mod wait;

pub use context::UserContext;
pub use exec::{ImageLoader, LoadedImage, ProgramRegistry};
pub use manager::Kernel;
pub use process::{ExitStatus, Process, ProcessId, ProcessState, Termination, SIGABRT, SIGSEGV};
pub use table::ProcessTable;

/// Code a process runs. Returning `code` is `exit(code)`.
pub type Program = Arc<dyn Fn(&mut UserContext) -> i32 + Send + Sync>;

/// Stop the calling flow after an internal invariant was violated.
///
/// There is no caller to report to, so this never returns.
pub fn fatal(scheduler: &dyn Scheduler, pid: ProcessId, what: &str) -> ! {
    log::error!("FATAL: process {}: {}", pid, what);
    scheduler.halt_current()
}
