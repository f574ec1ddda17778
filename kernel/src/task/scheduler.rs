//! Scheduler seam
//!
//! The lifecycle core never schedules anything itself. It only needs to
//! start a new flow of control, know which flow is running, park and wake
//! flows, and retire the current flow. Whatever implements [`Scheduler`]
//! owns the actual dispatching.

use alloc::boxed::Box;
use core::fmt;

use crate::syscall::errno::Errno;

/// Identity of a schedulable task. Distinct from a process identity: a
/// task is the flow, the process is the record it runs on behalf of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(u64);

impl TaskId {
    pub const fn new(id: u64) -> Self {
        TaskId(id)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Work handed to [`Scheduler::spawn`].
///
/// `body` is the flow itself. `fault` runs on the same task if `body` dies
/// abnormally (a trap in user code); it is how a crashed program still
/// reaches the exit path.
pub struct TaskEntry {
    body: Box<dyn FnOnce() + Send + 'static>,
    fault: Box<dyn FnOnce() + Send + 'static>,
}

impl TaskEntry {
    pub fn new<B, F>(body: B, fault: F) -> Self
    where
        B: FnOnce() + Send + 'static,
        F: FnOnce() + Send + 'static,
    {
        TaskEntry {
            body: Box::new(body),
            fault: Box::new(fault),
        }
    }

    pub fn into_parts(
        self,
    ) -> (
        Box<dyn FnOnce() + Send + 'static>,
        Box<dyn FnOnce() + Send + 'static>,
    ) {
        (self.body, self.fault)
    }
}

pub trait Scheduler: Send + Sync {
    /// Make a new task runnable. Fails with `OutOfMemory` if the task
    /// cannot be created; `entry` is dropped in that case.
    fn spawn(&self, name: &str, entry: TaskEntry) -> Result<TaskId, Errno>;

    /// The task issuing the call.
    fn current_task(&self) -> TaskId;

    /// Suspend the current task until [`Scheduler::unblock`] names it.
    ///
    /// An unblock delivered before the block is not lost: the block then
    /// returns immediately. Callers must tolerate spurious returns and
    /// re-check their predicate.
    fn block_current(&self);

    /// Make a blocked task runnable again.
    fn unblock(&self, task: TaskId);

    /// Retire the current task. Never returns.
    fn exit_current(&self) -> !;

    /// Stop the current task after an invariant violation. Never returns.
    fn halt_current(&self) -> !;
}
