//! Fork implementation
//!
//! The child gets a deep copy of the parent's address space and a copy of
//! the parent's register snapshot with the return register zeroed. It is
//! linked into the parent's children and published in the directory
//! before its task is spawned, so both flows observe a fully initialized
//! `Running` child.

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;

use super::context::UserContext;
use super::manager::Kernel;
use super::process::{Process, ProcessId, ProcessState};
use crate::syscall::errno::Errno;
use crate::task::context::CpuContext;

pub(crate) fn fork(
    kernel: &Arc<Kernel>,
    current: &Arc<Process>,
    frame: &CpuContext,
    argv: &[String],
) -> Result<ProcessId, Errno> {
    let duplicated = current
        .lock()
        .address_space
        .as_ref()
        .map(|space| space.duplicate());
    let child_space = match duplicated {
        Some(Ok(space)) => space,
        Some(Err(err)) => {
            log::debug!("fork: pid {} address space duplication failed", current.pid());
            return Err(err);
        }
        None => super::fatal(
            kernel.scheduler(),
            current.pid(),
            "fork from a process without an address space",
        ),
    };

    // An exhausted directory drops the duplicate on the way out.
    let reservation = kernel.table().allocate()?;
    let child_pid = reservation.pid();

    let child = Process::new(
        child_pid,
        current.name().into(),
        Arc::downgrade(current),
        child_space,
    );
    kernel.table().register(reservation, &child);

    {
        let mut inner = current.lock();
        if inner.state != ProcessState::Running {
            drop(inner);
            kernel.table().unregister(child_pid);
            super::fatal(kernel.scheduler(), current.pid(), "fork from a non-running process");
        }
        inner.add_child(child.clone());
    }

    let context = UserContext::new(kernel.clone(), child.clone(), frame.fork_child(), Vec::from(argv));
    if let Err(err) = kernel.scheduler().spawn(current.name(), context.into_task()) {
        log::warn!(
            "fork: spawning child {} of pid {} failed, rolling back",
            child_pid,
            current.pid()
        );
        current.lock().remove_child(child_pid);
        kernel.table().unregister(child_pid);
        // Last reference: the child's address space goes with it.
        drop(child);
        return Err(err);
    }

    log::debug!("fork: pid {} -> child {}", current.pid(), child_pid);
    Ok(child_pid)
}
