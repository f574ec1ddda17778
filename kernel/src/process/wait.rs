//! waitpid: block until a child terminates, then reap it

use alloc::sync::Arc;

use super::manager::Kernel;
use super::process::{ExitStatus, Process, ProcessId, ProcessState};
use crate::syscall::errno::Errno;

pub(crate) fn waitpid(
    kernel: &Kernel,
    current: &Arc<Process>,
    pid: ProcessId,
    options: u32,
) -> Result<ExitStatus, Errno> {
    if options != 0 {
        return Err(Errno::InvalidArgument);
    }

    // Parent lock is released before the child's is taken.
    let child = current
        .lock()
        .find_child(pid)
        .cloned()
        .ok_or(Errno::NotChild)?;

    let status = {
        let guard = child.lock();
        let inner = child.exited.wait_while(&child.inner, guard, kernel.scheduler(), |inner| {
            inner.state == ProcessState::Running
        });
        match (inner.state, inner.exit_status) {
            (ProcessState::Zombie, Some(status)) => status,
            (ProcessState::Destroyed, _) => return Err(Errno::NotChild),
            (state, _) => {
                drop(inner);
                super::fatal(
                    kernel.scheduler(),
                    current.pid(),
                    if state == ProcessState::Zombie {
                        "zombie child without an exit status"
                    } else {
                        "woke from waitpid with child still running"
                    },
                );
            }
        }
    };

    if !current.lock().remove_child(pid) {
        return Err(Errno::NotChild);
    }
    kernel.table().reclaim(&child);

    log::debug!("pid {} reaped child {}: {}", current.pid(), pid, status);
    Ok(status)
}
