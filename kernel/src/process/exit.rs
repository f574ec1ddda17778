//! Process termination
//!
//! `Running -> Zombie` happens under the record's own lock, together with
//! destroying the address space, publishing the status and waking the
//! parent. A parent that observes the zombie therefore never races the
//! teardown of its image. Orphaning children and deciding who reclaims the
//! record come afterwards, one lock at a time.

use alloc::sync::{Arc, Weak};
use core::mem;

use super::manager::Kernel;
use super::process::{ExitStatus, Process, ProcessState};

pub(crate) fn exit(kernel: &Kernel, current: &Arc<Process>, status: ExitStatus) -> ! {
    let scheduler = kernel.scheduler();

    let (children, parent) = {
        let mut inner = current.lock();
        if inner.state != ProcessState::Running {
            drop(inner);
            super::fatal(scheduler, current.pid(), "exit from a process that is not running");
        }
        match inner.address_space.take() {
            Some(space) => drop(space),
            None => {
                drop(inner);
                super::fatal(scheduler, current.pid(), "exit without an address space");
            }
        }

        inner.state = ProcessState::Zombie;
        inner.exit_status = Some(status);
        current.exited.notify_one(scheduler);

        (mem::take(&mut inner.children), inner.parent.clone())
    };

    log::info!("process {} '{}' exited: {}", current.pid(), current.name(), status);

    // Nobody can reap these any more. Running children reclaim themselves
    // when they exit; zombies are reclaimed here.
    for child in children {
        child.lock().parent = Weak::new();
        if kernel.table().reclaim(&child) {
            log::debug!("reclaimed zombie child {} of exiting pid {}", child.pid(), current.pid());
        }
    }

    // The parent may reap us only while it still holds us in its children.
    // If it has already drained them, it is exiting and one of us two
    // reclaims the record; reclaim picks exactly one.
    let reapable = parent
        .upgrade()
        .map_or(false, |parent| parent.lock().find_child(current.pid()).is_some());
    if !reapable && kernel.table().reclaim(current) {
        log::debug!("orphan {} reclaimed at exit", current.pid());
    }

    scheduler.exit_current()
}
