//! Process directory: identity allocation and pid -> record lookup
//!
//! The directory never owns a record. Ownership runs parent -> child; the
//! directory holds weak references so that a lookup can never resurrect a
//! process that has already been reclaimed.

use alloc::collections::BTreeMap;
use alloc::sync::{Arc, Weak};

use spin::Mutex;

use super::process::{Process, ProcessId};
use crate::config::KernelConfig;
use crate::sync::WaitQueue;
use crate::syscall::errno::Errno;
use crate::task::Scheduler;

enum Slot {
    /// Identity handed out, record not yet published
    Reserved,
    Live(Weak<Process>),
}

struct TableInner {
    slots: BTreeMap<ProcessId, Slot>,
    /// Next-fit cursor, so freed identities are not reused immediately
    next: u32,
}

pub struct ProcessTable {
    inner: Mutex<TableInner>,
    /// Signalled when the last identity is released
    idle: WaitQueue,
    scheduler: Arc<dyn Scheduler>,
    pid_min: u32,
    pid_max: u32,
}

impl ProcessTable {
    pub fn new(config: &KernelConfig, scheduler: Arc<dyn Scheduler>) -> Self {
        ProcessTable {
            inner: Mutex::new(TableInner {
                slots: BTreeMap::new(),
                next: config.pid_min,
            }),
            idle: WaitQueue::new(),
            scheduler,
            pid_min: config.pid_min,
            pid_max: config.pid_max,
        }
    }

    /// Reserve an unused identity. The reservation is released on drop
    /// unless it is consumed by [`ProcessTable::register`].
    pub fn allocate(&self) -> Result<PidReservation<'_>, Errno> {
        let mut inner = self.inner.lock();
        if self.pid_max < self.pid_min {
            return Err(Errno::ResourceExhausted);
        }

        let span = self.pid_max - self.pid_min + 1;
        if inner.slots.len() as u64 >= span as u64 {
            log::warn!("process table full ({} identities in use)", span);
            return Err(Errno::ResourceExhausted);
        }

        let mut candidate = inner.next;
        for _ in 0..span {
            if candidate < self.pid_min || candidate > self.pid_max {
                candidate = self.pid_min;
            }
            let pid = ProcessId::new(candidate);
            if !inner.slots.contains_key(&pid) {
                inner.slots.insert(pid, Slot::Reserved);
                inner.next = if candidate == self.pid_max {
                    self.pid_min
                } else {
                    candidate + 1
                };
                return Ok(PidReservation {
                    table: self,
                    pid,
                    committed: false,
                });
            }
            candidate = candidate.wrapping_add(1);
        }

        Err(Errno::ResourceExhausted)
    }

    /// Publish `process` under the identity it was created with.
    pub fn register(&self, mut reservation: PidReservation<'_>, process: &Arc<Process>) {
        debug_assert_eq!(reservation.pid, process.pid());
        let mut inner = self.inner.lock();
        inner
            .slots
            .insert(reservation.pid, Slot::Live(Arc::downgrade(process)));
        reservation.committed = true;
    }

    /// Find a record by identity. `None` for unknown, merely reserved, or
    /// already reclaimed identities.
    pub fn lookup(&self, pid: ProcessId) -> Option<Arc<Process>> {
        match self.inner.lock().slots.get(&pid) {
            Some(Slot::Live(weak)) => weak.upgrade(),
            _ => None,
        }
    }

    /// Release an identity for reuse.
    pub fn unregister(&self, pid: ProcessId) {
        if !self.remove(&mut self.inner.lock(), pid) {
            log::warn!("unregister of unknown pid {}", pid);
        }
    }

    /// Destroy a zombie and unpublish it in one step under the directory
    /// lock, so `lookup` never hands out a `Destroyed` record. Returns
    /// `false` if the record is not a zombie.
    ///
    /// Lock order: directory, then record.
    pub(crate) fn reclaim(&self, process: &Process) -> bool {
        let mut inner = self.inner.lock();
        if !process.try_destroy() {
            return false;
        }
        if !self.remove(&mut inner, process.pid()) {
            log::warn!("reclaimed pid {} was not registered", process.pid());
        }
        true
    }

    /// Identities currently reserved or in use.
    pub fn len(&self) -> usize {
        self.inner.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Block the caller until every identity has been released.
    pub fn wait_until_empty(&self) {
        let guard = self.inner.lock();
        let _guard = self.idle.wait_while(&self.inner, guard, &*self.scheduler, |inner| {
            !inner.slots.is_empty()
        });
    }

    fn remove(&self, inner: &mut TableInner, pid: ProcessId) -> bool {
        if inner.slots.remove(&pid).is_none() {
            return false;
        }
        if inner.slots.is_empty() {
            self.idle.notify_all(&*self.scheduler);
        }
        true
    }
}

/// An identity taken from the directory but not yet bound to a record.
pub struct PidReservation<'a> {
    table: &'a ProcessTable,
    pid: ProcessId,
    committed: bool,
}

impl PidReservation<'_> {
    pub fn pid(&self) -> ProcessId {
        self.pid
    }
}

impl Drop for PidReservation<'_> {
    fn drop(&mut self) {
        if !self.committed {
            log::trace!("pid {} reservation released", self.pid);
            self.table.remove(&mut self.table.inner.lock(), self.pid);
        }
    }
}
