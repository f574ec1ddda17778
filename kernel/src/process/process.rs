//! Process control record and lifecycle state

use alloc::boxed::Box;
use alloc::string::String;
use alloc::sync::{Arc, Weak};
use alloc::vec::Vec;
use core::fmt;

use spin::{Mutex, MutexGuard};

use crate::memory::AddressSpace;
use crate::sync::WaitQueue;

/// Process ID type
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProcessId(u32);

impl ProcessId {
    pub const fn new(id: u32) -> Self {
        ProcessId(id)
    }

    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Process state
///
/// `Running -> Zombie -> Destroyed`, never skipping or reversing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    /// Live, owns an address space
    Running,
    /// Terminated, exit status published, waiting to be reaped
    Zombie,
    /// Reaped or reclaimed as an orphan; unreachable from anywhere
    Destroyed,
}

const WAIT_TAG_MASK: i32 = 0x3;
const WAIT_EXITED: i32 = 0;
const WAIT_SIGNALED: i32 = 1;
const WAIT_CORE: i32 = 2;
const WAIT_STOPPED: i32 = 3;

/// Abort signal, used when user code faults
pub const SIGABRT: u32 = 6;

/// Segmentation fault, used when a resume address does not resolve
pub const SIGSEGV: u32 = 11;

/// Encoded termination status: `(payload << 2) | tag`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExitStatus(i32);

/// Decoded form of an [`ExitStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Exited(u8),
    Signaled(u32),
    CoreDumped(u32),
    Stopped(u32),
}

impl ExitStatus {
    /// Normal exit. Only the low 8 bits of `code` survive.
    pub fn exited(code: i32) -> Self {
        ExitStatus(((code & 0xff) << 2) | WAIT_EXITED)
    }

    /// Abnormal termination by `signal`.
    pub fn signaled(signal: u32) -> Self {
        ExitStatus(((signal as i32) << 2) | WAIT_SIGNALED)
    }

    pub fn from_raw(raw: i32) -> Self {
        ExitStatus(raw)
    }

    pub fn raw(self) -> i32 {
        self.0
    }

    pub fn decode(self) -> Termination {
        let payload = self.0 >> 2;
        match self.0 & WAIT_TAG_MASK {
            WAIT_EXITED => Termination::Exited(payload as u8),
            WAIT_SIGNALED => Termination::Signaled(payload as u32),
            WAIT_CORE => Termination::CoreDumped(payload as u32),
            _ => Termination::Stopped(payload as u32),
        }
    }

    pub fn is_normal(self) -> bool {
        self.0 & WAIT_TAG_MASK == WAIT_EXITED
    }

    /// Exit code of a normal termination.
    pub fn code(self) -> Option<u8> {
        match self.decode() {
            Termination::Exited(code) => Some(code),
            _ => None,
        }
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.decode() {
            Termination::Exited(code) => write!(f, "exited({})", code),
            Termination::Signaled(sig) => write!(f, "signaled({})", sig),
            Termination::CoreDumped(sig) => write!(f, "core dumped({})", sig),
            Termination::Stopped(sig) => write!(f, "stopped({})", sig),
        }
    }
}

/// Fields covered by the record's own lock.
pub(crate) struct ProcessInner {
    pub(crate) state: ProcessState,
    pub(crate) exit_status: Option<ExitStatus>,
    /// Never an ownership edge; empty once the parent has exited
    pub(crate) parent: Weak<Process>,
    /// Owning edges, unique by pid
    pub(crate) children: Vec<Arc<Process>>,
    /// Present iff `state == Running`
    pub(crate) address_space: Option<Box<dyn AddressSpace>>,
}

impl ProcessInner {
    pub(crate) fn find_child(&self, pid: ProcessId) -> Option<&Arc<Process>> {
        self.children.iter().find(|child| child.pid() == pid)
    }

    pub(crate) fn add_child(&mut self, child: Arc<Process>) {
        debug_assert!(self.find_child(child.pid()).is_none());
        self.children.push(child);
    }

    /// Remove a child, returning whether it was present.
    pub(crate) fn remove_child(&mut self, pid: ProcessId) -> bool {
        let before = self.children.len();
        self.children.retain(|child| child.pid() != pid);
        self.children.len() != before
    }
}

/// Process control record
pub struct Process {
    pid: ProcessId,
    name: String,
    pub(crate) inner: Mutex<ProcessInner>,
    /// Signalled once, when the record becomes a zombie. Only the parent
    /// ever waits here.
    pub(crate) exited: WaitQueue,
}

impl Process {
    pub(crate) fn new(
        pid: ProcessId,
        name: String,
        parent: Weak<Process>,
        address_space: Box<dyn AddressSpace>,
    ) -> Arc<Self> {
        Arc::new(Process {
            pid,
            name,
            inner: Mutex::new(ProcessInner {
                state: ProcessState::Running,
                exit_status: None,
                parent,
                children: Vec::new(),
                address_space: Some(address_space),
            }),
            exited: WaitQueue::new(),
        })
    }

    pub fn pid(&self) -> ProcessId {
        self.pid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, ProcessInner> {
        self.inner.lock()
    }

    pub fn state(&self) -> ProcessState {
        self.lock().state
    }

    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.lock().exit_status
    }

    /// The parent's identity, if the parent is still running.
    pub fn parent_pid(&self) -> Option<ProcessId> {
        self.lock().parent.upgrade().map(|parent| parent.pid())
    }

    pub fn child_pids(&self) -> Vec<ProcessId> {
        self.lock().children.iter().map(|child| child.pid()).collect()
    }

    pub fn has_address_space(&self) -> bool {
        self.lock().address_space.is_some()
    }

    /// Run `f` against the address space of a running process.
    pub fn with_address_space<R>(&self, f: impl FnOnce(&mut dyn AddressSpace) -> R) -> Option<R> {
        let mut inner = self.lock();
        match inner.address_space.as_mut() {
            Some(space) => Some(f(&mut **space)),
            None => None,
        }
    }

    /// `Zombie -> Destroyed`. Returns false if the record was not a zombie,
    /// so exactly one of several racing reclaimers wins.
    pub(crate) fn try_destroy(&self) -> bool {
        let mut inner = self.lock();
        if inner.state != ProcessState::Zombie {
            return false;
        }
        inner.state = ProcessState::Destroyed;
        inner.parent = Weak::new();
        true
    }
}

impl fmt::Debug for Process {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Process")
            .field("pid", &self.pid)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl Drop for Process {
    fn drop(&mut self) {
        log::trace!("PCR {} '{}' released", self.pid, self.name);
    }
}
