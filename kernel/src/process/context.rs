//! The in-task view of the current process
//!
//! A [`UserContext`] is what a running program sees: its own record, its
//! live register snapshot and a handle to the kernel. System calls go
//! through the register-level dispatcher exactly as a trap would.

use alloc::string::{String, ToString};
use alloc::sync::Arc;
use alloc::vec::Vec;

use super::manager::Kernel;
use super::process::{ExitStatus, Process, ProcessId, ProcessState, SIGABRT, SIGSEGV};
use super::Program;
use crate::memory::address_space::{peek_str, poke_str};
use crate::syscall::errno::Errno;
use crate::syscall::{dispatcher, SyscallNumber};
use crate::task::context::CpuContext;
use crate::task::TaskEntry;

pub struct UserContext {
    pub(crate) kernel: Arc<Kernel>,
    pub(crate) process: Arc<Process>,
    pub(crate) frame: CpuContext,
    pub(crate) argv: Vec<String>,
}

impl UserContext {
    pub(crate) fn new(
        kernel: Arc<Kernel>,
        process: Arc<Process>,
        frame: CpuContext,
        argv: Vec<String>,
    ) -> Self {
        UserContext {
            kernel,
            process,
            frame,
            argv,
        }
    }

    /// Context for a freshly entered image: the argument vector is read
    /// back from the `argc`/`argv` registers the image starts with.
    pub(crate) fn start(kernel: Arc<Kernel>, process: Arc<Process>, frame: CpuContext) -> Self {
        let mut context = UserContext::new(kernel, process, frame, Vec::new());
        context.argv = context.entry_args();
        context
    }

    fn entry_args(&self) -> Vec<String> {
        let (argc, argv) = (self.frame.rdi, self.frame.rsi);
        let limit = self.kernel.config().arg_max + 1;
        let read = (0..argc)
            .map(|i| {
                let ptr = self.load(argv + 8 * i)?;
                self.load_str(ptr, limit)
            })
            .collect::<Result<Vec<_>, Errno>>();
        match read {
            Ok(args) => args,
            Err(err) => {
                log::warn!("process {}: unreadable argv: {}", self.process.pid(), err);
                Vec::new()
            }
        }
    }

    /// Package this context as a task that resumes it.
    ///
    /// If the program faults, the task still leaves through the exit path
    /// with an abnormal status.
    pub(crate) fn into_task(self) -> TaskEntry {
        let kernel = self.kernel.clone();
        let process = self.process.clone();
        TaskEntry::new(
            move || {
                let mut context = self;
                context.process.with_address_space(|space| space.activate());
                context.resume()
            },
            move || {
                if process.state() == ProcessState::Running {
                    log::warn!("process {} faulted", process.pid());
                    kernel.exit_with_status(&process, ExitStatus::signaled(SIGABRT));
                }
            },
        )
    }

    /// Run the code at `rip` to completion; returning from it is `exit`.
    pub(crate) fn resume(&mut self) -> ! {
        let rip = self.frame.rip;
        let program = self
            .process
            .with_address_space(|space| space.fetch(rip))
            .flatten();
        match program {
            Some(program) => {
                let code = program(self);
                // Must not outlive exit: the parent may reap before we unwind.
                drop(program);
                self.exit(code)
            }
            None => {
                log::warn!("process {}: nothing mapped at {:#x}", self.process.pid(), rip);
                self.kernel
                    .exit_with_status(&self.process, ExitStatus::signaled(SIGSEGV))
            }
        }
    }

    pub fn kernel(&self) -> &Arc<Kernel> {
        &self.kernel
    }

    pub fn process(&self) -> &Arc<Process> {
        &self.process
    }

    pub fn frame(&self) -> &CpuContext {
        &self.frame
    }

    pub fn args(&self) -> &[String] {
        &self.argv
    }

    /// Issue a raw system call from the current resume address.
    pub fn syscall(&mut self, number: u64, args: [u64; 4]) -> Result<u64, Errno> {
        let rip = self.frame.rip;
        self.syscall_at(number, args, rip)
    }

    /// Issue a raw system call as if trapped at `rip`. A fork issued this
    /// way resumes the child at `rip`.
    pub fn syscall_at(&mut self, number: u64, args: [u64; 4], rip: u64) -> Result<u64, Errno> {
        self.frame = self.frame.for_syscall(number, args, rip);
        dispatcher::dispatch(self);
        self.frame.result()
    }

    pub fn getpid(&mut self) -> ProcessId {
        match self.syscall(SyscallNumber::Getpid as u64, [0; 4]) {
            Ok(pid) => ProcessId::new(pid as u32),
            Err(_) => self.process.pid(),
        }
    }

    /// Fork. The child runs `child` and exits with its return value; the
    /// caller gets the child's identity.
    pub fn fork<F>(&mut self, child: F) -> Result<ProcessId, Errno>
    where
        F: Fn(&mut UserContext) -> i32 + Send + Sync + 'static,
    {
        let program: Program = Arc::new(child);
        let rip = self
            .process
            .with_address_space(|space| space.map_text(program))
            .ok_or(Errno::Fault)?;
        let forked = self.syscall_at(SyscallNumber::Fork as u64, [0; 4], rip);
        // The child carries its own copy; the parent never runs this code.
        self.process.with_address_space(|space| space.unmap_text(rip));
        Ok(ProcessId::new(forked? as u32))
    }

    /// Wait for `pid`, receiving the status through a user stack slot.
    pub fn waitpid(&mut self, pid: ProcessId, options: u32) -> Result<ExitStatus, Errno> {
        let slot = self.frame.rsp - 8;
        self.waitpid_into(pid, slot, options)?;
        Ok(ExitStatus::from_raw(self.load(slot)? as u32 as i32))
    }

    /// waitpid with an explicit status address; 0 discards the status.
    pub fn waitpid_into(&mut self, pid: ProcessId, status_addr: u64, options: u32) -> Result<ProcessId, Errno> {
        let reaped = self.syscall(
            SyscallNumber::Waitpid as u64,
            [pid.as_u32() as u64, status_addr, options as u64, 0],
        )?;
        Ok(ProcessId::new(reaped as u32))
    }

    pub fn exit(&mut self, code: i32) -> ! {
        let _ = self.syscall(SyscallNumber::Exit as u64, [code as u32 as u64, 0, 0, 0]);
        // The dispatcher never comes back from Exit.
        self.kernel.exit(&self.process, code)
    }

    /// Replace the running image. Returns only on failure.
    pub fn execv(&mut self, path: &str, args: &[&str]) -> Errno {
        let args: Vec<String> = args.iter().map(|arg| arg.to_string()).collect();
        self.exec_image(path, args)
    }

    pub(crate) fn exec_image(&mut self, path: &str, args: Vec<String>) -> Errno {
        match self.kernel.execv(&self.process, path, &args) {
            Ok(frame) => {
                self.frame = frame;
                self.argv = self.entry_args();
                self.resume()
            }
            Err(err) => {
                log::debug!("process {}: execv {} failed: {}", self.process.pid(), path, err);
                err
            }
        }
    }

    /// Read one user word.
    pub fn load(&self, addr: u64) -> Result<u64, Errno> {
        self.process
            .with_address_space(|space| space.peek(addr))
            .unwrap_or(Err(Errno::Fault))
    }

    /// Write one user word.
    pub fn store(&self, addr: u64, value: u64) -> Result<(), Errno> {
        self.process
            .with_address_space(|space| space.poke(addr, value))
            .unwrap_or(Err(Errno::Fault))
    }

    /// Write a NUL-terminated string, packed little-endian into words.
    /// Returns the address just past it, rounded up to a word.
    pub fn store_str(&self, addr: u64, s: &str) -> Result<u64, Errno> {
        self.process
            .with_address_space(|space| poke_str(space, addr, s))
            .unwrap_or(Err(Errno::Fault))
    }

    /// Read a NUL-terminated string of fewer than `limit` bytes.
    pub fn load_str(&self, addr: u64, limit: usize) -> Result<String, Errno> {
        self.process
            .with_address_space(|space| peek_str(space, addr, limit, Errno::ArgumentListTooLong))
            .unwrap_or(Err(Errno::Fault))
    }
}
