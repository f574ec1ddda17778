//! Kernel facade - owns the process directory and the scheduler seam

use alloc::boxed::Box;
use alloc::string::{String, ToString};
use alloc::sync::{Arc, Weak};

use super::context::UserContext;
use super::exec::{self, ImageLoader};
use super::process::{ExitStatus, Process, ProcessId};
use super::table::ProcessTable;
use super::Program;
use crate::config::KernelConfig;
use crate::memory::AddressSpace;
use crate::syscall::errno::Errno;
use crate::task::context::CpuContext;
use crate::task::Scheduler;

pub struct Kernel {
    config: KernelConfig,
    table: ProcessTable,
    scheduler: Arc<dyn Scheduler>,
    loader: Option<Arc<dyn ImageLoader>>,
}

impl Kernel {
    /// A kernel without an image loader; `execv` fails with `NoEntry`.
    pub fn new(config: KernelConfig, scheduler: Arc<dyn Scheduler>) -> Arc<Self> {
        Self::build(config, scheduler, None)
    }

    pub fn with_loader(
        config: KernelConfig,
        scheduler: Arc<dyn Scheduler>,
        loader: Arc<dyn ImageLoader>,
    ) -> Arc<Self> {
        Self::build(config, scheduler, Some(loader))
    }

    fn build(
        config: KernelConfig,
        scheduler: Arc<dyn Scheduler>,
        loader: Option<Arc<dyn ImageLoader>>,
    ) -> Arc<Self> {
        log::info!(
            "kernel up: pids {}..={}, arg_max={}, path_max={}",
            config.pid_min,
            config.pid_max,
            config.arg_max,
            config.path_max
        );
        Arc::new(Kernel {
            table: ProcessTable::new(&config, scheduler.clone()),
            config,
            scheduler,
            loader,
        })
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub fn scheduler(&self) -> &dyn Scheduler {
        &*self.scheduler
    }

    pub fn table(&self) -> &ProcessTable {
        &self.table
    }

    pub(crate) fn loader(&self) -> Option<&Arc<dyn ImageLoader>> {
        self.loader.as_ref()
    }

    /// Create a parentless process and start it at `entry` with `args` on
    /// its stack, laid out as for `execv`.
    ///
    /// The new process has no one to reap it, so it is reclaimed as soon
    /// as it exits.
    pub fn spawn_init(
        self: &Arc<Self>,
        name: &str,
        mut address_space: Box<dyn AddressSpace>,
        entry: u64,
        args: &[String],
    ) -> Result<ProcessId, Errno> {
        exec::check_args(&self.config, args)?;
        let reservation = self.table.allocate()?;
        let pid = reservation.pid();
        let frame = exec::prepare_entry(&mut *address_space, entry, args)?;

        let process = Process::new(pid, name.to_string(), Weak::new(), address_space);
        self.table.register(reservation, &process);

        let context = UserContext::start(self.clone(), process.clone(), frame);
        if let Err(err) = self.scheduler.spawn(name, context.into_task()) {
            log::warn!("init process {} '{}' could not be started: {}", pid, name, err);
            self.table.unregister(pid);
            return Err(err);
        }

        log::info!("spawned init process {} '{}'", pid, name);
        Ok(pid)
    }

    /// Map `program` into `address_space` and start it as a root process.
    pub fn spawn_program(
        self: &Arc<Self>,
        name: &str,
        mut address_space: Box<dyn AddressSpace>,
        program: Program,
        args: &[String],
    ) -> Result<ProcessId, Errno> {
        let entry = address_space.map_text(program);
        self.spawn_init(name, address_space, entry, args)
    }

    pub fn fork(
        self: &Arc<Self>,
        current: &Arc<Process>,
        frame: &CpuContext,
        argv: &[String],
    ) -> Result<ProcessId, Errno> {
        super::fork::fork(self, current, frame, argv)
    }

    /// Terminate `current` with a normal exit code. Never returns.
    pub fn exit(&self, current: &Arc<Process>, code: i32) -> ! {
        self.exit_with_status(current, ExitStatus::exited(code))
    }

    pub fn exit_with_status(&self, current: &Arc<Process>, status: ExitStatus) -> ! {
        super::exit::exit(self, current, status)
    }

    pub fn waitpid(
        &self,
        current: &Arc<Process>,
        pid: ProcessId,
        options: u32,
    ) -> Result<ExitStatus, Errno> {
        super::wait::waitpid(self, current, pid, options)
    }

    /// Replace the image of `current`. On success returns the register
    /// state the new image starts from.
    pub fn execv(
        &self,
        current: &Arc<Process>,
        path: &str,
        args: &[String],
    ) -> Result<CpuContext, Errno> {
        super::exec::execv(self, current, path, args)
    }

    pub fn getpid(&self, current: &Process) -> ProcessId {
        current.pid()
    }

    pub fn lookup(&self, pid: ProcessId) -> Option<Arc<Process>> {
        self.table.lookup(pid)
    }

    /// Identities currently reserved or held by a live or zombie record.
    pub fn process_count(&self) -> usize {
        self.table.len()
    }

    /// Block until every process has been reclaimed.
    pub fn wait_idle(&self) {
        self.table.wait_until_empty();
        log::debug!("process table drained");
    }
}
