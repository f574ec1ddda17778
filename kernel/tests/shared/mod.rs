//! Hosted kernel harness shared by the integration tests

#![allow(dead_code)]

use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::time::Duration;

use kernel::memory::{SimAddressSpace, SpaceStats};
use kernel::process::{ImageLoader, ProgramRegistry};
use kernel::task::ThreadScheduler;
use kernel::{Kernel, KernelConfig, ProcessId, UserContext};
use log::LevelFilter;

const RECV_TIMEOUT: Duration = Duration::from_secs(20);

pub struct Harness {
    pub kernel: Arc<Kernel>,
    pub scheduler: Arc<ThreadScheduler>,
    pub stats: Arc<SpaceStats>,
    pub registry: Arc<ProgramRegistry>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(KernelConfig::default())
    }

    pub fn with_config(config: KernelConfig) -> Self {
        kernel::logger::init(LevelFilter::Info);
        let scheduler = ThreadScheduler::new();
        let stats = SpaceStats::new();
        let registry = Arc::new(ProgramRegistry::new(stats.clone()));
        let loader: Arc<dyn ImageLoader> = registry.clone();
        let kernel = Kernel::with_loader(config, scheduler.clone(), loader);
        Harness {
            kernel,
            scheduler,
            stats,
            registry,
        }
    }

    /// Start `program` as a parentless process.
    pub fn run<F>(&self, name: &str, program: F) -> ProcessId
    where
        F: Fn(&mut UserContext) -> i32 + Send + Sync + 'static,
    {
        self.run_with_args(name, &[], program)
    }

    pub fn run_with_args<F>(&self, name: &str, args: &[&str], program: F) -> ProcessId
    where
        F: Fn(&mut UserContext) -> i32 + Send + Sync + 'static,
    {
        let args: Vec<String> = args.iter().map(|arg| arg.to_string()).collect();
        self.kernel
            .spawn_program(
                name,
                Box::new(SimAddressSpace::new(&self.stats)),
                Arc::new(program),
                &args,
            )
            .expect("spawn root process")
    }

    /// Wait for every process to be reclaimed and every task to finish.
    pub fn settle(&self) {
        self.kernel.wait_idle();
        self.scheduler.join_all();
        assert_eq!(self.kernel.process_count(), 0, "process table not drained");
        assert_eq!(self.stats.live(), 0, "address spaces leaked");
        assert_eq!(self.scheduler.halted_tasks(), 0, "a task hit a fatal invariant");
    }
}

pub fn recv<T>(rx: &Receiver<T>) -> T {
    rx.recv_timeout(RECV_TIMEOUT).expect("program did not report back")
}
