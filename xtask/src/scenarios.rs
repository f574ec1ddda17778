//! Lifecycle scenarios run against a hosted kernel

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{bail, ensure, Context, Result};
use kernel::memory::{SimAddressSpace, SpaceStats};
use kernel::task::ThreadScheduler;
use kernel::{Errno, Kernel, KernelConfig, UserContext};

struct Host {
    kernel: Arc<Kernel>,
    scheduler: Arc<ThreadScheduler>,
    stats: Arc<SpaceStats>,
    /// Mismatches reported from inside the kernel
    failures: Arc<Mutex<Vec<String>>>,
}

impl Host {
    fn boot() -> Self {
        let scheduler = ThreadScheduler::new();
        Host {
            kernel: Kernel::new(KernelConfig::default(), scheduler.clone()),
            scheduler,
            stats: SpaceStats::new(),
            failures: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn run<F>(&self, name: &str, program: F) -> Result<()>
    where
        F: Fn(&mut UserContext) -> i32 + Send + Sync + 'static,
    {
        self.kernel
            .spawn_program(
                name,
                Box::new(SimAddressSpace::new(&self.stats)),
                Arc::new(program),
                &[name.to_string()],
            )
            .map_err(|errno| anyhow::anyhow!("spawning {}: {}", name, errno))?;
        Ok(())
    }

    /// Wait for the process table to drain, then check for leaks and
    /// reported mismatches.
    fn finish(&self) -> Result<()> {
        self.kernel.wait_idle();
        self.scheduler.join_all();

        let failures = self.failures.lock().map_err(|_| anyhow::anyhow!("failure log poisoned"))?;
        if let Some(first) = failures.first() {
            bail!("{} mismatches, first: {}", failures.len(), first);
        }
        ensure!(self.kernel.process_count() == 0, "process table not drained");
        ensure!(self.stats.live() == 0, "{} address spaces leaked", self.stats.live());
        ensure!(self.scheduler.halted_tasks() == 0, "a task was halted");
        Ok(())
    }
}

fn report(failures: &Mutex<Vec<String>>, message: String) {
    if let Ok(mut failures) = failures.lock() {
        failures.push(message);
    }
}

fn branch(
    ctx: &mut UserContext,
    level: u32,
    depth: u32,
    width: u32,
    failures: &Arc<Mutex<Vec<String>>>,
    spawned: &Arc<AtomicUsize>,
) -> i32 {
    if level < depth {
        let mut children = Vec::new();
        for _ in 0..width {
            let failures_for_child = failures.clone();
            let spawned_for_child = spawned.clone();
            match ctx.fork(move |child| {
                branch(child, level + 1, depth, width, &failures_for_child, &spawned_for_child)
            }) {
                Ok(pid) => {
                    spawned.fetch_add(1, Ordering::SeqCst);
                    children.push(pid);
                }
                Err(errno) => report(failures, format!("fork at level {}: {}", level, errno)),
            }
        }
        for pid in children {
            match ctx.waitpid(pid, 0) {
                Ok(status) if status.code() == Some((level + 1) as u8) => {}
                Ok(status) => report(failures, format!("child {} at level {}: {}", pid, level + 1, status)),
                Err(errno) => report(failures, format!("waitpid {}: {}", pid, errno)),
            }
        }
    }
    level as i32
}

pub fn fork_tree(depth: u32, width: u32) -> Result<String> {
    ensure!(depth <= 8, "depth {} would start too many processes", depth);
    let host = Host::boot();
    let spawned = Arc::new(AtomicUsize::new(1));
    let failures = host.failures.clone();
    let counter = spawned.clone();
    host.run("tree", move |ctx| branch(ctx, 0, depth, width, &failures, &counter))?;
    host.finish().context("fork-tree")?;
    Ok(format!(
        "fork-tree: {} processes, depth {}, width {}",
        spawned.load(Ordering::SeqCst),
        depth,
        width
    ))
}

pub fn orphans(count: u32) -> Result<String> {
    let host = Host::boot();
    let forked = Arc::new(AtomicUsize::new(0));
    let failures = host.failures.clone();
    let forked_in = forked.clone();
    host.run("abandoner", move |ctx| {
        for _ in 0..count {
            let result = ctx.fork(|child| {
                while child.process().parent_pid().is_some() {
                    std::thread::yield_now();
                }
                0
            });
            match result {
                Ok(_) => {
                    forked_in.fetch_add(1, Ordering::SeqCst);
                }
                Err(errno) => report(&failures, format!("fork: {}", errno)),
            }
        }
        0
    })?;
    host.finish().context("orphans")?;
    Ok(format!(
        "orphans: {} children reclaimed without a wait",
        forked.load(Ordering::SeqCst)
    ))
}

pub fn reap(children: u32) -> Result<String> {
    let host = Host::boot();
    let failures = host.failures.clone();
    host.run("reaper", move |ctx| {
        let mut pids = Vec::new();
        for i in 0..children {
            let code = (i % 256) as u8;
            match ctx.fork(move |_| code as i32) {
                Ok(pid) => pids.push((pid, code)),
                Err(errno) => report(&failures, format!("fork {}: {}", i, errno)),
            }
        }
        for &(pid, code) in pids.iter().rev() {
            match ctx.waitpid(pid, 0) {
                Ok(status) if status.code() == Some(code) => {}
                Ok(status) => report(&failures, format!("child {}: expected {}, got {}", pid, code, status)),
                Err(errno) => report(&failures, format!("waitpid {}: {}", pid, errno)),
            }
            match ctx.waitpid(pid, 0) {
                Err(Errno::NotChild) => {}
                other => report(&failures, format!("second wait on {}: {:?}", pid, other)),
            }
        }
        0
    })?;
    host.finish().context("reap")?;
    Ok(format!("reap: {} children reaped in reverse order", children))
}
