//! Program image replacement (execv)
//!
//! The new image is loaded, its stack defined and the argument vector
//! copied onto that stack before the running image is touched. If
//! anything fails up to that point the caller keeps its old image and gets
//! the error back. Identity, parent and children are never modified.
//!
//! A fresh image is entered with `rdi = argc`, `rsi = argv` and `rsp`
//! pointing at `argv`: a null-terminated array of pointers to the
//! NUL-terminated argument strings, which sit above it on the stack.

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use alloc::sync::Arc;
use alloc::vec::Vec;

use spin::Mutex;

use super::manager::Kernel;
use super::process::{Process, ProcessState};
use super::Program;
use crate::config::KernelConfig;
use crate::memory::address_space::poke_str;
use crate::memory::sim::{SimAddressSpace, SpaceStats};
use crate::memory::AddressSpace;
use crate::syscall::errno::Errno;
use crate::task::context::CpuContext;

/// A program image ready to be installed.
pub struct LoadedImage {
    pub address_space: Box<dyn AddressSpace>,
    pub entry_point: u64,
}

/// Produces fresh address spaces for exec.
pub trait ImageLoader: Send + Sync {
    fn load(&self, path: &str) -> Result<LoadedImage, Errno>;
}

/// In-memory image store: path -> program.
pub struct ProgramRegistry {
    programs: Mutex<BTreeMap<String, Program>>,
    stats: Arc<SpaceStats>,
}

impl ProgramRegistry {
    pub fn new(stats: Arc<SpaceStats>) -> Self {
        ProgramRegistry {
            programs: Mutex::new(BTreeMap::new()),
            stats,
        }
    }

    pub fn install(&self, path: &str, program: Program) {
        log::debug!("installing program at {}", path);
        self.programs.lock().insert(path.to_string(), program);
    }

    pub fn contains(&self, path: &str) -> bool {
        self.programs.lock().contains_key(path)
    }
}

impl ImageLoader for ProgramRegistry {
    fn load(&self, path: &str) -> Result<LoadedImage, Errno> {
        let program = self.programs.lock().get(path).cloned().ok_or(Errno::NoEntry)?;
        let (address_space, entry_point) = SimAddressSpace::with_program(&self.stats, program);
        Ok(LoadedImage {
            address_space,
            entry_point,
        })
    }
}

fn check_path(config: &KernelConfig, path: &str) -> Result<(), Errno> {
    if path.is_empty() {
        return Err(Errno::InvalidArgument);
    }
    // path_max counts the terminator
    if path.len() >= config.path_max {
        return Err(Errno::NameTooLong);
    }
    Ok(())
}

pub(crate) fn check_args(config: &KernelConfig, args: &[String]) -> Result<(), Errno> {
    if args.len() > config.max_args {
        return Err(Errno::ArgumentListTooLong);
    }
    let total: usize = args.iter().map(|arg| arg.len() + 1).sum();
    if total > config.arg_max {
        return Err(Errno::ArgumentListTooLong);
    }
    Ok(())
}

/// Copy `args` below `stack_top`: the strings first, then the
/// null-terminated pointer array, 16-byte aligned. Returns the array's
/// address, which is also the initial stack pointer.
fn push_arguments(space: &mut dyn AddressSpace, stack_top: u64, args: &[String]) -> Result<u64, Errno> {
    let mut sp = stack_top;
    let mut pointers = Vec::with_capacity(args.len() + 1);
    for arg in args {
        sp -= (arg.len() as u64 + 1).div_ceil(8) * 8;
        poke_str(space, sp, arg)?;
        pointers.push(sp);
    }
    pointers.push(0);

    let argv = (sp - 8 * pointers.len() as u64) & !0xf;
    for (slot, &pointer) in pointers.iter().enumerate() {
        space.poke(argv + 8 * slot as u64, pointer)?;
    }
    Ok(argv)
}

/// Define the stack of a fresh image, lay out its arguments and build the
/// register state it starts from. Arguments that do not fit on the stack
/// are `ArgumentListTooLong`.
pub(crate) fn prepare_entry(
    space: &mut dyn AddressSpace,
    entry_point: u64,
    args: &[String],
) -> Result<CpuContext, Errno> {
    let stack = space.define_stack()?;
    let argv = push_arguments(space, stack, args).map_err(|err| match err {
        Errno::Fault => Errno::ArgumentListTooLong,
        other => other,
    })?;

    let mut frame = CpuContext::new_user(entry_point, argv);
    frame.rdi = args.len() as u64;
    frame.rsi = argv;
    Ok(frame)
}

pub(crate) fn execv(
    kernel: &Kernel,
    current: &Arc<Process>,
    path: &str,
    args: &[String],
) -> Result<CpuContext, Errno> {
    check_path(kernel.config(), path)?;
    check_args(kernel.config(), args)?;

    let loader = kernel.loader().ok_or(Errno::NoEntry)?;
    let LoadedImage {
        mut address_space,
        entry_point,
    } = loader.load(path)?;
    let frame = prepare_entry(&mut *address_space, entry_point, args)?;

    let old = {
        let mut inner = current.lock();
        if inner.state != ProcessState::Running || inner.address_space.is_none() {
            drop(inner);
            super::fatal(kernel.scheduler(), current.pid(), "exec from a process that is not running");
        }
        address_space.activate();
        inner.address_space.replace(address_space)
    };
    drop(old);

    log::info!("process {} exec {} ({} args)", current.pid(), path, args.len());
    Ok(frame)
}
