//! Process lifecycle core of a small teaching kernel
//!
//! `fork`, `exit`, `waitpid`, `execv` and `getpid` over per-process control
//! records, a process directory, and two external collaborators: a
//! [`task::Scheduler`] that runs flows of control and an
//! [`memory::AddressSpace`] that owns a process's memory.
//!
//! The core is `no_std` + `alloc`. The default `std` feature adds a
//! thread-backed scheduler and a stderr logger so the kernel can be hosted
//! in tests and in the `xtask` driver.

#![cfg_attr(not(any(test, feature = "std")), no_std)]

extern crate alloc;

pub mod config;
#[cfg(feature = "std")]
pub mod logger;
pub mod memory;
pub mod process;
pub mod sync;
pub mod syscall;
pub mod task;

pub use config::KernelConfig;
pub use process::{ExitStatus, Kernel, Process, ProcessId, ProcessState, Program, Termination, UserContext};
pub use syscall::errno::Errno;
