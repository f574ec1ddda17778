//! Task layer: register snapshots and the scheduler seam

pub mod context;
pub mod scheduler;
#[cfg(feature = "std")]
pub mod thread;

pub use context::CpuContext;
pub use scheduler::{Scheduler, TaskEntry, TaskId};
#[cfg(feature = "std")]
pub use thread::ThreadScheduler;
