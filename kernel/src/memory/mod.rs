//! User address spaces
//!
//! [`AddressSpace`] is the seam the lifecycle core owns a process's memory
//! through; [`sim::SimAddressSpace`] is the in-memory implementation used
//! by hosted kernels.

pub mod address_space;
pub mod sim;

pub use address_space::AddressSpace;
pub use sim::{SimAddressSpace, SpaceStats, SpaceStatsSnapshot};
