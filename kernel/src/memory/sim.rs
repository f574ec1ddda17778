//! Simulated user address space
//!
//! Stands in for the paging layer: a text table of mapped programs, a
//! sparse word-addressed data segment and stack, and a shared
//! [`SpaceStats`] block so hosts can check that every address space ever
//! created is destroyed exactly once.

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use core::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use super::address_space::{
    AddressSpace, DATA_BASE, DATA_SIZE, TEXT_BASE, TEXT_STRIDE, USER_STACK_SIZE, USER_STACK_TOP,
};
use crate::process::Program;
use crate::syscall::errno::Errno;

/// Counters shared by every address space created from the same block.
#[derive(Debug, Default)]
pub struct SpaceStats {
    created: AtomicU64,
    destroyed: AtomicU64,
    duplicated: AtomicU64,
    activations: AtomicU64,
    /// Duplications to refuse before succeeding again (fault injection)
    failing_duplicates: AtomicUsize,
}

impl SpaceStats {
    pub fn new() -> Arc<Self> {
        Arc::new(SpaceStats::default())
    }

    /// Make the next `count` duplications fail with `OutOfMemory`.
    pub fn fail_next_duplicates(&self, count: usize) {
        self.failing_duplicates.store(count, Ordering::SeqCst);
    }

    /// Address spaces created and not yet destroyed.
    pub fn live(&self) -> u64 {
        let snapshot = self.snapshot();
        snapshot.created - snapshot.destroyed
    }

    pub fn snapshot(&self) -> SpaceStatsSnapshot {
        SpaceStatsSnapshot {
            created: self.created.load(Ordering::SeqCst),
            destroyed: self.destroyed.load(Ordering::SeqCst),
            duplicated: self.duplicated.load(Ordering::SeqCst),
            activations: self.activations.load(Ordering::SeqCst),
        }
    }

    fn take_duplicate_failure(&self) -> bool {
        self.failing_duplicates
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpaceStatsSnapshot {
    pub created: u64,
    pub destroyed: u64,
    pub duplicated: u64,
    pub activations: u64,
}

pub struct SimAddressSpace {
    text: BTreeMap<u64, Program>,
    next_text: u64,
    words: BTreeMap<u64, u64>,
    stack_top: Option<u64>,
    stats: Arc<SpaceStats>,
}

impl SimAddressSpace {
    pub fn new(stats: &Arc<SpaceStats>) -> Self {
        stats.created.fetch_add(1, Ordering::SeqCst);
        SimAddressSpace {
            text: BTreeMap::new(),
            next_text: TEXT_BASE,
            words: BTreeMap::new(),
            stack_top: None,
            stats: stats.clone(),
        }
    }

    /// A fresh space with `program` mapped at its entry point.
    pub fn with_program(stats: &Arc<SpaceStats>, program: Program) -> (Box<dyn AddressSpace>, u64) {
        let mut space = SimAddressSpace::new(stats);
        let entry = space.map_text(program);
        (Box::new(space), entry)
    }

    fn check(&self, addr: u64) -> Result<(), Errno> {
        if addr % 8 != 0 {
            return Err(Errno::Fault);
        }
        let in_data = (DATA_BASE..DATA_BASE + DATA_SIZE).contains(&addr);
        let in_stack = self
            .stack_top
            .map_or(false, |top| (top - USER_STACK_SIZE..top).contains(&addr));
        if in_data || in_stack {
            Ok(())
        } else {
            Err(Errno::Fault)
        }
    }
}

impl AddressSpace for SimAddressSpace {
    fn duplicate(&self) -> Result<Box<dyn AddressSpace>, Errno> {
        if self.stats.take_duplicate_failure() {
            log::debug!("address space duplication refused (injected failure)");
            return Err(Errno::OutOfMemory);
        }
        self.stats.duplicated.fetch_add(1, Ordering::SeqCst);
        let mut copy = SimAddressSpace::new(&self.stats);
        copy.text = self.text.clone();
        copy.next_text = self.next_text;
        copy.words = self.words.clone();
        copy.stack_top = self.stack_top;
        Ok(Box::new(copy))
    }

    fn activate(&self) {
        self.stats.activations.fetch_add(1, Ordering::SeqCst);
    }

    fn map_text(&mut self, program: Program) -> u64 {
        let rip = self.next_text;
        self.next_text += TEXT_STRIDE;
        self.text.insert(rip, program);
        rip
    }

    fn unmap_text(&mut self, rip: u64) -> Option<Program> {
        self.text.remove(&rip)
    }

    fn fetch(&self, rip: u64) -> Option<Program> {
        self.text.get(&rip).cloned()
    }

    fn define_stack(&mut self) -> Result<u64, Errno> {
        self.stack_top = Some(USER_STACK_TOP);
        Ok(USER_STACK_TOP)
    }

    fn peek(&self, addr: u64) -> Result<u64, Errno> {
        self.check(addr)?;
        Ok(self.words.get(&addr).copied().unwrap_or(0))
    }

    fn poke(&mut self, addr: u64, value: u64) -> Result<(), Errno> {
        self.check(addr)?;
        self.words.insert(addr, value);
        Ok(())
    }
}

impl Drop for SimAddressSpace {
    fn drop(&mut self) {
        self.stats.destroyed.fetch_add(1, Ordering::SeqCst);
    }
}
