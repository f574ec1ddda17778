//! Address-space seam
//!
//! The lifecycle core treats an address space as an opaque resource with
//! exactly one owner. It duplicates it on fork, installs it on exec, and
//! destroys it (by dropping the box) on exit. Paging, copy-on-write and
//! ELF loading all live behind this trait.

use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;

use crate::process::Program;
use crate::syscall::errno::Errno;

/// Base of the user text window
pub const TEXT_BASE: u64 = 0x1000_0000;

/// Distance between two mapped text entries
pub const TEXT_STRIDE: u64 = 0x100;

/// Base of the user data segment
pub const DATA_BASE: u64 = 0x2000_0000;

/// Size of the user data segment
pub const DATA_SIZE: u64 = 64 * 1024;

/// Top of the user stack (grows down)
pub const USER_STACK_TOP: u64 = 0x7fff_ff00_0000;

/// Size of the user stack
pub const USER_STACK_SIZE: u64 = 64 * 1024;

pub trait AddressSpace: Send {
    /// Deep copy for fork. Fails with `OutOfMemory`; `self` is untouched.
    fn duplicate(&self) -> Result<Box<dyn AddressSpace>, Errno>;

    /// Make this the active translation for the calling flow.
    fn activate(&self);

    /// Map executable code, returning the address it was placed at.
    fn map_text(&mut self, program: Program) -> u64;

    /// Remove the code mapped at `rip`, returning it.
    fn unmap_text(&mut self, rip: u64) -> Option<Program>;

    /// Resolve the code mapped at `rip`.
    fn fetch(&self, rip: u64) -> Option<Program>;

    /// Set up the user stack, returning the initial stack pointer.
    fn define_stack(&mut self) -> Result<u64, Errno>;

    /// Read one aligned user word.
    fn peek(&self, addr: u64) -> Result<u64, Errno>;

    /// Write one aligned user word.
    fn poke(&mut self, addr: u64, value: u64) -> Result<(), Errno>;
}

/// Write `s` NUL-terminated, packed little-endian into words at `addr`.
/// Returns the address just past it, rounded up to a word.
pub fn poke_str(space: &mut dyn AddressSpace, addr: u64, s: &str) -> Result<u64, Errno> {
    let mut bytes = Vec::from(s.as_bytes());
    bytes.push(0);
    let mut cursor = addr;
    for chunk in bytes.chunks(8) {
        let mut word = [0u8; 8];
        word[..chunk.len()].copy_from_slice(chunk);
        space.poke(cursor, u64::from_le_bytes(word))?;
        cursor += 8;
    }
    Ok(cursor)
}

/// Read a NUL-terminated string written by [`poke_str`]. Strings of
/// `limit` bytes or more (terminator included) fail with `too_long`.
pub fn peek_str(space: &dyn AddressSpace, addr: u64, limit: usize, too_long: Errno) -> Result<String, Errno> {
    let mut bytes = Vec::new();
    let mut cursor = addr;
    'words: loop {
        for byte in space.peek(cursor)?.to_le_bytes() {
            if byte == 0 {
                break 'words;
            }
            bytes.push(byte);
            if bytes.len() >= limit {
                return Err(too_long);
            }
        }
        cursor += 8;
    }
    String::from_utf8(bytes).map_err(|_| Errno::InvalidArgument)
}
