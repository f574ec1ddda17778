//! System call interface for the process lifecycle
//!
//! Linux-style register convention: the number arrives in `rax`, arguments
//! in `rdi`, `rsi`, `rdx`, and the result goes back in `rax` as either a
//! value or `-(errno)`.

pub mod dispatcher;
pub mod errno;
pub mod handlers;

use errno::Errno;

/// System call numbers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u64)]
pub enum SyscallNumber {
    Fork = 0,
    Execv = 2,
    Exit = 3,
    Waitpid = 4,
    Getpid = 5,
}

impl SyscallNumber {
    pub fn from_u64(value: u64) -> Option<Self> {
        match value {
            0 => Some(Self::Fork),
            2 => Some(Self::Execv),
            3 => Some(Self::Exit),
            4 => Some(Self::Waitpid),
            5 => Some(Self::Getpid),
            _ => None,
        }
    }
}

/// System call result type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyscallResult {
    Ok(u64),
    Err(Errno),
}

impl From<Result<u64, Errno>> for SyscallResult {
    fn from(result: Result<u64, Errno>) -> Self {
        match result {
            Ok(value) => SyscallResult::Ok(value),
            Err(errno) => SyscallResult::Err(errno),
        }
    }
}
