//! POSIX errno values
//!
//! Error codes surfaced by the process lifecycle system calls. Every
//! recoverable failure in this crate is one of these; logic defects are
//! not errno values and go through [`crate::process::fatal`] instead.

use core::fmt;

/// No such file or directory
pub const ENOENT: i32 = 2;

/// Argument list too long
pub const E2BIG: i32 = 7;

/// No child processes
pub const ECHILD: i32 = 10;

/// Resource temporarily unavailable (process identities exhausted)
pub const EAGAIN: i32 = 11;

/// Cannot allocate memory
pub const ENOMEM: i32 = 12;

/// Bad address
pub const EFAULT: i32 = 14;

/// Invalid argument
pub const EINVAL: i32 = 22;

/// File name too long
pub const ENAMETOOLONG: i32 = 36;

/// Function not implemented (used by syscall dispatcher)
pub const ENOSYS: i32 = 38;

/// Typed errno returned by every fallible kernel operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum Errno {
    /// PCR allocation, address-space duplication or task spawn failed
    OutOfMemory = ENOMEM,
    /// The identity space is saturated
    ResourceExhausted = EAGAIN,
    /// Wait target is not a live or zombie child of the caller
    NotChild = ECHILD,
    /// Unsupported flags or malformed arguments
    InvalidArgument = EINVAL,
    /// exec target does not exist
    NoEntry = ENOENT,
    /// exec argument vector exceeds the configured limits
    ArgumentListTooLong = E2BIG,
    /// exec path exceeds the configured limit
    NameTooLong = ENAMETOOLONG,
    /// A user-supplied address did not resolve
    Fault = EFAULT,
    /// Unknown system call number
    NoSys = ENOSYS,
}

impl Errno {
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            ENOMEM => Some(Self::OutOfMemory),
            EAGAIN => Some(Self::ResourceExhausted),
            ECHILD => Some(Self::NotChild),
            EINVAL => Some(Self::InvalidArgument),
            ENOENT => Some(Self::NoEntry),
            E2BIG => Some(Self::ArgumentListTooLong),
            ENAMETOOLONG => Some(Self::NameTooLong),
            EFAULT => Some(Self::Fault),
            ENOSYS => Some(Self::NoSys),
            _ => None,
        }
    }

    fn message(self) -> &'static str {
        match self {
            Self::OutOfMemory => "cannot allocate memory",
            Self::ResourceExhausted => "no process identities available",
            Self::NotChild => "no such child process",
            Self::InvalidArgument => "invalid argument",
            Self::NoEntry => "no such file or directory",
            Self::ArgumentListTooLong => "argument list too long",
            Self::NameTooLong => "file name too long",
            Self::Fault => "bad address",
            Self::NoSys => "function not implemented",
        }
    }
}

impl fmt::Display for Errno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (errno {})", self.message(), self.as_i32())
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Errno {}
