//! Execution-context snapshot
//!
//! The saved register state of a suspended user flow. A snapshot is plain
//! data: `rip` is an address that only means something inside the address
//! space of the process that resumes it.

use crate::syscall::errno::Errno;

/// RFLAGS value for a fresh user flow (IF set, reserved bit 1 set).
pub const USER_RFLAGS: u64 = 0x202;

/// Register state captured at a syscall boundary.
///
/// Syscall convention (Linux-style): `rax` carries the syscall number on
/// entry and the result on return, arguments arrive in `rdi`, `rsi`,
/// `rdx`, `r10`. A negative `rax` on return is `-(errno)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(C)]
pub struct CpuContext {
    pub rax: u64,
    pub rdi: u64,
    pub rsi: u64,
    pub rdx: u64,
    pub r10: u64,
    pub rsp: u64,
    pub rip: u64,
    pub rflags: u64,
}

impl CpuContext {
    /// Create a new CPU context for a program entry point
    pub fn new_user(entry_point: u64, stack_pointer: u64) -> Self {
        Self {
            rsp: stack_pointer,
            rip: entry_point,
            rflags: USER_RFLAGS,
            ..Self::default()
        }
    }

    /// Capture the registers of a syscall about to be issued from `rip`.
    pub fn for_syscall(&self, number: u64, args: [u64; 4], rip: u64) -> Self {
        Self {
            rax: number,
            rdi: args[0],
            rsi: args[1],
            rdx: args[2],
            r10: args[3],
            rip,
            ..*self
        }
    }

    pub fn syscall_number(&self) -> u64 {
        self.rax
    }

    pub fn args(&self) -> [u64; 4] {
        [self.rdi, self.rsi, self.rdx, self.r10]
    }

    pub fn set_return(&mut self, value: u64) {
        self.rax = value;
    }

    pub fn set_error(&mut self, errno: Errno) {
        self.rax = (-(errno.as_i32() as i64)) as u64;
    }

    /// Decode `rax` after a syscall returned through this frame.
    pub fn result(&self) -> Result<u64, Errno> {
        let raw = self.rax as i64;
        if raw < 0 {
            Err(Errno::from_i32((-raw) as i32).unwrap_or(Errno::InvalidArgument))
        } else {
            Ok(self.rax)
        }
    }

    /// The snapshot a forked child resumes from: identical registers, but
    /// the creation call observes 0 in the child.
    pub fn fork_child(&self) -> Self {
        let mut child = *self;
        child.set_return(0);
        child
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fork_child_only_differs_in_return_register() {
        let parent = CpuContext::new_user(0x1000, 0x7fff_0000).for_syscall(0, [1, 2, 3, 4], 0x1040);
        let mut parent_after = parent;
        parent_after.set_return(42);

        let child = parent.fork_child();
        assert_eq!(child.rax, 0);
        assert_eq!(child.rip, parent_after.rip);
        assert_eq!(child.rsp, parent_after.rsp);
        assert_eq!(child.args(), parent_after.args());
        assert_eq!(parent_after.result(), Ok(42));
        assert_eq!(child.result(), Ok(0));
    }

    #[test]
    fn errors_are_negated_errno() {
        let mut frame = CpuContext::default();
        frame.set_error(Errno::NotChild);
        assert_eq!(frame.rax as i64, -10);
        assert_eq!(frame.result(), Err(Errno::NotChild));
    }

    #[test]
    fn new_user_context_enables_interrupts() {
        let ctx = CpuContext::new_user(0x4000, 0x8000);
        assert_eq!(ctx.rflags, USER_RFLAGS);
        assert_eq!(ctx.rax, 0);
    }
}
