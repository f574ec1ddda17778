//! System call dispatcher
//!
//! Routes system calls to their appropriate handlers based on the syscall
//! number in the caller's saved frame, and writes the result back into it.

use super::errno::Errno;
use super::handlers;
use super::{SyscallNumber, SyscallResult};
use crate::process::UserContext;

/// Dispatch the system call described by `ctx.frame`.
pub fn dispatch(ctx: &mut UserContext) {
    let number = ctx.frame.syscall_number();
    let [arg1, arg2, arg3, _arg4] = ctx.frame.args();

    let result = match SyscallNumber::from_u64(number) {
        Some(SyscallNumber::Fork) => handlers::sys_fork(ctx),
        Some(SyscallNumber::Execv) => handlers::sys_execv(ctx, arg1, arg2),
        Some(SyscallNumber::Exit) => handlers::sys_exit(ctx, arg1 as i32),
        Some(SyscallNumber::Waitpid) => handlers::sys_waitpid(ctx, arg1, arg2, arg3),
        Some(SyscallNumber::Getpid) => handlers::sys_getpid(ctx),
        None => {
            log::warn!("Invalid syscall number: {}", number);
            SyscallResult::Err(Errno::NoSys)
        }
    };

    match result {
        SyscallResult::Ok(value) => ctx.frame.set_return(value),
        SyscallResult::Err(errno) => ctx.frame.set_error(errno),
    }
}
