//! System call handler implementations
//!
//! Each handler decodes its raw register arguments, copies anything it
//! needs out of user memory, and calls into the kernel facade.

use alloc::string::String;
use alloc::vec::Vec;

use super::errno::Errno;
use crate::memory::address_space::peek_str;
use super::SyscallResult;
use crate::process::{ProcessId, UserContext};

/// sys_fork - Duplicate the calling process
///
/// The child resumes at the caller's `rip` and observes 0.
pub fn sys_fork(ctx: &mut UserContext) -> SyscallResult {
    let frame = ctx.frame;
    match ctx.kernel.fork(&ctx.process, &frame, &ctx.argv) {
        Ok(pid) => SyscallResult::Ok(pid.as_u32() as u64),
        Err(errno) => {
            log::debug!("sys_fork: pid {} failed: {}", ctx.process.pid(), errno);
            SyscallResult::Err(errno)
        }
    }
}

/// sys_exit - Terminate the calling process
pub fn sys_exit(ctx: &mut UserContext, code: i32) -> ! {
    log::trace!("sys_exit: pid {} code {}", ctx.process.pid(), code);
    ctx.kernel.exit(&ctx.process, code)
}

/// sys_getpid - Identity of the calling process
pub fn sys_getpid(ctx: &mut UserContext) -> SyscallResult {
    SyscallResult::Ok(ctx.kernel.getpid(&ctx.process).as_u32() as u64)
}

/// sys_waitpid - Wait for a child and store its status at `status_ptr`
///
/// A null `status_ptr` reaps without storing. The status address is
/// checked before blocking so that a bad pointer never costs the child.
pub fn sys_waitpid(ctx: &mut UserContext, pid: u64, status_ptr: u64, options: u64) -> SyscallResult {
    let Ok(pid) = u32::try_from(pid) else {
        return SyscallResult::Err(Errno::NotChild);
    };
    let Ok(options) = u32::try_from(options) else {
        return SyscallResult::Err(Errno::InvalidArgument);
    };
    if options != 0 {
        return SyscallResult::Err(Errno::InvalidArgument);
    }
    if status_ptr != 0 {
        if let Err(errno) = ctx.load(status_ptr) {
            return SyscallResult::Err(errno);
        }
    }

    let pid = ProcessId::new(pid);
    let status = match ctx.kernel.waitpid(&ctx.process, pid, options) {
        Ok(status) => status,
        Err(errno) => return SyscallResult::Err(errno),
    };

    if status_ptr != 0 {
        if let Err(errno) = ctx.store(status_ptr, status.raw() as u32 as u64) {
            return SyscallResult::Err(errno);
        }
    }
    SyscallResult::Ok(pid.as_u32() as u64)
}

/// sys_execv - Replace the calling image with the program at `path_ptr`
///
/// `argv_ptr` is a null-terminated array of string pointers (or null for
/// no arguments). Returns only on failure.
pub fn sys_execv(ctx: &mut UserContext, path_ptr: u64, argv_ptr: u64) -> SyscallResult {
    let config = *ctx.kernel.config();

    let path = match copyin_str(ctx, path_ptr, config.path_max, Errno::NameTooLong) {
        Ok(path) => path,
        Err(errno) => return SyscallResult::Err(errno),
    };

    let mut args = Vec::new();
    let mut total = 0usize;
    if argv_ptr != 0 {
        loop {
            if args.len() > config.max_args {
                return SyscallResult::Err(Errno::ArgumentListTooLong);
            }
            let arg_ptr = match ctx.load(argv_ptr + 8 * args.len() as u64) {
                Ok(0) => break,
                Ok(ptr) => ptr,
                Err(errno) => return SyscallResult::Err(errno),
            };
            let remaining = config.arg_max.saturating_sub(total);
            let arg = match copyin_str(ctx, arg_ptr, remaining, Errno::ArgumentListTooLong) {
                Ok(arg) => arg,
                Err(errno) => return SyscallResult::Err(errno),
            };
            total += arg.len() + 1;
            args.push(arg);
        }
    }

    SyscallResult::Err(ctx.exec_image(&path, args))
}

/// Copy a NUL-terminated string out of user memory.
fn copyin_str(ctx: &UserContext, addr: u64, limit: usize, too_long: Errno) -> Result<String, Errno> {
    ctx.process
        .with_address_space(|space| peek_str(space, addr, limit, too_long))
        .unwrap_or(Err(Errno::Fault))
}
