//! Kernel configuration for the process lifecycle core.
//!
//! Defaults mirror the limits a stock teaching kernel ships with. Hosts
//! shrink them to exercise exhaustion paths.

/// Lowest identity handed to a user process. 1 belongs to the kernel.
pub const PID_MIN: u32 = 2;

/// Highest identity handed to a user process (inclusive).
pub const PID_MAX: u32 = 32767;

/// Total bytes of argument strings accepted by exec.
pub const ARG_MAX: usize = 64 * 1024;

/// Longest path accepted by exec, including the terminator.
pub const PATH_MAX: usize = 1024;

/// Most argv entries accepted by exec.
pub const MAX_ARGS: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelConfig {
    pub pid_min: u32,
    pub pid_max: u32,
    pub arg_max: usize,
    pub path_max: usize,
    pub max_args: usize,
}

impl Default for KernelConfig {
    fn default() -> Self {
        KernelConfig {
            pid_min: PID_MIN,
            pid_max: PID_MAX,
            arg_max: ARG_MAX,
            path_max: PATH_MAX,
            max_args: MAX_ARGS,
        }
    }
}

impl KernelConfig {
    /// Restrict the identity range. `min` is clamped so the kernel's own
    /// identity is never handed out.
    pub fn with_pid_range(mut self, min: u32, max: u32) -> Self {
        self.pid_min = min.max(PID_MIN);
        self.pid_max = max;
        self
    }

    pub fn with_arg_max(mut self, arg_max: usize) -> Self {
        self.arg_max = arg_max;
        self
    }

    pub fn with_path_max(mut self, path_max: usize) -> Self {
        self.path_max = path_max;
        self
    }

    pub fn with_max_args(mut self, max_args: usize) -> Self {
        self.max_args = max_args;
        self
    }

    /// Number of identities the directory can hand out at once.
    pub fn pid_capacity(&self) -> usize {
        if self.pid_max < self.pid_min {
            0
        } else {
            (self.pid_max - self.pid_min) as usize + 1
        }
    }
}
