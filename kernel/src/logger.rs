//! Hosted kernel log sink
//!
//! Installs a [`log`] backend that writes to stderr and keeps a bounded
//! ring of recent lines, so hosts and tests can read back what the kernel
//! reported.

use alloc::collections::VecDeque;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt::Write as _;
use std::io::Write as _;

use conquer_once::spin::OnceCell;
use log::{LevelFilter, Log, Metadata, Record};
use spin::Mutex;

/// Lines kept for [`captured`]; older lines are dropped first
const CAPTURE_LINES: usize = 1024;

static KERNEL_LOGGER: OnceCell<KernelLogger> = OnceCell::uninit();

/// Writes `[LEVEL] target: message` to stderr and keeps the most recent
/// lines in memory so hosts can assert on what the kernel reported.
pub struct KernelLogger {
    ring: Mutex<VecDeque<String>>,
}

impl KernelLogger {
    fn new() -> Self {
        KernelLogger {
            ring: Mutex::new(VecDeque::with_capacity(CAPTURE_LINES)),
        }
    }

    fn capture(&self, line: String) {
        let mut ring = self.ring.lock();
        if ring.len() == CAPTURE_LINES {
            ring.pop_front();
        }
        ring.push_back(line);
    }
}

impl Log for KernelLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let mut line = String::new();
        let _ = write!(line, "[{:>5}] {}: {}", record.level(), record.target(), record.args());

        // A closed stderr must not take the kernel down with it
        let _ = writeln!(std::io::stderr().lock(), "{}", line);
        self.capture(line);
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

/// Install the kernel logger. Later calls only adjust the level.
pub fn init(level: LevelFilter) {
    let logger = KERNEL_LOGGER.get_or_init(KernelLogger::new);
    if log::set_logger(logger).is_ok() {
        log::debug!("kernel logger installed");
    }
    log::set_max_level(level);
}

/// Lines captured so far, oldest first.
pub fn captured() -> Vec<String> {
    match KERNEL_LOGGER.get() {
        Some(logger) => logger.ring.lock().iter().cloned().collect(),
        None => Vec::new(),
    }
}

/// Drop every captured line.
pub fn clear_captured() {
    if let Some(logger) = KERNEL_LOGGER.get() {
        logger.ring.lock().clear();
    }
}
