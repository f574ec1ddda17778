//! Condition variable over a [`spin::Mutex`] monitor
//!
//! A `WaitQueue` is always paired with exactly one lock. Waiters enqueue
//! while still holding that lock, so a notifier that also holds it can
//! never slip a wakeup in between the check and the block.

use alloc::collections::VecDeque;
use spin::{Mutex, MutexGuard};

use crate::task::scheduler::{Scheduler, TaskId};

pub struct WaitQueue {
    waiters: Mutex<VecDeque<TaskId>>,
}

impl WaitQueue {
    pub const fn new() -> Self {
        WaitQueue {
            waiters: Mutex::new(VecDeque::new()),
        }
    }

    /// Release `guard`, block until notified, then reacquire `lock`.
    ///
    /// May return spuriously; use [`WaitQueue::wait_while`] unless the
    /// caller loops on its own predicate.
    pub fn wait<'a, T>(
        &self,
        lock: &'a Mutex<T>,
        guard: MutexGuard<'a, T>,
        scheduler: &dyn Scheduler,
    ) -> MutexGuard<'a, T> {
        let me = scheduler.current_task();
        self.waiters.lock().push_back(me);
        drop(guard);

        scheduler.block_current();

        // Woken spuriously: do not leave a stale entry that would swallow
        // a later notify_one.
        self.waiters.lock().retain(|&task| task != me);
        lock.lock()
    }

    /// Block while `condition` holds, with standard monitor semantics.
    pub fn wait_while<'a, T, F>(
        &self,
        lock: &'a Mutex<T>,
        mut guard: MutexGuard<'a, T>,
        scheduler: &dyn Scheduler,
        mut condition: F,
    ) -> MutexGuard<'a, T>
    where
        F: FnMut(&mut T) -> bool,
    {
        while condition(&mut *guard) {
            guard = self.wait(lock, guard, scheduler);
        }
        guard
    }

    /// Wake the longest-waiting task, if any.
    pub fn notify_one(&self, scheduler: &dyn Scheduler) -> bool {
        let task = self.waiters.lock().pop_front();
        match task {
            Some(task) => {
                scheduler.unblock(task);
                true
            }
            None => false,
        }
    }

    /// Wake every waiting task. Returns how many were woken.
    pub fn notify_all(&self, scheduler: &dyn Scheduler) -> usize {
        let woken: VecDeque<TaskId> = core::mem::take(&mut *self.waiters.lock());
        for &task in &woken {
            scheduler.unblock(task);
        }
        woken.len()
    }

    pub fn waiter_count(&self) -> usize {
        self.waiters.lock().len()
    }
}

impl Default for WaitQueue {
    fn default() -> Self {
        Self::new()
    }
}
