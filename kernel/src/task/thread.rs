//! Hosted scheduler backed by OS threads
//!
//! Every task is a `std::thread`. Blocking is `thread::park`, which has the
//! token semantics [`Scheduler::block_current`] requires. Retiring a task
//! unwinds its thread back to the trampoline with a private payload, so
//! `exit_current` really does not return to its caller.

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::cell::Cell;
use core::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle, Thread};

use spin::Mutex;

use super::scheduler::{Scheduler, TaskEntry, TaskId};
use crate::syscall::errno::Errno;

/// Global task ID counter. 0 is never handed out.
static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

fn allocate_task_id() -> TaskId {
    TaskId::new(NEXT_TASK_ID.fetch_add(1, Ordering::SeqCst))
}

thread_local! {
    static CURRENT_TASK: Cell<Option<TaskId>> = const { Cell::new(None) };
}

/// Unwind payload: the task retired through `exit_current`.
struct TaskExit;

/// Unwind payload: the task was stopped after an invariant violation.
struct TaskHalt;

#[derive(Default)]
struct Shared {
    /// Threads that may be unblocked, by task
    registry: Mutex<BTreeMap<TaskId, Thread>>,
    /// Join handles of spawned tasks not yet joined
    handles: Mutex<Vec<JoinHandle<()>>>,
    /// Spawns to refuse before succeeding again (fault injection)
    failing_spawns: AtomicUsize,
    live: AtomicUsize,
    halted: AtomicUsize,
}

impl Shared {
    fn register_current(&self, id: TaskId) {
        CURRENT_TASK.with(|current| current.set(Some(id)));
        self.registry.lock().insert(id, thread::current());
    }
}

pub struct ThreadScheduler {
    shared: Arc<Shared>,
}

impl ThreadScheduler {
    pub fn new() -> Arc<Self> {
        Arc::new(ThreadScheduler {
            shared: Arc::new(Shared::default()),
        })
    }

    /// Make the next `count` calls to `spawn` fail with `OutOfMemory`.
    pub fn fail_next_spawns(&self, count: usize) {
        self.shared.failing_spawns.store(count, Ordering::SeqCst);
    }

    /// Tasks spawned and not yet finished.
    pub fn live_tasks(&self) -> usize {
        self.shared.live.load(Ordering::SeqCst)
    }

    /// Tasks stopped by `halt_current`.
    pub fn halted_tasks(&self) -> usize {
        self.shared.halted.load(Ordering::SeqCst)
    }

    /// Join every spawned task, including tasks spawned while joining.
    pub fn join_all(&self) {
        loop {
            let batch: Vec<JoinHandle<()>> = core::mem::take(&mut *self.shared.handles.lock());
            if batch.is_empty() {
                return;
            }
            for handle in batch {
                if handle.join().is_err() {
                    log::error!("task thread died outside its trampoline");
                }
            }
        }
    }

    fn take_spawn_failure(&self) -> bool {
        self.shared
            .failing_spawns
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

fn trampoline(shared: Arc<Shared>, id: TaskId, entry: TaskEntry) {
    shared.register_current(id);
    let (body, fault) = entry.into_parts();

    let outcome = match panic::catch_unwind(AssertUnwindSafe(body)) {
        Err(payload) if !payload.is::<TaskExit>() && !payload.is::<TaskHalt>() => {
            log::warn!("task {} faulted, running fault handler", id);
            panic::catch_unwind(AssertUnwindSafe(fault))
        }
        other => other,
    };

    match outcome {
        Err(payload) if payload.is::<TaskHalt>() => {
            shared.halted.fetch_add(1, Ordering::SeqCst);
            log::error!("task {} halted", id);
        }
        Err(payload) if !payload.is::<TaskExit>() => {
            log::error!("task {} faulted inside its fault handler", id);
        }
        _ => log::trace!("task {} finished", id),
    }

    shared.registry.lock().remove(&id);
    CURRENT_TASK.with(|current| current.set(None));
    shared.live.fetch_sub(1, Ordering::SeqCst);
}

impl Scheduler for ThreadScheduler {
    fn spawn(&self, name: &str, entry: TaskEntry) -> Result<TaskId, Errno> {
        if self.take_spawn_failure() {
            log::debug!("spawn of '{}' refused (injected failure)", name);
            return Err(Errno::OutOfMemory);
        }

        let id = allocate_task_id();
        let shared = self.shared.clone();
        self.shared.live.fetch_add(1, Ordering::SeqCst);
        let handle = thread::Builder::new()
            .name(alloc::format!("{}#{}", name, id))
            .spawn(move || trampoline(shared, id, entry))
            .map_err(|err| {
                self.shared.live.fetch_sub(1, Ordering::SeqCst);
                log::warn!("spawn of '{}' failed: {}", name, err);
                Errno::OutOfMemory
            })?;

        self.shared.handles.lock().push(handle);
        log::trace!("spawned task {} '{}'", id, name);
        Ok(id)
    }

    fn current_task(&self) -> TaskId {
        if let Some(id) = CURRENT_TASK.with(|current| current.get()) {
            // A host thread may have been adopted by another scheduler first.
            self.shared
                .registry
                .lock()
                .entry(id)
                .or_insert_with(thread::current);
            return id;
        }
        // A host thread (test harness, xtask main) joining in: adopt it.
        let id = allocate_task_id();
        self.shared.register_current(id);
        id
    }

    fn block_current(&self) {
        thread::park();
    }

    fn unblock(&self, task: TaskId) {
        let thread = self.shared.registry.lock().get(&task).cloned();
        match thread {
            Some(thread) => thread.unpark(),
            None => log::warn!("unblock of unknown task {}", task),
        }
    }

    fn exit_current(&self) -> ! {
        panic::resume_unwind(Box::new(TaskExit))
    }

    fn halt_current(&self) -> ! {
        panic::resume_unwind(Box::new(TaskHalt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn exit_current_does_not_return_to_the_task_body() {
        let scheduler = ThreadScheduler::new();
        let (tx, rx) = mpsc::channel();
        let sched = scheduler.clone();
        scheduler
            .spawn(
                "exiter",
                TaskEntry::new(
                    move || {
                        tx.send("before").unwrap();
                        sched.exit_current();
                    },
                    || {},
                ),
            )
            .unwrap();
        scheduler.join_all();
        assert_eq!(rx.try_iter().collect::<Vec<_>>(), ["before"]);
        assert_eq!(scheduler.live_tasks(), 0);
    }

    #[test]
    fn injected_spawn_failures_are_consumed() {
        let scheduler = ThreadScheduler::new();
        scheduler.fail_next_spawns(1);
        assert_eq!(
            scheduler.spawn("a", TaskEntry::new(|| {}, || {})),
            Err(Errno::OutOfMemory)
        );
        assert!(scheduler.spawn("b", TaskEntry::new(|| {}, || {})).is_ok());
        scheduler.join_all();
    }

    #[test]
    fn fault_handler_runs_when_the_body_panics() {
        let scheduler = ThreadScheduler::new();
        let (tx, rx) = mpsc::channel();
        scheduler
            .spawn(
                "crasher",
                TaskEntry::new(|| panic!("user fault"), move || tx.send(()).unwrap()),
            )
            .unwrap();
        scheduler.join_all();
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn halted_tasks_are_counted() {
        let scheduler = ThreadScheduler::new();
        let sched = scheduler.clone();
        scheduler
            .spawn("halter", TaskEntry::new(move || sched.halt_current(), || {}))
            .unwrap();
        scheduler.join_all();
        assert_eq!(scheduler.halted_tasks(), 1);
    }
}
