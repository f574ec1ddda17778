//! Resource failures, rollback and abnormal termination

mod shared;

use std::sync::mpsc;

use kernel::process::{fatal, SIGABRT, SIGSEGV};
use kernel::syscall::SyscallNumber;
use kernel::task::{Scheduler, TaskEntry, ThreadScheduler};
use kernel::{Errno, KernelConfig, ProcessId, Termination};
use shared::{recv, Harness};

#[test]
fn failed_duplication_leaves_the_parent_untouched() {
    let h = Harness::new();
    let stats = h.stats.clone();
    let (tx, rx) = mpsc::channel();
    h.run("parent", move |ctx| {
        let count = ctx.kernel().process_count();
        let live = stats.live();
        stats.fail_next_duplicates(1);
        let failed = ctx.fork(|_| 0);
        let after = (
            ctx.kernel().process_count(),
            stats.live(),
            ctx.process().child_pids().len(),
        );
        let retry = ctx.fork(|_| 4).and_then(|child| ctx.waitpid(child, 0));
        tx.send((failed, (count, live, 0), after, retry.map(|s| s.code())))
            .unwrap();
        0
    });

    let (failed, before, after, retry) = recv(&rx);
    assert_eq!(failed, Err(Errno::OutOfMemory));
    assert_eq!(before, after);
    assert_eq!(retry, Ok(Some(4)));
    h.settle();
}

#[test]
fn failed_spawn_rolls_the_child_back() {
    let h = Harness::new();
    let stats = h.stats.clone();
    let scheduler = h.scheduler.clone();
    let (tx, rx) = mpsc::channel();
    h.run("parent", move |ctx| {
        let count = ctx.kernel().process_count();
        let live = stats.live();
        scheduler.fail_next_spawns(1);
        let failed = ctx.fork(|_| 0);
        let after = (
            ctx.kernel().process_count(),
            stats.live(),
            ctx.process().child_pids().len(),
        );
        tx.send((failed, (count, live, 0), after)).unwrap();
        0
    });

    let (failed, before, after) = recv(&rx);
    assert_eq!(failed, Err(Errno::OutOfMemory));
    assert_eq!(before, after);
    h.settle();
}

#[test]
fn exhausted_identity_space_is_reported_and_recovers() {
    let h = Harness::with_config(KernelConfig::default().with_pid_range(2, 3));
    let (tx, rx) = mpsc::channel();
    h.run("parent", move |ctx| {
        let first = ctx.fork(|_| 0).unwrap();
        let exhausted = ctx.fork(|_| 0);
        ctx.waitpid(first, 0).unwrap();
        let reused = ctx.fork(|_| 8).and_then(|child| ctx.waitpid(child, 0));
        tx.send((first, exhausted, reused.map(|s| s.code()))).unwrap();
        0
    });

    let (first, exhausted, reused) = recv(&rx);
    assert_eq!(first, ProcessId::new(3));
    assert_eq!(exhausted, Err(Errno::ResourceExhausted));
    assert_eq!(reused, Ok(Some(8)));
    h.settle();
}

#[test]
fn panicking_program_terminates_abnormally() {
    let h = Harness::new();
    let (tx, rx) = mpsc::channel();
    h.run("parent", move |ctx| {
        let child = ctx.fork(|_| panic!("user program fault")).unwrap();
        tx.send(ctx.waitpid(child, 0).map(|s| (s.decode(), s.is_normal())))
            .unwrap();
        0
    });

    assert_eq!(recv(&rx), Ok((Termination::Signaled(SIGABRT), false)));
    h.settle();
}

#[test]
fn resuming_at_an_unmapped_address_is_a_segfault() {
    let h = Harness::new();
    let (tx, rx) = mpsc::channel();
    h.run("parent", move |ctx| {
        let child = ctx
            .syscall_at(SyscallNumber::Fork as u64, [0; 4], 0xdead_0000)
            .map(|pid| ProcessId::new(pid as u32))
            .unwrap();
        tx.send(ctx.waitpid(child, 0).map(|s| s.decode())).unwrap();
        0
    });

    assert_eq!(recv(&rx), Ok(Termination::Signaled(SIGSEGV)));
    h.settle();
}

#[test]
fn fatal_halts_only_the_offending_task() {
    let _h = Harness::new();
    let scheduler = ThreadScheduler::new();
    let sched = scheduler.clone();
    let (tx, rx) = mpsc::channel();
    scheduler
        .spawn(
            "broken",
            TaskEntry::new(
                move || {
                    tx.send(()).unwrap();
                    fatal(&*sched, ProcessId::new(42), "record in an impossible state");
                },
                || {},
            ),
        )
        .unwrap();
    scheduler.join_all();

    assert!(rx.try_recv().is_ok());
    assert_eq!(scheduler.halted_tasks(), 1);
    assert!(kernel::logger::captured()
        .iter()
        .any(|line| line.contains("FATAL: process 42")));
}
