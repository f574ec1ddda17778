//! fork / exit / waitpid round trips on a hosted kernel

mod shared;

use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

use kernel::{Errno, ProcessId, ProcessState, Termination};
use shared::{recv, Harness};

#[test]
fn exit_code_reaches_the_parent() {
    let h = Harness::new();
    let (tx, rx) = mpsc::channel();
    h.run("parent", move |ctx| {
        for code in [0, 1, 5, 42, 127, 255] {
            let child = ctx.fork(move |_| code).unwrap();
            tx.send(ctx.waitpid(child, 0).map(|status| status.decode())).unwrap();
        }
        0
    });

    for code in [0u8, 1, 5, 42, 127, 255] {
        assert_eq!(recv(&rx), Ok(Termination::Exited(code)));
    }
    h.settle();
}

#[test]
fn second_wait_on_a_reaped_child_fails() {
    let h = Harness::new();
    let (tx, rx) = mpsc::channel();
    h.run("parent", move |ctx| {
        let b = ctx.fork(|_| 5).unwrap();
        let first = ctx.waitpid(b, 0);
        let second = ctx.waitpid(b, 0);
        tx.send((first, second)).unwrap();
        0
    });

    let (first, second) = recv(&rx);
    let status = first.unwrap();
    assert!(status.is_normal());
    assert_eq!(status.code(), Some(5));
    assert_eq!(second, Err(Errno::NotChild));
    h.settle();
}

#[test]
fn wait_issued_before_the_child_exits_blocks_then_returns() {
    let h = Harness::new();
    let (tx, rx) = mpsc::channel();
    let (go_tx, go_rx) = mpsc::sync_channel::<()>(1);
    let go_rx = Arc::new(Mutex::new(go_rx));
    h.run("parent", move |ctx| {
        let go_rx = go_rx.clone();
        let c = ctx.fork(move |_| {
            // Hold off until the parent is about to block.
            let _ = go_rx.lock().unwrap().recv();
            std::thread::sleep(Duration::from_millis(50));
            9
        })
        .unwrap();
        go_tx.send(()).unwrap();
        tx.send(ctx.waitpid(c, 0).map(|status| status.decode())).unwrap();
        0
    });

    assert_eq!(recv(&rx), Ok(Termination::Exited(9)));
    h.settle();
}

#[test]
fn fork_returns_zero_in_the_child_and_a_fresh_pid_in_the_parent() {
    let h = Harness::new();
    let (tx, rx) = mpsc::channel();
    let root = h.run("parent", move |ctx| {
        let child_tx = tx.clone();
        let me = ctx.getpid();
        let child = ctx
            .fork(move |child_ctx| {
                let observed = child_ctx.frame().result();
                let own = child_ctx.getpid();
                let parent = child_ctx.process().parent_pid();
                child_tx.send(("child", observed.unwrap_or(u64::MAX), own, parent)).unwrap();
                0
            })
            .unwrap();
        tx.send(("parent", child.as_u32() as u64, me, None)).unwrap();
        ctx.waitpid(child, 0).unwrap();
        0
    });

    let mut reports = vec![recv(&rx), recv(&rx)];
    reports.sort_by_key(|report| report.0);
    let (_, child_saw, child_pid, child_parent) = reports[0];
    let (_, parent_saw, parent_pid, _) = reports[1];

    assert_eq!(child_saw, 0);
    assert_eq!(parent_saw, child_pid.as_u32() as u64);
    assert_ne!(child_pid, parent_pid);
    assert_eq!(parent_pid, root);
    assert_eq!(child_parent, Some(root));
    h.settle();
}

#[test]
fn waiting_on_a_non_child_is_rejected() {
    let h = Harness::new();
    let (tx, rx) = mpsc::channel();
    h.run("parent", move |ctx| {
        let me = ctx.getpid();
        let child = ctx
            .fork(move |child_ctx| {
                // The parent exists in the directory but is not our child.
                match child_ctx.waitpid(me, 0) {
                    Err(Errno::NotChild) => 0,
                    _ => 1,
                }
            })
            .unwrap();
        let never = ProcessId::new(30000);
        let refused = (ctx.waitpid(never, 0), ctx.waitpid(me, 0));
        let child_code = ctx.waitpid(child, 0).map(|status| status.code());
        tx.send((refused, child_code)).unwrap();
        0
    });

    let ((never, own), child_code) = recv(&rx);
    assert_eq!(never, Err(Errno::NotChild));
    assert_eq!(own, Err(Errno::NotChild));
    assert_eq!(child_code, Ok(Some(0)));
    h.settle();
}

#[test]
fn nonzero_wait_options_are_invalid() {
    let h = Harness::new();
    let (tx, rx) = mpsc::channel();
    h.run("parent", move |ctx| {
        let child = ctx.fork(|_| 3).unwrap();
        let rejected = ctx.waitpid(child, 1);
        let accepted = ctx.waitpid(child, 0).map(|status| status.code());
        tx.send((rejected, accepted)).unwrap();
        0
    });

    let (rejected, accepted) = recv(&rx);
    assert_eq!(rejected, Err(Errno::InvalidArgument));
    assert_eq!(accepted, Ok(Some(3)));
    h.settle();
}

#[test]
fn zombie_stays_visible_until_reaped() {
    let h = Harness::new();
    let (tx, rx) = mpsc::channel();
    h.run("parent", move |ctx| {
        let child = ctx.fork(|_| 7).unwrap();
        let kernel = ctx.kernel().clone();
        let record = kernel.lookup(child).unwrap();
        while record.state() == ProcessState::Running {
            std::thread::yield_now();
        }
        let zombie = (record.state(), record.has_address_space(), kernel.lookup(child).is_some());
        let status = ctx.waitpid(child, 0).unwrap();
        let reaped = (record.state(), kernel.lookup(child).is_some());
        tx.send((zombie, status.code(), reaped)).unwrap();
        0
    });

    let (zombie, code, reaped) = recv(&rx);
    assert_eq!(zombie, (ProcessState::Zombie, false, true));
    assert_eq!(code, Some(7));
    assert_eq!(reaped, (ProcessState::Destroyed, false));
    h.settle();
}

#[test]
fn reaped_children_release_what_their_code_captured() {
    const CHILDREN: usize = 50;

    let h = Harness::new();
    let (tx, rx) = mpsc::channel();
    h.run("parent", move |ctx| {
        let marker = Arc::new(());
        for _ in 0..CHILDREN {
            let held = marker.clone();
            let child = ctx
                .fork(move |_| {
                    let _ = &held;
                    0
                })
                .unwrap();
            ctx.waitpid(child, 0).unwrap();
        }
        tx.send(Arc::strong_count(&marker)).unwrap();
        0
    });

    assert_eq!(recv(&rx), 1, "reaped children still hold their captures");
    h.settle();
}
