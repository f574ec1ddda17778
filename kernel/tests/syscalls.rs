//! Register-level system call conventions

mod shared;

use std::sync::mpsc;

use kernel::memory::address_space::DATA_BASE;
use kernel::syscall::SyscallNumber;
use kernel::{Errno, ExitStatus, ProcessId};
use shared::{recv, Harness};

#[test]
fn unknown_numbers_are_enosys() {
    let h = Harness::new();
    let (tx, rx) = mpsc::channel();
    h.run("caller", move |ctx| {
        let result = ctx.syscall(1, [0; 4]);
        tx.send((result, ctx.frame().rax as i64)).unwrap();
        0
    });

    assert_eq!(recv(&rx), (Err(Errno::NoSys), -38));
    h.settle();
}

#[test]
fn getpid_is_returned_in_rax() {
    let h = Harness::new();
    let (tx, rx) = mpsc::channel();
    let root = h.run("caller", move |ctx| {
        tx.send(ctx.syscall(SyscallNumber::Getpid as u64, [0; 4])).unwrap();
        0
    });

    assert_eq!(recv(&rx), Ok(root.as_u32() as u64));
    h.settle();
}

#[test]
fn bad_status_pointer_faults_without_consuming_the_child() {
    let h = Harness::new();
    let (tx, rx) = mpsc::channel();
    h.run("parent", move |ctx| {
        let child = ctx.fork(|_| 6).unwrap();
        let wait = |ctx: &mut kernel::UserContext, addr: u64| {
            ctx.syscall(SyscallNumber::Waitpid as u64, [child.as_u32() as u64, addr, 0, 0])
        };
        let unaligned = wait(&mut *ctx, DATA_BASE + 3);
        let unmapped = wait(&mut *ctx, 0x40);
        let stored = wait(&mut *ctx, DATA_BASE);
        let raw = ctx.load(DATA_BASE).unwrap() as u32 as i32;
        tx.send((unaligned, unmapped, stored, ExitStatus::from_raw(raw).code()))
            .unwrap();
        0
    });

    let (unaligned, unmapped, stored, code) = recv(&rx);
    assert_eq!(unaligned, Err(Errno::Fault));
    assert_eq!(unmapped, Err(Errno::Fault));
    assert!(stored.is_ok());
    assert_eq!(code, Some(6));
    h.settle();
}

#[test]
fn null_status_pointer_reaps_without_storing() {
    let h = Harness::new();
    let (tx, rx) = mpsc::channel();
    h.run("parent", move |ctx| {
        let child = ctx.fork(|_| 1).unwrap();
        let reaped = ctx.waitpid_into(child, 0, 0);
        let again = ctx.waitpid_into(child, 0, 0);
        tx.send((child, reaped, again)).unwrap();
        0
    });

    let (child, reaped, again) = recv(&rx);
    assert_eq!(reaped, Ok(child));
    assert_eq!(again, Err(Errno::NotChild));
    h.settle();
}

#[test]
fn out_of_range_identities_are_not_children() {
    let h = Harness::new();
    let (tx, rx) = mpsc::channel();
    h.run("parent", move |ctx| {
        let negative = ctx.syscall(SyscallNumber::Waitpid as u64, [(-1i64) as u64, 0, 0, 0]);
        let bad_flags = ctx.syscall(SyscallNumber::Waitpid as u64, [2, 0, 1 << 40, 0]);
        let zero = ctx.waitpid_into(ProcessId::new(0), 0, 0);
        tx.send((negative, bad_flags, zero)).unwrap();
        0
    });

    assert_eq!(
        recv(&rx),
        (Err(Errno::NotChild), Err(Errno::InvalidArgument), Err(Errno::NotChild))
    );
    h.settle();
}

#[test]
fn exit_is_logged_with_its_status() {
    let h = Harness::new();
    let (tx, rx) = mpsc::channel();
    h.run("parent", move |ctx| {
        tx.send(ctx.getpid()).unwrap();
        0
    });

    let root = recv(&rx);
    h.settle();
    let lines = kernel::logger::captured();
    assert!(lines
        .iter()
        .any(|line| line.contains(&format!("process {} 'parent' exited: exited(0)", root))));
}
