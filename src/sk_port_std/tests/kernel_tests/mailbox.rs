//! Mailboxes
use sk_kernel::{cfg, KernelError, QueuePolicy, ThreadState};

use crate::{current, spawn, state, ticks};

#[test]
fn fifo_until_full() {
    kernel!(k);
    spawn(&k, "a", 10);
    let mb = k.mailbox_init("mb", 3, QueuePolicy::Fifo).unwrap();
    k.start().unwrap();

    for v in 1..=3 {
        k.mailbox_send(mb, v).unwrap();
    }
    assert_eq!(k.mailbox_send(mb, 4), Err(KernelError::Full));
    assert_eq!(k.mailbox_entry(mb).unwrap(), 3);

    assert_eq!(k.mailbox_recv(mb, 0), Ok(1));
    k.mailbox_send(mb, 4).unwrap();
    for v in 2..=4 {
        assert_eq!(k.mailbox_recv(mb, 0), Ok(v));
    }
    assert_eq!(k.mailbox_recv(mb, 0), Err(KernelError::Timeout));
}

#[test]
fn send_wakes_blocked_receiver() {
    kernel!(k);
    let rx = spawn(&k, "rx", 5);
    let mb = k.mailbox_init("mb", 2, QueuePolicy::Fifo).unwrap();
    k.start().unwrap();

    assert_eq!(
        k.mailbox_recv(mb, cfg::WAIT_FOREVER),
        Err(KernelError::Suspended)
    );
    let tx = spawn(&k, "tx", 10);
    assert_eq!(current(&k), tx);

    k.mailbox_send(mb, 0xabcd).unwrap();
    assert_eq!(current(&k), rx);
    assert_eq!(k.take_wait_result(rx), Some(Ok(())));
    // The woken receiver takes the message on its second look
    assert_eq!(k.mailbox_recv(mb, cfg::WAIT_FOREVER), Ok(0xabcd));
    assert_eq!(k.mailbox_entry(mb).unwrap(), 0);
}

#[test]
fn recv_wakes_blocked_sender() {
    kernel!(k);
    let tx = spawn(&k, "tx", 5);
    let mb = k.mailbox_init("mb", 1, QueuePolicy::Priority).unwrap();
    k.start().unwrap();

    k.mailbox_send(mb, 1).unwrap();
    assert_eq!(
        k.mailbox_send_wait(mb, 2, cfg::WAIT_FOREVER),
        Err(KernelError::Suspended)
    );

    let rx = spawn(&k, "rx", 10);
    assert_eq!(current(&k), rx);
    assert_eq!(k.mailbox_recv(mb, 0), Ok(1));
    assert_eq!(current(&k), tx);
    assert_eq!(k.take_wait_result(tx), Some(Ok(())));

    k.mailbox_send_wait(mb, 2, cfg::WAIT_FOREVER).unwrap();
    assert_eq!(k.mailbox_entry(mb).unwrap(), 1);
}

#[test]
fn timed_waits_expire() {
    kernel!(k);
    let a = spawn(&k, "a", 10);
    let mb = k.mailbox_init("mb", 1, QueuePolicy::Fifo).unwrap();
    k.start().unwrap();

    k.mailbox_recv(mb, 3).unwrap_err();
    ticks(&k, 3);
    assert_eq!(current(&k), a);
    assert_eq!(k.take_wait_result(a), Some(Err(KernelError::Timeout)));

    k.mailbox_send(mb, 7).unwrap();
    assert_eq!(
        k.mailbox_send_wait(mb, 8, 2),
        Err(KernelError::Suspended)
    );
    ticks(&k, 2);
    assert_eq!(current(&k), a);
    // The wait timed out. `mailbox_send_wait` turns that into `Full` when
    // the sender resumes.
    assert_eq!(k.take_wait_result(a), Some(Err(KernelError::Timeout)));
    assert_eq!(k.mailbox_entry(mb).unwrap(), 1);
    assert_eq!(k.mailbox_recv(mb, 0), Ok(7));
}

#[test]
fn init_rejects_zero_size_and_reports_exhaustion() {
    kernel!(k);
    assert_eq!(
        k.mailbox_init("mb", 0, QueuePolicy::Fifo),
        Err(KernelError::InvalidArgument)
    );

    let port = k.port();
    port.set_heap_limit(Some(port.heap_in_use()));
    assert_eq!(
        k.mailbox_init("mb", 4, QueuePolicy::Fifo),
        Err(KernelError::NoMemory)
    );
}

#[test]
fn delete_releases_both_sides() {
    kernel!(k);
    let rx = spawn(&k, "rx", 5);
    let tx = spawn(&k, "tx", 6);
    let baseline = k.port().live_allocations();
    let empty = k.mailbox_init("empty", 1, QueuePolicy::Fifo).unwrap();
    let full = k.mailbox_init("full", 1, QueuePolicy::Fifo).unwrap();
    k.start().unwrap();

    k.mailbox_recv(empty, cfg::WAIT_FOREVER).unwrap_err();
    assert_eq!(current(&k), tx);
    k.mailbox_send(full, 1).unwrap();
    k.mailbox_send_wait(full, 2, cfg::WAIT_FOREVER).unwrap_err();

    k.mailbox_delete(empty).unwrap();
    assert_eq!(current(&k), rx);
    assert_eq!(k.take_wait_result(rx), Some(Err(KernelError::Error)));

    k.mailbox_delete(full).unwrap();
    assert_eq!(state(&k, tx), ThreadState::Ready);
    assert_eq!(k.take_wait_result(tx), Some(Err(KernelError::Error)));

    assert_eq!(k.mailbox_entry(full), Err(KernelError::InvalidArgument));
    // Only the idle thread's stack remains on top of the baseline
    assert_eq!(k.port().live_allocations(), baseline + 1);
}
