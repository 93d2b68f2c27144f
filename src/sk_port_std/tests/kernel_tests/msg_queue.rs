//! Message queues
use sk_kernel::{cfg, KernelError, QueuePolicy, ThreadState};

use crate::{current, spawn, state, ticks};

#[test]
fn variable_length_messages() {
    kernel!(k);
    spawn(&k, "a", 10);
    let mq = k.msgqueue_init("mq", 8, 2, QueuePolicy::Fifo).unwrap();
    k.start().unwrap();

    assert_eq!(k.msgqueue_send(mq, &[0; 9]), Err(KernelError::Error));
    k.msgqueue_send(mq, b"hi").unwrap();
    k.msgqueue_send(mq, b"12345678").unwrap();
    assert_eq!(k.msgqueue_send(mq, b"x"), Err(KernelError::Full));
    assert_eq!(k.msgqueue_entry(mq).unwrap(), 2);

    let mut buf = [0u8; 8];
    assert_eq!(k.msgqueue_recv(mq, &mut buf, 0), Ok(2));
    assert_eq!(&buf[..2], b"hi");

    // A short buffer receives a prefix and the rest is dropped
    let mut short = [0u8; 4];
    assert_eq!(k.msgqueue_recv(mq, &mut short, 0), Ok(4));
    assert_eq!(&short, b"1234");
    assert_eq!(k.msgqueue_entry(mq).unwrap(), 0);
    assert_eq!(
        k.msgqueue_recv(mq, &mut buf, 0),
        Err(KernelError::Timeout)
    );
}

#[test]
fn nodes_are_reused() {
    kernel!(k);
    spawn(&k, "a", 10);
    let mq = k.msgqueue_init("mq", 4, 2, QueuePolicy::Fifo).unwrap();
    k.start().unwrap();

    let mut buf = [0u8; 4];
    for round in 0u8..10 {
        k.msgqueue_send(mq, &[round]).unwrap();
        k.msgqueue_send(mq, &[round, round]).unwrap();
        assert_eq!(k.msgqueue_recv(mq, &mut buf, 0), Ok(1));
        assert_eq!(buf[0], round);
        assert_eq!(k.msgqueue_recv(mq, &mut buf, 0), Ok(2));
        assert_eq!(buf[..2], [round, round]);
    }
    assert_eq!(k.msgqueue_entry(mq).unwrap(), 0);
}

#[test]
fn send_wakes_blocked_receiver() {
    kernel!(k);
    let rx = spawn(&k, "rx", 5);
    let mq = k.msgqueue_init("mq", 16, 4, QueuePolicy::Priority).unwrap();
    k.start().unwrap();

    let mut buf = [0u8; 16];
    assert_eq!(
        k.msgqueue_recv(mq, &mut buf, cfg::WAIT_FOREVER),
        Err(KernelError::Suspended)
    );
    let tx = spawn(&k, "tx", 10);
    assert_eq!(current(&k), tx);

    k.msgqueue_send(mq, b"ping").unwrap();
    assert_eq!(current(&k), rx);
    assert_eq!(k.take_wait_result(rx), Some(Ok(())));
    assert_eq!(k.msgqueue_recv(mq, &mut buf, cfg::WAIT_FOREVER), Ok(4));
    assert_eq!(&buf[..4], b"ping");
}

#[test]
fn recv_wakes_blocked_sender() {
    kernel!(k);
    let tx = spawn(&k, "tx", 5);
    let mq = k.msgqueue_init("mq", 4, 1, QueuePolicy::Fifo).unwrap();
    k.start().unwrap();

    k.msgqueue_send(mq, b"one").unwrap();
    assert_eq!(
        k.msgqueue_send_wait(mq, b"two", cfg::WAIT_FOREVER),
        Err(KernelError::Suspended)
    );

    let rx = spawn(&k, "rx", 10);
    assert_eq!(current(&k), rx);
    let mut buf = [0u8; 4];
    assert_eq!(k.msgqueue_recv(mq, &mut buf, 0), Ok(3));
    assert_eq!(current(&k), tx);
    assert_eq!(k.take_wait_result(tx), Some(Ok(())));

    k.msgqueue_send_wait(mq, b"two", cfg::WAIT_FOREVER).unwrap();
    assert_eq!(k.msgqueue_entry(mq).unwrap(), 1);
}

#[test]
fn timed_recv_expires() {
    kernel!(k);
    let a = spawn(&k, "a", 10);
    let mq = k.msgqueue_init("mq", 4, 1, QueuePolicy::Fifo).unwrap();
    k.start().unwrap();

    let mut buf = [0u8; 4];
    k.msgqueue_recv(mq, &mut buf, 5).unwrap_err();
    ticks(&k, 4);
    assert_eq!(state(&k, a), ThreadState::Suspended);
    ticks(&k, 1);
    assert_eq!(current(&k), a);
    assert_eq!(k.take_wait_result(a), Some(Err(KernelError::Timeout)));
}

#[test]
fn init_rejects_bad_geometry_and_reports_exhaustion() {
    kernel!(k);
    assert_eq!(
        k.msgqueue_init("mq", 0, 4, QueuePolicy::Fifo),
        Err(KernelError::InvalidArgument)
    );
    assert_eq!(
        k.msgqueue_init("mq", 4, 0, QueuePolicy::Fifo),
        Err(KernelError::InvalidArgument)
    );

    let port = k.port();
    port.set_heap_limit(Some(port.heap_in_use()));
    assert_eq!(
        k.msgqueue_init("mq", 4, 4, QueuePolicy::Fifo),
        Err(KernelError::NoMemory)
    );
    assert_eq!(port.live_allocations(), 0);
}

#[test]
fn delete_releases_waiters_and_pool() {
    kernel!(k);
    let a = spawn(&k, "a", 10);
    let baseline = k.port().live_allocations();
    let mq = k.msgqueue_init("mq", 4, 1, QueuePolicy::Fifo).unwrap();
    k.start().unwrap();

    let mut buf = [0u8; 4];
    k.msgqueue_recv(mq, &mut buf, cfg::WAIT_FOREVER).unwrap_err();
    k.msgqueue_delete(mq).unwrap();
    assert_eq!(current(&k), a);
    assert_eq!(k.take_wait_result(a), Some(Err(KernelError::Error)));
    assert_eq!(k.msgqueue_send(mq, b"x"), Err(KernelError::InvalidArgument));
    assert_eq!(k.port().live_allocations(), baseline + 1);
}
