//! Event groups
use sk_kernel::{cfg, EventOption, KernelError, QueuePolicy, ThreadState};

use crate::{current, spawn, state, ticks};

#[test]
fn and_waits_for_every_bit() {
    kernel!(k);
    let a = spawn(&k, "a", 10);
    let ev = k.event_init("ev", QueuePolicy::Fifo).unwrap();
    k.start().unwrap();

    assert_eq!(
        k.event_recv(ev, 0b11, EventOption::AND, cfg::WAIT_FOREVER),
        Err(KernelError::Suspended)
    );

    k.event_send(ev, 0b01).unwrap();
    assert_eq!(state(&k, a), ThreadState::Suspended);
    assert_eq!(k.event_value(ev).unwrap(), 0b01);

    k.event_send(ev, 0b10).unwrap();
    assert_eq!(current(&k), a);
    assert_eq!(k.take_wait_result(a), Some(Ok(())));
    assert_eq!(k.thread_event_received(a).unwrap(), 0b11);
    // Without CLEAR the bits stay set
    assert_eq!(k.event_value(ev).unwrap(), 0b11);
}

#[test]
fn or_with_clear_consumes_only_matched_bits() {
    kernel!(k);
    let a = spawn(&k, "a", 10);
    let ev = k.event_init("ev", QueuePolicy::Fifo).unwrap();
    k.start().unwrap();

    // Already satisfied
    k.event_send(ev, 0b0100).unwrap();
    assert_eq!(
        k.event_recv(ev, 0b0110, EventOption::OR | EventOption::CLEAR, 0),
        Ok(0b0100)
    );
    assert_eq!(k.event_value(ev).unwrap(), 0);

    // Satisfied later
    k.event_recv(ev, 0b1010, EventOption::OR | EventOption::CLEAR, cfg::WAIT_FOREVER)
        .unwrap_err();
    k.event_send(ev, 0b1001).unwrap();
    assert_eq!(current(&k), a);
    assert_eq!(k.thread_event_received(a).unwrap(), 0b1000);
    assert_eq!(k.event_value(ev).unwrap(), 0b0001);
}

#[test]
fn and_with_clear() {
    kernel!(k);
    spawn(&k, "a", 10);
    let ev = k.event_init("ev", QueuePolicy::Fifo).unwrap();
    k.start().unwrap();

    k.event_send(ev, 0b111).unwrap();
    assert_eq!(
        k.event_recv(ev, 0b101, EventOption::AND | EventOption::CLEAR, 0),
        Ok(0b101)
    );
    assert_eq!(k.event_value(ev).unwrap(), 0b010);
    assert_eq!(
        k.event_recv(ev, 0b011, EventOption::AND, 0),
        Err(KernelError::Timeout)
    );
}

#[test]
fn only_the_head_waiter_is_examined() {
    kernel!(k);
    let a = spawn(&k, "a", 10);
    let b = spawn(&k, "b", 12);
    let ev = k.event_init("ev", QueuePolicy::Fifo).unwrap();
    k.start().unwrap();

    k.event_recv(ev, 0b011, EventOption::AND, cfg::WAIT_FOREVER)
        .unwrap_err();
    assert_eq!(current(&k), b);
    k.event_recv(ev, 0b100, EventOption::OR, cfg::WAIT_FOREVER)
        .unwrap_err();

    // Satisfies `b`, but `a` is at the head
    k.event_send(ev, 0b100).unwrap();
    assert_eq!(state(&k, b), ThreadState::Suspended);

    k.event_send(ev, 0b011).unwrap();
    assert_eq!(current(&k), a);
    assert_eq!(state(&k, b), ThreadState::Suspended);

    // `b` is examined at the next send
    k.event_send(ev, 0b1000).unwrap();
    assert_eq!(state(&k, b), ThreadState::Ready);
    assert_eq!(k.thread_event_received(b).unwrap(), 0b100);
}

#[test]
fn timeout() {
    kernel!(k);
    let a = spawn(&k, "a", 10);
    let ev = k.event_init("ev", QueuePolicy::Priority).unwrap();
    k.start().unwrap();

    assert_eq!(
        k.event_recv(ev, 1, EventOption::OR, 0),
        Err(KernelError::Timeout)
    );
    k.event_recv(ev, 1, EventOption::OR, 4).unwrap_err();
    ticks(&k, 4);
    assert_eq!(current(&k), a);
    assert_eq!(k.take_wait_result(a), Some(Err(KernelError::Timeout)));
    assert_eq!(k.thread_event_received(a).unwrap(), 0);
}

#[test]
fn invalid_requests() {
    kernel!(k);
    spawn(&k, "a", 10);
    let ev = k.event_init("ev", QueuePolicy::Fifo).unwrap();
    k.start().unwrap();

    assert_eq!(k.event_send(ev, 0), Err(KernelError::Error));
    assert_eq!(
        k.event_recv(ev, 0, EventOption::OR, 0),
        Err(KernelError::Error)
    );
    assert_eq!(
        k.event_recv(ev, 1, EventOption::CLEAR, 0),
        Err(KernelError::InvalidArgument)
    );
}

#[test]
fn destroy_releases_waiters_with_error() {
    kernel!(k);
    let a = spawn(&k, "a", 10);
    let ev = k.event_init("ev", QueuePolicy::Fifo).unwrap();
    k.start().unwrap();

    k.event_recv(ev, 1, EventOption::AND, cfg::WAIT_FOREVER)
        .unwrap_err();
    k.event_destroy(ev).unwrap();
    assert_eq!(current(&k), a);
    assert_eq!(k.take_wait_result(a), Some(Err(KernelError::Error)));
    assert_eq!(k.event_value(ev), Err(KernelError::InvalidArgument));
}
