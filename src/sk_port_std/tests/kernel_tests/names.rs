//! Object names
use sk_kernel::{cfg, Kernel, KernelError, QueuePolicy, TimerMode};
use sk_port_std::SimPort;

use crate::spawn;

fn cb(_: &Kernel<SimPort>, _: usize) {}

#[test]
fn every_object_keeps_its_name() {
    kernel!(k);
    let m = k.mutex_init("lock").unwrap();
    let s = k.sem_init("permits", 1, QueuePolicy::Fifo).unwrap();
    let e = k.event_init("flags", QueuePolicy::Fifo).unwrap();
    let mb = k.mailbox_init("inbox", 2, QueuePolicy::Fifo).unwrap();
    let mq = k.msgqueue_init("pipe", 4, 2, QueuePolicy::Fifo).unwrap();
    let t = k.timer_init("alarm", cb, 0, 5, TimerMode::OneShot).unwrap();

    assert_eq!(k.mutex_name(m).unwrap().as_str(), "lock");
    assert_eq!(k.sem_name(s).unwrap().as_str(), "permits");
    assert_eq!(k.event_name(e).unwrap().as_str(), "flags");
    assert_eq!(k.mailbox_name(mb).unwrap().as_str(), "inbox");
    assert_eq!(k.msgqueue_name(mq).unwrap().as_str(), "pipe");
    assert_eq!(k.timer_name(t).unwrap().as_str(), "alarm");

    k.mutex_delete(m).unwrap();
    assert_eq!(k.mutex_name(m), Err(KernelError::InvalidArgument));
    k.timer_delete(t).unwrap();
    assert_eq!(k.timer_name(t), Err(KernelError::InvalidArgument));
}

#[test]
fn names_are_truncated_and_shared_with_thread_timers() {
    kernel!(k);
    let long = "x".repeat(cfg::NAME_MAX + 4);
    let s = k.sem_init(&long, 0, QueuePolicy::Fifo).unwrap();
    assert_eq!(k.sem_name(s).unwrap().len(), cfg::NAME_MAX);

    let a = spawn(&k, "worker", 10);
    let timer = k.thread_timer(a).unwrap();
    assert_eq!(k.timer_name(timer).unwrap().as_str(), "worker");
}
