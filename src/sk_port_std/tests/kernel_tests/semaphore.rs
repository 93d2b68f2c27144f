//! Counting semaphores
use quickcheck_macros::quickcheck;
use sk_kernel::{cfg, Kernel, KernelError, QueuePolicy, ThreadState};
use sk_port_std::SimPort;

use crate::{current, spawn, state, ticks};

#[test]
fn permits_then_priority_ordered_wakeup() {
    kernel!(k);
    let p1 = spawn(&k, "p1", 5);
    let p2 = spawn(&k, "p2", 6);
    let p3 = spawn(&k, "p3", 7);
    let late = spawn(&k, "late", 9);
    let sem = k.sem_init("s", 2, QueuePolicy::Priority).unwrap();
    k.start().unwrap();

    // `p1` and `p2` take the two permits and step aside
    for &p in &[p1, p2] {
        assert_eq!(current(&k), p);
        k.sem_wait(sem, cfg::WAIT_FOREVER).unwrap();
        k.thread_sleep(1000).unwrap_err();
    }
    assert_eq!(k.sem_value(sem).unwrap(), 0);

    // `p3` sleeps briefly so that the less urgent `late` blocks first
    assert_eq!(current(&k), p3);
    k.thread_sleep(5).unwrap_err();
    assert_eq!(current(&k), late);
    k.sem_wait(sem, cfg::WAIT_FOREVER).unwrap_err();
    ticks(&k, 5);
    assert_eq!(current(&k), p3);
    k.sem_wait(sem, cfg::WAIT_FOREVER).unwrap_err();
    assert_eq!(k.sem_waiter_count(sem).unwrap(), 2);

    // Wake-up follows priority, not arrival
    k.sem_post(sem).unwrap();
    assert_eq!(current(&k), p3);
    assert_eq!(k.take_wait_result(p3), Some(Ok(())));
    assert_eq!(state(&k, late), ThreadState::Suspended);
    assert_eq!(k.sem_value(sem).unwrap(), 0);

    k.thread_sleep(1000).unwrap_err();
    k.sem_post(sem).unwrap();
    assert_eq!(current(&k), late);
    assert_eq!(k.take_wait_result(late), Some(Ok(())));

    k.sem_post(sem).unwrap();
    assert_eq!(k.sem_value(sem).unwrap(), 1);
}

#[test]
fn fifo_policy_wakes_in_arrival_order() {
    kernel!(k);
    let low = spawn(&k, "low", 9);
    let high = spawn(&k, "high", 5);
    let sem = k.sem_init("s", 0, QueuePolicy::Fifo).unwrap();
    k.start().unwrap();

    // `high` waits for `low` to block first
    assert_eq!(current(&k), high);
    k.thread_sleep(1).unwrap_err();
    k.sem_wait(sem, cfg::WAIT_FOREVER).unwrap_err();
    ticks(&k, 1);
    assert_eq!(current(&k), high);
    k.sem_wait(sem, cfg::WAIT_FOREVER).unwrap_err();

    k.sem_post(sem).unwrap();
    assert_eq!(current(&k), low);
    assert_eq!(state(&k, high), ThreadState::Suspended);
}

#[test]
fn trywait_and_timeout() {
    kernel!(k);
    let a = spawn(&k, "a", 10);
    let sem = k.sem_init("s", 0, QueuePolicy::Fifo).unwrap();
    k.start().unwrap();

    assert_eq!(k.sem_trywait(sem), Err(KernelError::Timeout));
    assert_eq!(current(&k), a);

    k.sem_wait(sem, 3).unwrap_err();
    ticks(&k, 3);
    assert_eq!(current(&k), a);
    assert_eq!(k.take_wait_result(a), Some(Err(KernelError::Timeout)));
    assert_eq!(k.sem_waiter_count(sem).unwrap(), 0);
}

#[test]
fn post_at_maximum_is_full() {
    kernel!(k);
    let sem = k
        .sem_init("s", cfg::SEM_VALUE_MAX, QueuePolicy::Fifo)
        .unwrap();
    assert_eq!(k.sem_post(sem), Err(KernelError::Full));
    assert_eq!(k.sem_value(sem).unwrap(), cfg::SEM_VALUE_MAX);
}

#[test]
fn destroy_releases_waiters_with_error() {
    kernel!(k);
    let a = spawn(&k, "a", 10);
    let sem = k.sem_init("s", 0, QueuePolicy::Fifo).unwrap();
    k.start().unwrap();

    k.sem_wait(sem, cfg::WAIT_FOREVER).unwrap_err();
    k.sem_destroy(sem).unwrap();
    assert_eq!(current(&k), a);
    assert_eq!(k.take_wait_result(a), Some(Err(KernelError::Error)));
    assert_eq!(k.sem_post(sem), Err(KernelError::InvalidArgument));
}

/// `value - waiters` moves by exactly one per post and per wait.
#[quickcheck]
fn conservation(initial: u8, ops: Vec<bool>) -> bool {
    kernel!(k);
    for i in 0..6 {
        spawn(&k, &format!("t{i}"), 10);
    }
    let sem = k.sem_init("s", initial as u16, QueuePolicy::Fifo).unwrap();
    k.start().unwrap();
    let idle = k.idle_thread().unwrap();

    let balance = |k: &Kernel<SimPort>| {
        k.sem_value(sem).unwrap() as i64 - k.sem_waiter_count(sem).unwrap() as i64
    };
    let mut expected = initial as i64;

    for post in ops {
        if post {
            k.sem_post(sem).unwrap();
            expected += 1;
        } else if current(&k) != idle {
            match k.sem_wait(sem, cfg::WAIT_FOREVER) {
                Ok(()) | Err(KernelError::Suspended) => {}
                Err(e) => panic!("unexpected {e:?}"),
            }
            expected -= 1;
        }
        if balance(&k) != expected {
            return false;
        }
    }
    true
}
