//! Semaphores, mutexes, event groups and completions
use sk_kernel::{
    cfg, CompletionId, EventGroupId, EventOption, KernelError, MutexId, QueuePolicy, SemaphoreId,
    ThreadId, ThreadState,
};
use sk_port_std::host::current_kernel;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Mutex,
};

use crate::{run, spawn, STACK_SIZE};

#[test]
fn semaphore_wait_returns_after_post_or_timeout() {
    fn waiter(arg: usize) {
        let k = current_kernel();
        let sem = SemaphoreId::from_usize(arg);
        assert_eq!(k.sem_wait(sem, cfg::WAIT_FOREVER), Ok(()));
        assert_eq!(k.sem_value(sem).unwrap(), 0);

        let start = k.tick_get().unwrap();
        assert_eq!(k.sem_wait(sem, 4), Err(KernelError::Timeout));
        assert_eq!(k.tick_get().unwrap() - start, 4);
        k.port().shutdown();
    }
    fn poster(arg: usize) {
        let k = current_kernel();
        k.sem_post(SemaphoreId::from_usize(arg)).unwrap();
    }

    run(|k| {
        let sem = k.sem_init("s", 0, QueuePolicy::Fifo).unwrap();
        spawn(k, "waiter", waiter, sem.to_usize(), 5);
        spawn(k, "poster", poster, sem.to_usize(), 10);
    });
}

#[test]
fn mutex_is_handed_to_the_blocked_thread() {
    static HIGH: AtomicUsize = AtomicUsize::new(0);
    fn low(arg: usize) {
        let k = current_kernel();
        let m = MutexId::from_usize(arg);
        k.mutex_lock(m, cfg::WAIT_FOREVER).unwrap();

        let high = ThreadId::from_usize(HIGH.load(Ordering::Relaxed));
        k.thread_startup(high).unwrap();
        // `high` ran and blocked on the mutex
        assert_eq!(k.thread_state(high).unwrap(), ThreadState::Suspended);
        assert_eq!(k.mutex_waiter_count(m).unwrap(), 1);

        k.mutex_unlock(m).unwrap();
        unreachable!("the new owner preempts the old one");
    }
    fn high(arg: usize) {
        let k = current_kernel();
        let m = MutexId::from_usize(arg);
        assert_eq!(k.mutex_lock(m, cfg::WAIT_FOREVER), Ok(()));
        assert_eq!(k.mutex_owner(m).unwrap(), k.current_thread());
        assert_eq!(k.mutex_hold(m).unwrap(), 1);
        k.mutex_unlock(m).unwrap();
        k.port().shutdown();
    }

    run(|k| {
        let m = k.mutex_init("m").unwrap();
        spawn(k, "low", low, m.to_usize(), 10);
        let high = k
            .thread_create("high", high, m.to_usize(), STACK_SIZE, 5, 10)
            .unwrap();
        HIGH.store(high.to_usize(), Ordering::Relaxed);
    });
}

#[test]
fn mutex_wait_times_out() {
    fn owner(arg: usize) {
        let k = current_kernel();
        k.mutex_lock(MutexId::from_usize(arg), 0).unwrap();
        k.thread_sleep(100).unwrap();
    }
    fn waiter(arg: usize) {
        let k = current_kernel();
        let m = MutexId::from_usize(arg);
        assert_eq!(k.mutex_lock(m, 3), Err(KernelError::Timeout));
        assert_eq!(k.tick_get().unwrap(), 3);
        assert_ne!(k.mutex_owner(m).unwrap(), k.current_thread());
        k.port().shutdown();
    }

    run(|k| {
        let m = k.mutex_init("m").unwrap();
        spawn(k, "owner", owner, m.to_usize(), 5);
        spawn(k, "waiter", waiter, m.to_usize(), 10);
    });
}

#[test]
fn event_recv_returns_the_matched_bits_after_blocking() {
    fn waiter(arg: usize) {
        let k = current_kernel();
        let ev = EventGroupId::from_usize(arg);
        let matched = k.event_recv(
            ev,
            0b0110,
            EventOption::OR | EventOption::CLEAR,
            cfg::WAIT_FOREVER,
        );
        assert_eq!(matched, Ok(0b0100));
        assert_eq!(k.event_value(ev).unwrap(), 0b1000);
        let me = k.current_thread().unwrap();
        assert_eq!(k.thread_event_received(me).unwrap(), 0b0100);

        assert_eq!(
            k.event_recv(ev, 0b1001, EventOption::AND, 2),
            Err(KernelError::Timeout)
        );
        assert_eq!(k.event_value(ev).unwrap(), 0b1000);
        k.port().shutdown();
    }
    fn sender(arg: usize) {
        let k = current_kernel();
        k.event_send(EventGroupId::from_usize(arg), 0b1100).unwrap();
    }

    run(|k| {
        let ev = k.event_init("ev", QueuePolicy::Fifo).unwrap();
        spawn(k, "waiter", waiter, ev.to_usize(), 5);
        spawn(k, "sender", sender, ev.to_usize(), 10);
    });
}

#[test]
fn completion_releases_every_waiter() {
    static LOG: Mutex<Vec<&str>> = Mutex::new(Vec::new());
    fn a(arg: usize) {
        let k = current_kernel();
        let c = CompletionId::from_usize(arg);
        assert_eq!(k.completion_wait(c, cfg::WAIT_FOREVER), Ok(()));
        LOG.lock().unwrap().push("a");
    }
    fn b(arg: usize) {
        let k = current_kernel();
        let c = CompletionId::from_usize(arg);
        assert_eq!(k.completion_wait(c, cfg::WAIT_FOREVER), Ok(()));
        LOG.lock().unwrap().push("b");
    }
    fn signaller(arg: usize) {
        let k = current_kernel();
        let c = CompletionId::from_usize(arg);
        k.completion_done(c).unwrap();
        LOG.lock().unwrap().push("signaller");
        assert_eq!(k.completion_wait(c, 0), Ok(()));
        k.port().shutdown();
    }

    run(|k| {
        let c = k.completion_init().unwrap();
        spawn(k, "a", a, c.to_usize(), 5);
        spawn(k, "b", b, c.to_usize(), 6);
        spawn(k, "signaller", signaller, c.to_usize(), 10);
    });
    assert_eq!(*LOG.lock().unwrap(), ["a", "b", "signaller"]);
}

#[test]
fn completion_wait_times_out() {
    fn waiter(arg: usize) {
        let k = current_kernel();
        let c = CompletionId::from_usize(arg);
        assert_eq!(k.completion_wait(c, 2), Err(KernelError::Timeout));
        assert!(!k.completion_is_done(c).unwrap());
        k.port().shutdown();
    }

    run(|k| {
        let c = k.completion_init().unwrap();
        spawn(k, "waiter", waiter, c.to_usize(), 10);
    });
}
