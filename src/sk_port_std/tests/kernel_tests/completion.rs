//! Completions
use sk_kernel::{cfg, KernelError, ThreadState};

use crate::{current, spawn, state, ticks};

#[test]
fn done_releases_every_waiter() {
    kernel!(k);
    let a = spawn(&k, "a", 5);
    let b = spawn(&k, "b", 6);
    let c = k.completion_init().unwrap();
    k.start().unwrap();

    assert_eq!(
        k.completion_wait(c, cfg::WAIT_FOREVER),
        Err(KernelError::Suspended)
    );
    assert_eq!(current(&k), b);
    k.completion_wait(c, cfg::WAIT_FOREVER).unwrap_err();
    assert!(!k.completion_is_done(c).unwrap());

    let signaller = spawn(&k, "sig", 20);
    assert_eq!(current(&k), signaller);
    k.completion_done(c).unwrap();

    assert_eq!(current(&k), a);
    assert_eq!(state(&k, b), ThreadState::Ready);
    assert_eq!(k.take_wait_result(a), Some(Ok(())));
    assert_eq!(k.take_wait_result(b), Some(Ok(())));
    assert!(k.completion_is_done(c).unwrap());
}

#[test]
fn wait_after_done_returns_at_once() {
    kernel!(k);
    let a = spawn(&k, "a", 10);
    let c = k.completion_init().unwrap();
    k.start().unwrap();

    k.completion_done(c).unwrap();
    assert_eq!(k.completion_wait(c, 0), Ok(()));
    assert_eq!(k.completion_wait(c, cfg::WAIT_FOREVER), Ok(()));
    assert_eq!(current(&k), a);
}

#[test]
fn timeouts() {
    kernel!(k);
    let a = spawn(&k, "a", 10);
    let c = k.completion_init().unwrap();
    k.start().unwrap();

    assert_eq!(k.completion_wait(c, 0), Err(KernelError::Timeout));
    assert_eq!(current(&k), a);

    k.completion_wait(c, 3).unwrap_err();
    ticks(&k, 2);
    assert_eq!(state(&k, a), ThreadState::Suspended);
    ticks(&k, 1);
    assert_eq!(current(&k), a);
    assert_eq!(k.take_wait_result(a), Some(Err(KernelError::Timeout)));
    assert!(!k.completion_is_done(c).unwrap());
}

#[test]
fn delete_releases_waiters_with_error() {
    kernel!(k);
    let a = spawn(&k, "a", 10);
    let c = k.completion_init().unwrap();
    k.start().unwrap();

    k.completion_wait(c, cfg::WAIT_FOREVER).unwrap_err();
    k.completion_delete(c).unwrap();
    assert_eq!(current(&k), a);
    assert_eq!(k.take_wait_result(a), Some(Err(KernelError::Error)));
    assert_eq!(k.completion_done(c), Err(KernelError::InvalidArgument));
}
