//! The kernel object
use core::{
    fmt,
    marker::PhantomPinned,
    sync::atomic::{AtomicBool, Ordering},
};

use crate::{
    cfg::{
        MAX_COMPLETIONS, MAX_EVENT_GROUPS, MAX_MAILBOXES, MAX_MSG_QUEUES, MAX_MUTEXES,
        MAX_SEMAPHORES, MAX_THREADS, MAX_TIMERS,
    },
    completion::CompletionCb,
    error::KernelError,
    event_group::EventGroupCb,
    klock::{self, CpuLockCell, CpuLockGuard},
    mailbox::MailboxCb,
    msg_queue::MsgQueueCb,
    mutex::MutexCb,
    port::{ExitRoutine, Port, PortExclusive},
    semaphore::SemaphoreCb,
    thread::{readyqueue::ReadyQueue, ThreadCb},
    timer::TimerCb,
    utils::{intrusive_list::ListHead, pool::Pool},
};

/// A kernel instance running on the port `P`.
///
/// All mutable state is held in a single cell that can only be accessed while
/// CPU Lock is active. Independent instances share nothing, so a test can
/// build as many as it needs.
///
/// Once [`Kernel::start`] is called, the kernel must stay in place because
/// the port holds raw pointers into it; `start` therefore takes
/// `Pin<&Self>`.
pub struct Kernel<P: Port> {
    pub(crate) port: P,
    pub(crate) exit_routine: ExitRoutine,
    cpu_lock_active: AtomicBool,
    state: CpuLockCell<P, State<P>>,
    _pin: PhantomPinned,
}

// Safety: `state` is only reached through a `CpuLockGuard`, which is created
//         after `disable_interrupts` returns. `PortExclusive` guarantees that
//         this happens on one thread of execution at a time, so no two
//         threads access `state` at the same time. `cpu_lock_active` is
//         atomic because `is_cpu_lock_active` reads it without the lock.
unsafe impl<P: Port + PortExclusive + Sync> Sync for Kernel<P> {}

/// The mutable part of [`Kernel`].
pub(crate) struct State<P: Port> {
    /// The number of ticks since boot.
    pub(crate) tick: u32,
    /// The number of ticks during which the idle thread was running.
    pub(crate) idle_tick: u32,
    /// The slot index of the running thread. `None` until the kernel starts.
    pub(crate) current: Option<usize>,
    pub(crate) idle: Option<usize>,
    pub(crate) ready: ReadyQueue,
    pub(crate) threads: Pool<ThreadCb, MAX_THREADS>,
    /// Exited threads awaiting reclamation.
    pub(crate) defunct: ListHead,
    pub(crate) timers: Pool<TimerCb<P>, MAX_TIMERS>,
    /// Active timers, sorted by deadline.
    pub(crate) timer_list: ListHead,
    pub(crate) mutexes: Pool<MutexCb, MAX_MUTEXES>,
    pub(crate) semaphores: Pool<SemaphoreCb, MAX_SEMAPHORES>,
    pub(crate) event_groups: Pool<EventGroupCb, MAX_EVENT_GROUPS>,
    pub(crate) mailboxes: Pool<MailboxCb, MAX_MAILBOXES>,
    pub(crate) msg_queues: Pool<MsgQueueCb, MAX_MSG_QUEUES>,
    pub(crate) completions: Pool<CompletionCb, MAX_COMPLETIONS>,
}

impl<P: Port> State<P> {
    fn new() -> Self {
        Self {
            tick: 0,
            idle_tick: 0,
            current: None,
            idle: None,
            ready: ReadyQueue::new(),
            threads: Pool::new(),
            defunct: ListHead::new(),
            timers: Pool::new(),
            timer_list: ListHead::new(),
            mutexes: Pool::new(),
            semaphores: Pool::new(),
            event_groups: Pool::new(),
            mailboxes: Pool::new(),
            msg_queues: Pool::new(),
            completions: Pool::new(),
        }
    }
}

impl<P: Port> Kernel<P> {
    /// Construct a kernel on `port`. `exit_routine` is what a thread falls
    /// through to when its entry point returns; it is expected to call
    /// [`Kernel::thread_exit`].
    pub fn new(port: P, exit_routine: ExitRoutine) -> Self {
        Self {
            port,
            exit_routine,
            cpu_lock_active: AtomicBool::new(false),
            state: CpuLockCell::new(State::new()),
            _pin: PhantomPinned,
        }
    }

    /// Get a reference to the port.
    pub fn port(&self) -> &P {
        &self.port
    }

    /// Check whether CPU Lock is held.
    pub fn is_cpu_lock_active(&self) -> bool {
        self.cpu_lock_active.load(Ordering::Relaxed)
    }

    pub(crate) fn lock_cpu(&self) -> Result<CpuLockGuard<'_, P>, KernelError> {
        klock::lock_cpu(&self.port, &self.cpu_lock_active)
    }

    /// Borrow the kernel state through a CPU Lock guard.
    pub(crate) fn state<'a>(&'a self, lock: &'a mut CpuLockGuard<'_, P>) -> &'a mut State<P> {
        self.state.write(&mut **lock)
    }
}

impl<P: Port> fmt::Debug for Kernel<P> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Kernel")
            .field("cpu_lock_active", &self.is_cpu_lock_active())
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
