//! Wait lists shared by every blocking object
//!
//! A thread blocked on an object is linked onto one of the object's wait lists
//! through the same link field it uses for the ready queue, and its control
//! block records which list that is, so it can be unlinked in constant time
//! when it is woken by a timeout or a forced resume.
use num_traits::ToPrimitive;

use crate::{
    cfg::MAX_THREADS,
    error::KernelError,
    klock::CpuLockGuard,
    port::Port,
    state::{Kernel, State},
    thread::{ThreadCb, ThreadId, ThreadState},
    utils::{intrusive_list::ListHead, pool::Pool},
};

/// The order in which waiters are released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueuePolicy {
    /// First come, first served.
    #[default]
    Fifo,
    /// Most urgent priority first, FIFO among equal priorities.
    Priority,
}

/// Translate the outcome of a sender's wait for room. A sender that runs out
/// of time reports the object as still full.
pub(crate) fn send_wait_error(e: KernelError) -> KernelError {
    match e {
        KernelError::Timeout => KernelError::Full,
        e => e,
    }
}

/// Identifies the list a thread is linked onto, other than the ready queue.
/// The `usize` is the object's pool slot index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WaitQueue {
    Mutex(usize),
    Semaphore(usize),
    EventGroup(usize),
    MailboxSend(usize),
    MailboxRecv(usize),
    MsgQueueSend(usize),
    MsgQueueRecv(usize),
    Completion(usize),
    /// The list of exited threads awaiting reclamation.
    Defunct,
}

#[cold]
fn no_such_list(q: WaitQueue) -> ! {
    panic!("wait list {q:?} does not exist")
}

impl<P: Port> State<P> {
    /// Call `f` with the list identified by `q` and the thread pool.
    pub(crate) fn with_wait_list<R>(
        &mut self,
        q: WaitQueue,
        f: impl FnOnce(&mut ListHead, &mut Pool<ThreadCb, MAX_THREADS>) -> R,
    ) -> R {
        let head = match q {
            WaitQueue::Mutex(i) => self.mutexes.at_mut(i).map(|x| &mut x.wait),
            WaitQueue::Semaphore(i) => self.semaphores.at_mut(i).map(|x| &mut x.wait),
            WaitQueue::EventGroup(i) => self.event_groups.at_mut(i).map(|x| &mut x.wait),
            WaitQueue::MailboxSend(i) => self.mailboxes.at_mut(i).map(|x| &mut x.send_wait),
            WaitQueue::MailboxRecv(i) => self.mailboxes.at_mut(i).map(|x| &mut x.recv_wait),
            WaitQueue::MsgQueueSend(i) => self.msg_queues.at_mut(i).map(|x| &mut x.send_wait),
            WaitQueue::MsgQueueRecv(i) => self.msg_queues.at_mut(i).map(|x| &mut x.recv_wait),
            WaitQueue::Completion(i) => self.completions.at_mut(i).map(|x| &mut x.wait),
            WaitQueue::Defunct => Some(&mut self.defunct),
        };
        match head {
            Some(head) => f(head, &mut self.threads),
            None => no_such_list(q),
        }
    }

    /// Mark the thread `idx` Suspended and link it onto `q` according to
    /// `policy`. The thread must be Running or Ready.
    pub(crate) fn suspend_onto(&mut self, q: WaitQueue, idx: usize, policy: QueuePolicy) {
        let thread = self.thread_at_mut(idx);
        let was_ready = match thread.state {
            ThreadState::Running => false,
            ThreadState::Ready => true,
            state => panic!("thread {idx} cannot wait from state {state:?}"),
        };
        thread.state = ThreadState::Suspended;
        thread.wake = None;
        thread.queue = Some(q);
        let priority = thread.current_priority;

        if was_ready {
            // `queue` is only consulted for wait lists
            self.ready.remove(&mut self.threads, idx);
        }

        self.with_wait_list(q, |head, threads| {
            let at = match policy {
                QueuePolicy::Fifo => None,
                QueuePolicy::Priority => head
                    .iter(threads)
                    .find(|&i| threads.at(i).map_or(false, |t| t.current_priority > priority)),
            };
            if head.insert(threads, idx, at).is_err() {
                panic!("thread {idx} is already on a list");
            }
        });

        log::trace!("thread {idx} waits on {q:?} ({policy:?})");
    }

    /// Unlink the thread `idx` from the wait list it is on, if any.
    pub(crate) fn unlink_waiter(&mut self, idx: usize) {
        let Some(q) = self.thread_at_mut(idx).queue.take() else {
            return;
        };
        self.with_wait_list(q, |head, threads| {
            if head.remove(threads, idx).is_err() {
                panic!("thread {idx} is not on {q:?}");
            }
        });
    }

    /// Get the head of the list `q` without unlinking it.
    pub(crate) fn first_waiter(&mut self, q: WaitQueue) -> Option<usize> {
        self.with_wait_list(q, |head, _| head.front())
    }

    pub(crate) fn waiter_count(&mut self, q: WaitQueue) -> usize {
        self.with_wait_list(q, |head, threads| head.iter(threads).count())
    }

    /// Wake the head of `q` with `result`. Returns the woken thread.
    pub(crate) fn wake_first(
        &mut self,
        q: WaitQueue,
        result: Result<(), KernelError>,
    ) -> Option<usize> {
        let idx = self.first_waiter(q)?;
        self.resume_thread(idx, Some(result));
        Some(idx)
    }

    /// Wake every thread on `q` with `Err(Error)`. Used when the object owning
    /// `q` is destroyed. Returns `true` if any thread was woken.
    pub(crate) fn resume_all(&mut self, q: WaitQueue) -> bool {
        let mut woken = false;
        while self.wake_first(q, Err(KernelError::Error)).is_some() {
            woken = true;
        }
        woken
    }
}

impl<P: Port> Kernel<P> {
    /// Park the current thread on `q`, arm its timer if `timeout` is positive,
    /// and switch away. Returns the outcome recorded by whoever woke it.
    pub(crate) fn wait_current(
        &self,
        mut lock: CpuLockGuard<'_, P>,
        q: WaitQueue,
        policy: QueuePolicy,
        timeout: i32,
    ) -> Result<(), KernelError> {
        let st = self.state(&mut lock);
        let idx = st.current.ok_or(KernelError::Error)?;
        let tid = st.thread_id_at(idx);

        st.suspend_onto(q, idx, policy);
        if let Some(ticks) = timeout.to_u32().filter(|&t| t > 0) {
            st.arm_thread_timer(idx, ticks);
        }

        self.schedule(lock);
        self.finish_wait(tid)
    }

    /// Collect the outcome of a wait performed by `tid`.
    ///
    /// If `tid` is not running again, the port's context switch returned
    /// early and the outcome stays in the control block for
    /// [`Kernel::take_wait_result`].
    pub(crate) fn finish_wait(&self, tid: ThreadId) -> Result<(), KernelError> {
        let mut lock = self.lock_cpu()?;
        let st = self.state(&mut lock);
        if st.current != Some(tid.0.index()) {
            return Err(KernelError::Suspended);
        }
        let thread = st.threads.get_mut(tid.0).ok_or(KernelError::Error)?;
        thread.wake.take().unwrap_or(Err(KernelError::Error))
    }
}
