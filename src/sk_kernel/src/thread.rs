//! Threads and the scheduler
use arrayvec::ArrayVec;
use core::{alloc::Layout, pin::Pin, ptr::NonNull};
use num_integer::Integer;

use crate::{
    cfg::{
        IDLE_PRIORITY, IDLE_STACK_SIZE, IDLE_TIME_SLICE, MAX_THREADS, MIN_STACK_SIZE,
        PRIORITY_MAX, STACK_ALIGN, TICK_DURATION_MAX, TICK_PER_SECOND,
    },
    error::KernelError,
    event_group::EventOption,
    klock::CpuLockGuard,
    port::{Port, ThreadEntry},
    state::{Kernel, State},
    timer::{TimerCb, TimerId},
    utils::{
        intrusive_list::{Link, Linked},
        make_name, Name,
    },
    wait::WaitQueue,
};

pub(crate) mod readyqueue;

use self::readyqueue::{Prioritized, ScheduleDecision};

define_id! {
    /// Identifies a thread.
    pub struct ThreadId;
}

/// A function called by [`Kernel::thread_exit`] before an exiting thread is
/// torn down. Receives the thread and its user-data word.
pub type CleanupFn = fn(ThreadId, usize);

/// The state of a thread.
///
/// <center>
///
#[doc = svgbobdoc::transform_mdstr!(
/// ```svgbob
///                       .-------.
///    .----------------->| Ready |<------------------.
///    | resume,          '-------'                   |
///    | timeout           | ^  preempt, yield        | startup
///    | signal   dispatch v |                        |
/// .-----------.  wait  .---------.             .------.
/// | Suspended |<-------| Running |             | Init |
/// '-----------'        '---------'             '------'
///                            |
///                            | exit
///                            v
///                       .--------.
///                       | Closed |
///                       '--------'
/// ```
)]
///
/// </center>
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    /// Created but not started.
    Init,
    /// Eligible to run and linked onto the ready queue.
    Ready,
    /// Running. At most one thread is in this state.
    Running,
    /// Blocked on an object, sleeping, or explicitly suspended.
    Suspended,
    /// Exited. The stack is reclaimed later.
    Closed,
}

/// The part of a thread control block used while waiting on an event group.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct EventWait {
    pub(crate) set: u32,
    pub(crate) option: EventOption,
    pub(crate) received: u32,
}

/// Thread control block.
pub(crate) struct ThreadCb {
    pub(crate) name: Name,
    pub(crate) state: ThreadState,
    pub(crate) init_priority: u8,
    pub(crate) current_priority: u8,
    /// `1 << current_priority`
    pub(crate) number_mask: u32,
    entry: ThreadEntry,
    arg: usize,
    stack: NonNull<u8>,
    stack_layout: Layout,
    /// The saved stack pointer. The port reads and writes this slot during a
    /// context switch.
    pub(crate) sp: usize,
    pub(crate) init_tick: u32,
    pub(crate) remain_tick: u32,
    /// The one-shot timer used for sleeping and wait timeouts.
    pub(crate) timer: TimerId,
    /// Link for the ready queue or the wait list named by `queue`.
    pub(crate) link: Option<Link>,
    pub(crate) queue: Option<WaitQueue>,
    pub(crate) event: EventWait,
    /// The outcome of the last wait, set by whoever woke the thread.
    pub(crate) wake: Option<Result<(), KernelError>>,
    pub(crate) cleanup: Option<CleanupFn>,
    pub(crate) user_data: usize,
}

impl Linked for ThreadCb {
    fn link(&self) -> Option<Link> {
        self.link
    }
    fn link_mut(&mut self) -> &mut Option<Link> {
        &mut self.link
    }
}

impl Prioritized for ThreadCb {
    fn priority(&self) -> usize {
        self.current_priority as usize
    }
}

/// The timer callback attached to every thread. `arg` is the packed
/// [`ThreadId`].
fn thread_timeout<P: Port>(kernel: &Kernel<P>, arg: usize) {
    let tid = ThreadId::from_usize(arg);
    // Timer callbacks run with CPU Lock released
    let lock = kernel.lock_cpu();
    debug_assert!(lock.is_ok(), "thread {tid:?} timed out under CPU Lock");
    let Ok(mut lock) = lock else {
        log::warn!("thread {tid:?} timed out under CPU Lock; timeout dropped");
        return;
    };
    let st = kernel.state(&mut lock);
    let Some(thread) = st.threads.get(tid.0) else {
        return;
    };
    if thread.state != ThreadState::Suspended {
        return;
    }

    // A thread on a wait list timed out; otherwise its sleep is over
    let result = if thread.queue.is_some() {
        Err(KernelError::Timeout)
    } else {
        Ok(())
    };
    log::trace!("thread {tid:?} timer expired ({result:?})");

    st.resume_thread(tid.0.index(), Some(result));
    kernel.schedule(lock);
}

/// The body of the idle thread. `arg` is the address of the kernel.
fn idle_entry<P: Port>(arg: usize) {
    // Safety: `start` passes the address of the pinned kernel, which outlives
    //         every thread
    let kernel = unsafe { &*(arg as *const Kernel<P>) };
    loop {
        kernel.idle_step();
        kernel.port.wait_for_interrupt();
    }
}

impl<P: Port> State<P> {
    pub(crate) fn thread_at(&self, idx: usize) -> &ThreadCb {
        match self.threads.at(idx) {
            Some(x) => x,
            None => panic!("thread {idx} does not exist"),
        }
    }

    pub(crate) fn thread_at_mut(&mut self, idx: usize) -> &mut ThreadCb {
        match self.threads.at_mut(idx) {
            Some(x) => x,
            None => panic!("thread {idx} does not exist"),
        }
    }

    pub(crate) fn thread_id_at(&self, idx: usize) -> ThreadId {
        match self.threads.id_at(idx) {
            Some(id) => ThreadId(id),
            None => panic!("thread {idx} does not exist"),
        }
    }

    /// Look up a thread handle. Returns `InvalidArgument` if it is stale.
    pub(crate) fn thread_index(&self, tid: ThreadId) -> Result<usize, KernelError> {
        if self.threads.contains(tid.0) {
            Ok(tid.0.index())
        } else {
            Err(KernelError::InvalidArgument)
        }
    }

    /// Get the running thread. Fails if the kernel has not started.
    pub(crate) fn current_index(&self) -> Result<usize, KernelError> {
        self.current.ok_or(KernelError::Error)
    }

    /// Make the thread `idx` runnable. The running thread is only marked
    /// `Running`; any other thread is appended to its priority's ready list.
    pub(crate) fn make_ready(&mut self, idx: usize) {
        if self.current == Some(idx) {
            self.thread_at_mut(idx).state = ThreadState::Running;
        } else {
            self.thread_at_mut(idx).state = ThreadState::Ready;
            self.ready.push_back(&mut self.threads, idx);
        }
    }

    /// Move a Suspended thread back to the ready queue, unlinking it from any
    /// wait list and stopping its timer. `wake` is recorded as the outcome of
    /// its wait.
    pub(crate) fn resume_thread(
        &mut self,
        idx: usize,
        wake: Option<Result<(), KernelError>>,
    ) {
        debug_assert_eq!(self.thread_at(idx).state, ThreadState::Suspended);
        self.unlink_waiter(idx);
        let timer = self.thread_at(idx).timer;
        let _ = self.timer_stop_locked(timer.0.index());

        let thread = self.thread_at_mut(idx);
        if wake.is_some() {
            thread.wake = wake;
        }
        self.make_ready(idx);
        log::trace!("thread {idx} resumed");
    }

    /// Arm the timer of the thread `idx` to fire after `ticks`.
    pub(crate) fn arm_thread_timer(&mut self, idx: usize, ticks: u32) {
        let timer = self.thread_at(idx).timer.0.index();
        if let Some(t) = self.timers.at_mut(timer) {
            t.duration = ticks;
        }
        self.timer_start_locked(timer);
    }

    /// Release exited threads, except the one still running. Returns their
    /// stacks so that the caller can free them.
    fn reap(&mut self, port: &P) {
        while let Some(idx) = self.defunct.front() {
            if self.current == Some(idx) {
                break;
            }
            self.unlink_waiter(idx);
            let id = self.thread_id_at(idx);
            if let Some(thread) = self.threads.remove(id.0) {
                log::debug!("thread {:?} ({}) reclaimed", id, thread.name);
                // Safety: the stack was allocated by `thread_create` and the
                //         thread will never run again
                unsafe { port.free(thread.stack, thread.stack_layout) };
            }
        }
    }
}

impl<P: Port> Kernel<P> {
    /// Pick the most urgent ready thread and switch to it if it should
    /// preempt the current one. Consumes the lock, which is released before
    /// this returns.
    ///
    /// The outgoing thread is put back on the ready queue only if it is
    /// still `Running`; a thread that blocked, slept, yielded or exited is
    /// already where it belongs.
    pub(crate) fn schedule(&self, mut lock: CpuLockGuard<'_, P>) {
        let st = self.state(&mut lock);
        let Some(from) = st.current else {
            // Not started yet
            return;
        };

        let from_running = st.thread_at(from).state == ThreadState::Running;
        let prev_priority = from_running.then(|| st.thread_at(from).priority());

        let to = match st.ready.choose_next(&mut st.threads, prev_priority) {
            Some(ScheduleDecision::Keep) => return,
            Some(ScheduleDecision::SwitchTo(to)) => to,
            None => panic!("no runnable thread; the idle thread must never block"),
        };

        if to == from {
            // A yielding thread was the only one at its level
            st.thread_at_mut(to).state = ThreadState::Running;
            return;
        }

        if from_running {
            st.thread_at_mut(from).state = ThreadState::Ready;
            st.ready.push_back(&mut st.threads, from);
        }
        st.thread_at_mut(to).state = ThreadState::Running;
        st.current = Some(to);

        log::trace!(
            "switch: {} ({:?}) -> {} ({:?})",
            from,
            st.thread_at(from).name,
            to,
            st.thread_at(to).name
        );

        let from_sp: *mut usize = &mut st.thread_at_mut(from).sp;
        let to_sp: *const usize = &st.thread_at(to).sp;

        let saved = lock.release_for_switch();
        // Safety: Both slots belong to live control blocks. The outgoing one
        //         is not reclaimed before another thread runs.
        unsafe {
            self.port.context_switch(from_sp, to_sp);
            self.port.restore_interrupts(saved);
        }
    }

    /// Create the idle thread and switch to the most urgent ready thread.
    ///
    /// On hardware this does not return. A hosted port returns `Ok(())` with
    /// the chosen thread recorded as running.
    pub fn start(self: Pin<&Self>) -> Result<(), KernelError> {
        let this = self.get_ref();
        {
            let mut lock = this.lock_cpu()?;
            if this.state(&mut lock).current.is_some() {
                return Err(KernelError::Error);
            }
        }

        let idle = this.thread_create(
            "idle",
            idle_entry::<P>,
            this as *const Self as usize,
            IDLE_STACK_SIZE,
            IDLE_PRIORITY,
            IDLE_TIME_SLICE,
        )?;

        let mut lock = this.lock_cpu()?;
        let st = this.state(&mut lock);
        let idle = st.thread_index(idle)?;
        st.idle = Some(idle);
        st.thread_at_mut(idle).state = ThreadState::Ready;
        st.ready.push_back(&mut st.threads, idle);

        let to = match st.ready.choose_next(&mut st.threads, None) {
            Some(ScheduleDecision::SwitchTo(to)) => to,
            _ => panic!("no runnable thread"),
        };
        st.thread_at_mut(to).state = ThreadState::Running;
        st.current = Some(to);
        log::debug!("kernel started; first thread {} ({})", to, st.thread_at(to).name);

        let to_sp: *const usize = &st.thread_at(to).sp;
        let saved = lock.release_for_switch();
        // Safety: `to_sp` is the slot of a live control block
        unsafe {
            this.port.context_switch_to(to_sp);
            this.port.restore_interrupts(saved);
        }
        Ok(())
    }

    /// Create a thread in the `Init` state.
    ///
    /// The stack is drawn from the port's allocator and an initial frame is
    /// built on it so that the thread begins at `entry(arg)`. `priority` must
    /// be below [`PRIORITY_MAX`]. `time_slice` is the number of ticks the
    /// thread runs before yielding to a peer of equal priority.
    pub fn thread_create(
        &self,
        name: &str,
        entry: ThreadEntry,
        arg: usize,
        stack_size: usize,
        priority: u8,
        time_slice: u32,
    ) -> Result<ThreadId, KernelError> {
        if priority as usize >= PRIORITY_MAX || time_slice == 0 || stack_size < MIN_STACK_SIZE {
            return Err(KernelError::InvalidArgument);
        }

        {
            let mut lock = self.lock_cpu()?;
            self.state(&mut lock).reap(&self.port);
        }

        let layout = Layout::from_size_align(stack_size, STACK_ALIGN)
            .map_err(|_| KernelError::InvalidArgument)?;
        let stack = self.port.alloc(layout).ok_or(KernelError::NoMemory)?;
        // Safety: `stack` is valid for `stack_size` bytes
        let sp = unsafe {
            let stack_top = NonNull::new_unchecked(stack.as_ptr().add(stack_size));
            self.port
                .build_initial_frame(entry, arg, stack_top, self.exit_routine)
        };

        let mut lock = self.lock_cpu()?;
        let st = self.state(&mut lock);

        let timer = match st
            .timers
            .insert(TimerCb::new(make_name(name), thread_timeout::<P>, 0, 0, false))
        {
            Ok(id) => TimerId(id),
            Err(_) => {
                // Safety: `stack` came from `alloc(layout)` just above
                unsafe { self.port.free(stack, layout) };
                return Err(KernelError::NoMemory);
            }
        };

        let thread = ThreadCb {
            name: make_name(name),
            state: ThreadState::Init,
            init_priority: priority,
            current_priority: priority,
            number_mask: 1 << priority,
            entry,
            arg,
            stack,
            stack_layout: layout,
            sp,
            init_tick: time_slice,
            remain_tick: time_slice,
            timer,
            link: None,
            queue: None,
            event: EventWait::default(),
            wake: None,
            cleanup: None,
            user_data: 0,
        };

        let tid = match st.threads.insert(thread) {
            Ok(id) => ThreadId(id),
            Err(_) => {
                st.timers.remove(timer.0);
                // Safety: `stack` came from `alloc(layout)` just above
                unsafe { self.port.free(stack, layout) };
                return Err(KernelError::NoMemory);
            }
        };

        if let Some(t) = st.timers.get_mut(timer.0) {
            t.arg = tid.to_usize();
        }

        log::debug!("thread {tid:?} ({name}) created with priority {priority}");
        Ok(tid)
    }

    /// Make an `Init` thread ready. Preempts the caller if the new thread is
    /// more urgent.
    pub fn thread_startup(&self, tid: ThreadId) -> Result<(), KernelError> {
        let mut lock = self.lock_cpu()?;
        let st = self.state(&mut lock);
        let idx = st.thread_index(tid)?;
        if st.thread_at(idx).state != ThreadState::Init {
            return Err(KernelError::Error);
        }
        st.thread_at_mut(idx).state = ThreadState::Suspended;
        st.resume_thread(idx, None);
        log::debug!("thread {tid:?} started up");

        self.schedule(lock);
        Ok(())
    }

    /// Suspend a `Ready` or `Running` thread. Suspending the caller switches
    /// to another thread.
    pub fn thread_suspend(&self, tid: ThreadId) -> Result<(), KernelError> {
        let mut lock = self.lock_cpu()?;
        let st = self.state(&mut lock);
        let idx = st.thread_index(tid)?;
        if st.idle == Some(idx) {
            return Err(KernelError::Error);
        }

        match st.thread_at(idx).state {
            ThreadState::Ready => st.ready.remove(&mut st.threads, idx),
            ThreadState::Running => {}
            _ => return Err(KernelError::Error),
        }
        let thread = st.thread_at_mut(idx);
        thread.state = ThreadState::Suspended;
        thread.wake = None;
        let timer = thread.timer.0.index();
        let _ = st.timer_stop_locked(timer);
        log::debug!("thread {tid:?} suspended");

        if st.current == Some(idx) {
            self.schedule(lock);
        }
        Ok(())
    }

    /// Resume a `Suspended` thread. A thread waiting on an object is taken
    /// off its wait list and its wait fails with `Error`.
    pub fn thread_resume(&self, tid: ThreadId) -> Result<(), KernelError> {
        let mut lock = self.lock_cpu()?;
        let st = self.state(&mut lock);
        let idx = st.thread_index(tid)?;
        let thread = st.thread_at(idx);
        if thread.state != ThreadState::Suspended {
            return Err(KernelError::Error);
        }
        let wake = if thread.queue.is_some() {
            Err(KernelError::Error)
        } else {
            Ok(())
        };
        st.resume_thread(idx, Some(wake));

        self.schedule(lock);
        Ok(())
    }

    /// Block the caller for `ticks` ticks. `0` yields instead. `ticks` must
    /// not exceed [`TICK_DURATION_MAX`].
    pub fn thread_sleep(&self, ticks: u32) -> Result<(), KernelError> {
        if ticks == 0 {
            return self.thread_yield();
        }
        if ticks > TICK_DURATION_MAX {
            return Err(KernelError::InvalidArgument);
        }

        let mut lock = self.lock_cpu()?;
        let st = self.state(&mut lock);
        let idx = st.current_index()?;
        if st.idle == Some(idx) {
            return Err(KernelError::Error);
        }
        let tid = st.thread_id_at(idx);

        let thread = st.thread_at_mut(idx);
        thread.state = ThreadState::Suspended;
        thread.wake = None;
        st.arm_thread_timer(idx, ticks);
        log::trace!("thread {tid:?} sleeps for {ticks} ticks");

        self.schedule(lock);
        self.finish_wait(tid)
    }

    /// Block the caller for at least `ms` milliseconds. Delays longer than
    /// [`TICK_DURATION_MAX`] ticks are cut to that length.
    pub fn thread_delay(&self, ms: u32) -> Result<(), KernelError> {
        self.thread_sleep(Self::tick_from_ms(ms).min(TICK_DURATION_MAX))
    }

    /// Move the caller to the back of its priority's ready list if a peer of
    /// equal priority is ready.
    pub fn thread_yield(&self) -> Result<(), KernelError> {
        let mut lock = self.lock_cpu()?;
        let st = self.state(&mut lock);
        let idx = st.current_index()?;
        self.yield_locked(lock, idx);
        Ok(())
    }

    fn yield_locked(&self, mut lock: CpuLockGuard<'_, P>, idx: usize) {
        let st = self.state(&mut lock);
        let Some(thread) = st.threads.at(idx) else {
            return;
        };
        if st.current != Some(idx)
            || thread.state != ThreadState::Running
            || !st.ready.has_ready_at(thread.priority())
        {
            return;
        }
        st.thread_at_mut(idx).state = ThreadState::Ready;
        st.ready.push_back(&mut st.threads, idx);
        log::trace!("thread {idx} yields");
        self.schedule(lock);
    }

    /// Terminate the caller. Runs its cleanup callback, deletes its timer and
    /// switches away. The stack is reclaimed later by the idle thread or the
    /// next [`Self::thread_create`].
    ///
    /// On hardware this does not return.
    pub fn thread_exit(&self) -> Result<(), KernelError> {
        let (tid, cleanup, user_data) = {
            let mut lock = self.lock_cpu()?;
            let st = self.state(&mut lock);
            let idx = st.current_index()?;
            if st.idle == Some(idx) {
                return Err(KernelError::Error);
            }
            let tid = st.thread_id_at(idx);
            let thread = st.thread_at_mut(idx);
            (tid, thread.cleanup.take(), thread.user_data)
        };

        if let Some(cleanup) = cleanup {
            cleanup(tid, user_data);
        }

        let mut lock = self.lock_cpu()?;
        let st = self.state(&mut lock);
        let idx = st.thread_index(tid)?;

        let timer = st.thread_at(idx).timer;
        let _ = st.timer_stop_locked(timer.0.index());
        st.timers.remove(timer.0);

        let thread = st.thread_at_mut(idx);
        thread.state = ThreadState::Closed;
        thread.queue = Some(WaitQueue::Defunct);
        if st.defunct.push_back(&mut st.threads, idx).is_err() {
            panic!("exiting thread {idx} is on a list");
        }
        log::debug!("thread {tid:?} exited");

        self.schedule(lock);
        Ok(())
    }

    /// Destroy a thread that is not running. Its stack is freed immediately.
    pub fn thread_delete(&self, tid: ThreadId) -> Result<(), KernelError> {
        let mut lock = self.lock_cpu()?;
        let st = self.state(&mut lock);
        let idx = st.thread_index(tid)?;
        if st.current == Some(idx) || st.idle == Some(idx) {
            return Err(KernelError::Error);
        }

        match st.thread_at(idx).state {
            ThreadState::Ready => st.ready.remove(&mut st.threads, idx),
            ThreadState::Running => return Err(KernelError::Error),
            ThreadState::Init | ThreadState::Suspended | ThreadState::Closed => {
                st.unlink_waiter(idx)
            }
        }

        let timer = st.thread_at(idx).timer;
        if st.timers.contains(timer.0) {
            let _ = st.timer_stop_locked(timer.0.index());
            st.timers.remove(timer.0);
        }

        if let Some(thread) = st.threads.remove(tid.0) {
            // Safety: the stack was allocated by `thread_create` and the
            //         thread is not running
            unsafe { self.port.free(thread.stack, thread.stack_layout) };
        }
        log::debug!("thread {tid:?} deleted");
        Ok(())
    }

    /// Advance the tick count by one. Called by the port's tick interrupt
    /// handler.
    ///
    /// Charges the running thread's time slice, fires expired timers, and
    /// rotates the running thread behind its equal-priority peers when its
    /// slice runs out.
    pub fn tick_increase(&self) -> Result<(), KernelError> {
        let slice_expired = {
            let mut lock = self.lock_cpu()?;
            let st = self.state(&mut lock);
            st.tick = st.tick.wrapping_add(1);

            match st.current {
                Some(idx) => {
                    if st.idle == Some(idx) {
                        st.idle_tick = st.idle_tick.wrapping_add(1);
                    }
                    let thread = st.thread_at_mut(idx);
                    thread.remain_tick = thread.remain_tick.saturating_sub(1);
                    if thread.remain_tick == 0 {
                        thread.remain_tick = thread.init_tick;
                        Some(idx)
                    } else {
                        None
                    }
                }
                None => None,
            }
        };

        self.timer_check()?;

        if let Some(idx) = slice_expired {
            let lock = self.lock_cpu()?;
            self.yield_locked(lock, idx);
        }
        Ok(())
    }

    /// One iteration of the idle loop: reclaim exited threads.
    pub fn idle_step(&self) {
        if let Ok(mut lock) = self.lock_cpu() {
            self.state(&mut lock).reap(&self.port);
        }
    }

    /// Get the number of ticks since boot.
    pub fn tick_get(&self) -> Result<u32, KernelError> {
        let mut lock = self.lock_cpu()?;
        Ok(self.state(&mut lock).tick)
    }

    /// Get the number of ticks spent in the idle thread.
    pub fn idle_tick_get(&self) -> Result<u32, KernelError> {
        let mut lock = self.lock_cpu()?;
        Ok(self.state(&mut lock).idle_tick)
    }

    /// Get the percentage of ticks since boot not spent idle.
    pub fn cpu_usage(&self) -> Result<u32, KernelError> {
        let mut lock = self.lock_cpu()?;
        let st = self.state(&mut lock);
        if st.tick == 0 {
            return Ok(0);
        }
        let idle = st.idle_tick as u64 * 100 / st.tick as u64;
        Ok(100 - idle.min(100) as u32)
    }

    /// Convert milliseconds to ticks, rounding up.
    pub fn tick_from_ms(ms: u32) -> u32 {
        let ticks = Integer::div_ceil(&(ms as u64 * TICK_PER_SECOND as u64), &1000);
        ticks.min(u32::MAX as u64) as u32
    }

    /// Get the running thread.
    pub fn current_thread(&self) -> Option<ThreadId> {
        let mut lock = self.lock_cpu().ok()?;
        let st = self.state(&mut lock);
        st.current.map(|idx| st.thread_id_at(idx))
    }

    /// Get the idle thread. `None` until the kernel starts.
    pub fn idle_thread(&self) -> Option<ThreadId> {
        let mut lock = self.lock_cpu().ok()?;
        let st = self.state(&mut lock);
        st.idle.map(|idx| st.thread_id_at(idx))
    }

    /// Find a thread by name.
    pub fn thread_find(&self, name: &str) -> Option<ThreadId> {
        let mut lock = self.lock_cpu().ok()?;
        let st = self.state(&mut lock);
        let name = make_name(name);
        let found = st
            .threads
            .iter()
            .find(|(_, t)| t.name == name)
            .map(|(id, _)| ThreadId(id));
        found
    }

    pub fn thread_state(&self, tid: ThreadId) -> Result<ThreadState, KernelError> {
        let mut lock = self.lock_cpu()?;
        let st = self.state(&mut lock);
        let idx = st.thread_index(tid)?;
        Ok(st.thread_at(idx).state)
    }

    /// Get the current and initial priority of a thread.
    pub fn thread_priority(&self, tid: ThreadId) -> Result<(u8, u8), KernelError> {
        let mut lock = self.lock_cpu()?;
        let st = self.state(&mut lock);
        let thread = st.thread_at(st.thread_index(tid)?);
        debug_assert_eq!(thread.number_mask, 1 << thread.current_priority);
        Ok((thread.current_priority, thread.init_priority))
    }

    pub fn thread_name(&self, tid: ThreadId) -> Result<Name, KernelError> {
        let mut lock = self.lock_cpu()?;
        let st = self.state(&mut lock);
        Ok(st.thread_at(st.thread_index(tid)?).name)
    }

    /// Get the entry point and argument a thread was created with.
    pub fn thread_entry(&self, tid: ThreadId) -> Result<(ThreadEntry, usize), KernelError> {
        let mut lock = self.lock_cpu()?;
        let st = self.state(&mut lock);
        let thread = st.thread_at(st.thread_index(tid)?);
        Ok((thread.entry, thread.arg))
    }

    /// Get the timer that backs the sleeps and timed waits of a thread. Only
    /// the kernel may operate it.
    pub fn thread_timer(&self, tid: ThreadId) -> Result<TimerId, KernelError> {
        let mut lock = self.lock_cpu()?;
        let st = self.state(&mut lock);
        Ok(st.thread_at(st.thread_index(tid)?).timer)
    }

    pub fn thread_set_cleanup(
        &self,
        tid: ThreadId,
        cleanup: Option<CleanupFn>,
    ) -> Result<(), KernelError> {
        let mut lock = self.lock_cpu()?;
        let st = self.state(&mut lock);
        let idx = st.thread_index(tid)?;
        st.thread_at_mut(idx).cleanup = cleanup;
        Ok(())
    }

    pub fn thread_set_user_data(&self, tid: ThreadId, value: usize) -> Result<(), KernelError> {
        let mut lock = self.lock_cpu()?;
        let st = self.state(&mut lock);
        let idx = st.thread_index(tid)?;
        st.thread_at_mut(idx).user_data = value;
        Ok(())
    }

    pub fn thread_user_data(&self, tid: ThreadId) -> Result<usize, KernelError> {
        let mut lock = self.lock_cpu()?;
        let st = self.state(&mut lock);
        Ok(st.thread_at(st.thread_index(tid)?).user_data)
    }

    /// Get the saved stack pointer of a thread.
    pub fn thread_stack_pointer(&self, tid: ThreadId) -> Result<usize, KernelError> {
        let mut lock = self.lock_cpu()?;
        let st = self.state(&mut lock);
        Ok(st.thread_at(st.thread_index(tid)?).sp)
    }

    /// Take the outcome of the last wait of `tid`, if it has been decided.
    ///
    /// Needed by ports whose context switch returns before the waiter runs
    /// again; see [`KernelError::Suspended`].
    pub fn take_wait_result(&self, tid: ThreadId) -> Option<Result<(), KernelError>> {
        let mut lock = self.lock_cpu().ok()?;
        let st = self.state(&mut lock);
        st.threads.get_mut(tid.0)?.wake.take()
    }

    /// Get the event bits delivered to `tid` by its last event-group wait.
    pub fn thread_event_received(&self, tid: ThreadId) -> Result<u32, KernelError> {
        let mut lock = self.lock_cpu()?;
        let st = self.state(&mut lock);
        Ok(st.thread_at(st.thread_index(tid)?).event.received)
    }

    /// List the threads on the ready queue at `priority`, head first.
    pub fn ready_threads(
        &self,
        priority: u8,
    ) -> Result<ArrayVec<ThreadId, MAX_THREADS>, KernelError> {
        if priority as usize >= PRIORITY_MAX {
            return Err(KernelError::InvalidArgument);
        }
        let mut lock = self.lock_cpu()?;
        let st = self.state(&mut lock);
        Ok(st
            .ready
            .iter_level(&st.threads, priority as usize)
            .map(|idx| st.thread_id_at(idx))
            .collect())
    }

    /// Get the bitmap of non-empty ready levels.
    pub fn ready_bitmap(&self) -> Result<u32, KernelError> {
        let mut lock = self.lock_cpu()?;
        Ok(self.state(&mut lock).ready.bitmap())
    }
}
