//! Software timers
//!
//! Active timers are kept on a list sorted by deadline. [`Kernel::tick_increase`]
//! sweeps the expired prefix of the list once per tick: it first updates every
//! expired timer under CPU Lock (rearming periodic ones, deactivating one-shot
//! ones) and then runs the callbacks with CPU Lock released, so a callback may
//! start or stop any timer, including ones expiring in the same sweep.
use arrayvec::ArrayVec;

use crate::{
    cfg::{MAX_TIMERS, TICK_DURATION_MAX},
    error::KernelError,
    port::Port,
    state::{Kernel, State},
    utils::{
        intrusive_list::{Link, Linked},
        make_name, Name,
    },
};

define_id! {
    /// Identifies a software timer.
    pub struct TimerId;
}

/// A timer callback. Receives the kernel and the argument given at creation.
pub type TimerCallback<P> = fn(&Kernel<P>, usize);

/// Whether a timer rearms itself after expiring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerMode {
    OneShot,
    Periodic,
}

/// A command for [`Kernel::timer_control`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerCommand {
    /// Get the duration in ticks.
    GetTime,
    /// Set the duration in ticks. Takes effect at the next start. Must not
    /// exceed [`TICK_DURATION_MAX`].
    SetTime(u32),
    /// Make the timer one-shot.
    SetOneShot,
    /// Make the timer periodic.
    SetPeriodic,
    /// Query whether the timer is active.
    GetState,
}

/// The reply to a [`TimerCommand`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlReply {
    Unit,
    Time(u32),
    Active(bool),
}

/// Timer control block.
pub(crate) struct TimerCb<P: Port> {
    pub(crate) name: Name,
    pub(crate) callback: TimerCallback<P>,
    pub(crate) arg: usize,
    pub(crate) duration: u32,
    pub(crate) deadline: u32,
    pub(crate) active: bool,
    pub(crate) periodic: bool,
    /// Expired in the current sweep and its callback has not run yet.
    pending: bool,
    link: Option<Link>,
}

impl<P: Port> TimerCb<P> {
    pub(crate) fn new(
        name: Name,
        callback: TimerCallback<P>,
        arg: usize,
        duration: u32,
        periodic: bool,
    ) -> Self {
        Self {
            name,
            callback,
            arg,
            duration,
            deadline: 0,
            active: false,
            periodic,
            pending: false,
            link: None,
        }
    }
}

impl<P: Port> Linked for TimerCb<P> {
    fn link(&self) -> Option<Link> {
        self.link
    }
    fn link_mut(&mut self) -> &mut Option<Link> {
        &mut self.link
    }
}

/// Check whether `deadline` has been reached at `now`, allowing for wrap-around.
#[inline]
fn is_reached(now: u32, deadline: u32) -> bool {
    (now.wrapping_sub(deadline) as i32) >= 0
}

impl<P: Port> State<P> {
    /// Insert the timer `idx` into the list, sorted by deadline, after any
    /// timer with the same deadline.
    fn timer_link(&mut self, idx: usize) {
        let now = self.tick;
        let Some(deadline) = self.timers.at(idx).map(|t| t.deadline) else {
            return;
        };
        let remaining = deadline.wrapping_sub(now) as i32;
        let at = self.timer_list.iter(&self.timers).find(|&i| {
            self.timers
                .at(i)
                .map_or(false, |t| (t.deadline.wrapping_sub(now) as i32) > remaining)
        });
        if self.timer_list.insert(&mut self.timers, idx, at).is_err() {
            panic!("timer {idx} is already linked");
        }
    }

    /// Start (or restart) the timer `idx`.
    pub(crate) fn timer_start_locked(&mut self, idx: usize) {
        let now = self.tick;
        let Some(timer) = self.timers.at_mut(idx) else {
            return;
        };
        let was_active = timer.active;
        timer.deadline = now.wrapping_add(timer.duration);
        timer.active = true;
        timer.pending = false;
        if was_active {
            let _ = self.timer_list.remove(&mut self.timers, idx);
        }
        self.timer_link(idx);
    }

    /// Stop the timer `idx`. Returns `Error` if it is not active.
    pub(crate) fn timer_stop_locked(&mut self, idx: usize) -> Result<(), KernelError> {
        let timer = self
            .timers
            .at_mut(idx)
            .ok_or(KernelError::InvalidArgument)?;
        timer.pending = false;
        if !timer.active {
            return Err(KernelError::Error);
        }
        timer.active = false;
        let _ = self.timer_list.remove(&mut self.timers, idx);
        Ok(())
    }

    fn timer_index(&self, id: TimerId) -> Result<usize, KernelError> {
        if self.timers.contains(id.0) {
            Ok(id.0.index())
        } else {
            Err(KernelError::InvalidArgument)
        }
    }

    /// Check whether `id` is a thread's own timer, which only the kernel may
    /// operate.
    fn is_thread_timer(&self, id: TimerId) -> bool {
        self.threads.iter().any(|(_, t)| t.timer == id)
    }
}

impl<P: Port> Kernel<P> {
    /// Create an inactive timer that calls `callback(kernel, arg)` after
    /// `duration` ticks. `duration` must not exceed [`TICK_DURATION_MAX`].
    pub fn timer_init(
        &self,
        name: &str,
        callback: TimerCallback<P>,
        arg: usize,
        duration: u32,
        mode: TimerMode,
    ) -> Result<TimerId, KernelError> {
        if duration > TICK_DURATION_MAX {
            return Err(KernelError::InvalidArgument);
        }
        let mut lock = self.lock_cpu()?;
        let st = self.state(&mut lock);
        let periodic = mode == TimerMode::Periodic;
        let id = st
            .timers
            .insert(TimerCb::new(make_name(name), callback, arg, duration, periodic))
            .map_err(|_| KernelError::NoMemory)?;
        log::debug!("timer {id:?} ({name}) created");
        Ok(TimerId(id))
    }

    /// Start a timer. The deadline is `now + duration`. Restarting an active
    /// timer moves its deadline.
    pub fn timer_start(&self, id: TimerId) -> Result<(), KernelError> {
        let mut lock = self.lock_cpu()?;
        let st = self.state(&mut lock);
        if st.is_thread_timer(id) {
            return Err(KernelError::InvalidArgument);
        }
        let idx = st.timer_index(id)?;
        st.timer_start_locked(idx);
        Ok(())
    }

    /// Stop a timer. Returns `Error` if it is not active.
    pub fn timer_stop(&self, id: TimerId) -> Result<(), KernelError> {
        let mut lock = self.lock_cpu()?;
        let st = self.state(&mut lock);
        if st.is_thread_timer(id) {
            return Err(KernelError::InvalidArgument);
        }
        let idx = st.timer_index(id)?;
        st.timer_stop_locked(idx)
    }

    pub fn timer_control(
        &self,
        id: TimerId,
        cmd: TimerCommand,
    ) -> Result<ControlReply, KernelError> {
        let mut lock = self.lock_cpu()?;
        let st = self.state(&mut lock);
        if st.is_thread_timer(id) {
            return Err(KernelError::InvalidArgument);
        }
        let timer = st.timers.get_mut(id.0).ok_or(KernelError::InvalidArgument)?;
        Ok(match cmd {
            TimerCommand::GetTime => ControlReply::Time(timer.duration),
            TimerCommand::SetTime(ticks) if ticks > TICK_DURATION_MAX => {
                return Err(KernelError::InvalidArgument);
            }
            TimerCommand::SetTime(ticks) => {
                timer.duration = ticks;
                ControlReply::Unit
            }
            TimerCommand::SetOneShot => {
                timer.periodic = false;
                ControlReply::Unit
            }
            TimerCommand::SetPeriodic => {
                timer.periodic = true;
                ControlReply::Unit
            }
            TimerCommand::GetState => ControlReply::Active(timer.active),
        })
    }

    /// Get the name of a timer. A thread's timer carries the thread's name.
    pub fn timer_name(&self, id: TimerId) -> Result<Name, KernelError> {
        let mut lock = self.lock_cpu()?;
        let st = self.state(&mut lock);
        Ok(st.timers.get(id.0).ok_or(KernelError::InvalidArgument)?.name)
    }

    /// Stop and destroy a timer.
    pub fn timer_delete(&self, id: TimerId) -> Result<(), KernelError> {
        let mut lock = self.lock_cpu()?;
        let st = self.state(&mut lock);
        if st.is_thread_timer(id) {
            return Err(KernelError::InvalidArgument);
        }
        let idx = st.timer_index(id)?;
        let _ = st.timer_stop_locked(idx);
        st.timers.remove(id.0);
        log::debug!("timer {id:?} deleted");
        Ok(())
    }

    /// Fire every timer whose deadline has been reached.
    pub(crate) fn timer_check(&self) -> Result<(), KernelError> {
        let mut expired: ArrayVec<TimerId, MAX_TIMERS> = ArrayVec::new();
        {
            let mut lock = self.lock_cpu()?;
            let st = self.state(&mut lock);
            let now = st.tick;

            while let Some(idx) = st.timer_list.front() {
                let Some(timer) = st.timers.at(idx) else {
                    break;
                };
                if !is_reached(now, timer.deadline) {
                    break;
                }
                let _ = st.timer_list.remove(&mut st.timers, idx);

                let Some(timer) = st.timers.at_mut(idx) else {
                    break;
                };
                timer.pending = true;
                if timer.periodic {
                    timer.deadline = now.wrapping_add(timer.duration);
                } else {
                    timer.active = false;
                }
                if let Some(id) = st.timers.id_at(idx) {
                    expired.push(TimerId(id));
                }
            }

            // Rearm periodic timers after the sweep so that a zero-length
            // period fires once per tick
            for id in &expired {
                let idx = id.0.index();
                if st.timers.at(idx).map_or(false, |t| t.periodic && t.active) {
                    st.timer_link(idx);
                }
            }
        }

        for id in expired {
            let call = {
                let mut lock = self.lock_cpu()?;
                let st = self.state(&mut lock);
                match st.timers.get_mut(id.0) {
                    Some(timer) if timer.pending => {
                        timer.pending = false;
                        Some((timer.callback, timer.arg))
                    }
                    _ => None,
                }
            };
            if let Some((callback, arg)) = call {
                log::trace!("timer {id:?} fired");
                callback(self, arg);
            }
        }
        Ok(())
    }
}
