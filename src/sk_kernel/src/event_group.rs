//! Event groups
//!
//! An event group is a 32-bit flag register. A receiver waits until its
//! requested bits are all set ([`EventOption::AND`]) or until any of them is
//! set ([`EventOption::OR`]), and optionally consumes the matched bits
//! ([`EventOption::CLEAR`]).
//!
//! Only the head of the wait list is examined when bits are sent.
use crate::{
    cfg::NO_WAIT,
    error::KernelError,
    port::Port,
    state::Kernel,
    utils::{intrusive_list::ListHead, make_name, Name},
    wait::{QueuePolicy, WaitQueue},
};

define_id! {
    /// Identifies an event group.
    pub struct EventGroupId;
}

bitflags::bitflags! {
    /// Options for [`Kernel::event_recv`].
    #[derive(Default)]
    pub struct EventOption: u8 {
        /// Wait for all requested bits.
        const AND = 1 << 0;
        /// Wait for any requested bit.
        const OR = 1 << 1;
        /// Clear the matched bits on success.
        const CLEAR = 1 << 2;
    }
}

impl EventOption {
    /// Get the bits of `set` that satisfy `self` against `flags`, or `None` if
    /// the condition does not hold. `AND` takes precedence over `OR`.
    fn matched(self, set: u32, flags: u32) -> Option<u32> {
        if self.contains(Self::AND) {
            (flags & set == set).then_some(set)
        } else if self.contains(Self::OR) {
            let m = flags & set;
            (m != 0).then_some(m)
        } else {
            None
        }
    }
}

/// Event group control block.
pub(crate) struct EventGroupCb {
    pub(crate) name: Name,
    pub(crate) set: u32,
    pub(crate) policy: QueuePolicy,
    pub(crate) wait: ListHead,
}

impl<P: Port> Kernel<P> {
    /// Create an event group with no bits set.
    pub fn event_init(&self, name: &str, policy: QueuePolicy) -> Result<EventGroupId, KernelError> {
        let mut lock = self.lock_cpu()?;
        let st = self.state(&mut lock);
        let id = st
            .event_groups
            .insert(EventGroupCb {
                name: make_name(name),
                set: 0,
                policy,
                wait: ListHead::new(),
            })
            .map_err(|_| KernelError::NoMemory)?;
        log::debug!("event group {id:?} ({name}) created");
        Ok(EventGroupId(id))
    }

    /// Destroy an event group. Every waiter is woken with `Error`.
    pub fn event_destroy(&self, id: EventGroupId) -> Result<(), KernelError> {
        let mut lock = self.lock_cpu()?;
        let st = self.state(&mut lock);
        if !st.event_groups.contains(id.0) {
            return Err(KernelError::InvalidArgument);
        }
        let woken = st.resume_all(WaitQueue::EventGroup(id.0.index()));
        st.event_groups.remove(id.0);
        log::debug!("event group {id:?} destroyed");

        if woken {
            self.schedule(lock);
        }
        Ok(())
    }

    /// Set the bits `set`, then release the head waiter if its condition now
    /// holds. `set == 0` is an `Error`.
    pub fn event_send(&self, id: EventGroupId, set: u32) -> Result<(), KernelError> {
        if set == 0 {
            return Err(KernelError::Error);
        }

        let mut lock = self.lock_cpu()?;
        let st = self.state(&mut lock);
        let group = st
            .event_groups
            .get_mut(id.0)
            .ok_or(KernelError::InvalidArgument)?;
        group.set |= set;
        let flags = group.set;

        let q = WaitQueue::EventGroup(id.0.index());
        let Some(head) = st.first_waiter(q) else {
            return Ok(());
        };
        let wait = st.thread_at(head).event;
        let Some(matched) = wait.option.matched(wait.set, flags) else {
            return Ok(());
        };

        if wait.option.contains(EventOption::CLEAR) {
            if let Some(group) = st.event_groups.get_mut(id.0) {
                group.set &= !matched;
            }
        }
        st.thread_at_mut(head).event.received = matched;
        st.resume_thread(head, Some(Ok(())));
        log::trace!("event group {id:?} released thread {head} with {matched:#x}");

        self.schedule(lock);
        Ok(())
    }

    /// Wait for the bits `set` under `option` and return the matched bits.
    ///
    /// `option` must contain `AND` or `OR`, otherwise `InvalidArgument` is
    /// returned. `set == 0` is an `Error`.
    pub fn event_recv(
        &self,
        id: EventGroupId,
        set: u32,
        option: EventOption,
        timeout: i32,
    ) -> Result<u32, KernelError> {
        if set == 0 {
            return Err(KernelError::Error);
        }
        if !option.intersects(EventOption::AND | EventOption::OR) {
            return Err(KernelError::InvalidArgument);
        }

        let mut lock = self.lock_cpu()?;
        let st = self.state(&mut lock);
        let cur = st.current_index()?;
        let group = st
            .event_groups
            .get_mut(id.0)
            .ok_or(KernelError::InvalidArgument)?;

        if let Some(matched) = option.matched(set, group.set) {
            if option.contains(EventOption::CLEAR) {
                group.set &= !matched;
            }
            let thread = st.thread_at_mut(cur);
            thread.event.set = set;
            thread.event.option = option;
            thread.event.received = matched;
            return Ok(matched);
        }

        if timeout == NO_WAIT {
            return Err(KernelError::Timeout);
        }

        let policy = group.policy;
        let thread = st.thread_at_mut(cur);
        thread.event.set = set;
        thread.event.option = option;
        thread.event.received = 0;
        let tid = st.thread_id_at(cur);

        self.wait_current(lock, WaitQueue::EventGroup(id.0.index()), policy, timeout)?;

        let mut lock = self.lock_cpu()?;
        let st = self.state(&mut lock);
        let idx = st.thread_index(tid)?;
        Ok(st.thread_at(idx).event.received)
    }

    /// Get the current flag register.
    pub fn event_value(&self, id: EventGroupId) -> Result<u32, KernelError> {
        let mut lock = self.lock_cpu()?;
        let st = self.state(&mut lock);
        Ok(st
            .event_groups
            .get(id.0)
            .ok_or(KernelError::InvalidArgument)?
            .set)
    }

    pub fn event_name(&self, id: EventGroupId) -> Result<Name, KernelError> {
        let mut lock = self.lock_cpu()?;
        let st = self.state(&mut lock);
        Ok(st
            .event_groups
            .get(id.0)
            .ok_or(KernelError::InvalidArgument)?
            .name)
    }
}
