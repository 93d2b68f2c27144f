//! Recursive mutexes
//!
//! Waiters are always queued in priority order. When the owner releases the
//! mutex for the last time, ownership passes directly to the head waiter.
//!
//! The owner's priority is recorded when it acquires the mutex, but it is
//! never raised while a more urgent thread waits: there is no priority
//! inheritance.
use crate::{
    cfg::{MUTEX_HOLD_MAX, NO_WAIT},
    error::KernelError,
    port::Port,
    state::Kernel,
    thread::ThreadId,
    utils::{intrusive_list::ListHead, make_name, Name},
    wait::{QueuePolicy, WaitQueue},
};

define_id! {
    /// Identifies a mutex.
    pub struct MutexId;
}

/// Mutex control block.
pub(crate) struct MutexCb {
    pub(crate) name: Name,
    pub(crate) owner: Option<ThreadId>,
    /// The owner's priority at acquisition. `0xff` while free.
    pub(crate) original_priority: u8,
    pub(crate) hold: u8,
    pub(crate) wait: ListHead,
}

impl<P: Port> Kernel<P> {
    /// Create an unlocked mutex.
    pub fn mutex_init(&self, name: &str) -> Result<MutexId, KernelError> {
        let mut lock = self.lock_cpu()?;
        let st = self.state(&mut lock);
        let id = st
            .mutexes
            .insert(MutexCb {
                name: make_name(name),
                owner: None,
                original_priority: 0xff,
                hold: 0,
                wait: ListHead::new(),
            })
            .map_err(|_| KernelError::NoMemory)?;
        log::debug!("mutex {id:?} ({name}) created");
        Ok(MutexId(id))
    }

    /// Destroy a mutex. Every waiter is woken with `Error`.
    pub fn mutex_delete(&self, id: MutexId) -> Result<(), KernelError> {
        let mut lock = self.lock_cpu()?;
        let st = self.state(&mut lock);
        if !st.mutexes.contains(id.0) {
            return Err(KernelError::InvalidArgument);
        }
        let woken = st.resume_all(WaitQueue::Mutex(id.0.index()));
        st.mutexes.remove(id.0);
        log::debug!("mutex {id:?} deleted");

        if woken {
            self.schedule(lock);
        }
        Ok(())
    }

    /// Acquire a mutex on behalf of the running thread.
    ///
    /// The owner may lock it again up to [`MUTEX_HOLD_MAX`] times; beyond
    /// that `Full` is returned. If another thread owns it, `timeout == 0`
    /// returns `Timeout`, a negative `timeout` waits forever, and a positive
    /// one waits at most that many ticks.
    pub fn mutex_lock(&self, id: MutexId, timeout: i32) -> Result<(), KernelError> {
        let mut lock = self.lock_cpu()?;
        let st = self.state(&mut lock);
        let cur = st.current_index()?;
        let tid = st.thread_id_at(cur);
        let priority = st.thread_at(cur).current_priority;
        let mutex = st.mutexes.get_mut(id.0).ok_or(KernelError::InvalidArgument)?;
        let owner = mutex.owner;

        match owner {
            Some(owner) if owner == tid => {
                if mutex.hold >= MUTEX_HOLD_MAX {
                    return Err(KernelError::Full);
                }
                mutex.hold += 1;
                Ok(())
            }
            None => {
                mutex.owner = Some(tid);
                mutex.original_priority = priority;
                mutex.hold = 1;
                log::trace!("mutex {id:?} taken by {tid:?}");
                Ok(())
            }
            Some(_) if timeout == NO_WAIT => Err(KernelError::Timeout),
            Some(_) => self.wait_current(
                lock,
                WaitQueue::Mutex(id.0.index()),
                QueuePolicy::Priority,
                timeout,
            ),
        }
    }

    /// Equivalent to `mutex_lock(id, 0)`.
    pub fn mutex_trylock(&self, id: MutexId) -> Result<(), KernelError> {
        self.mutex_lock(id, NO_WAIT)
    }

    /// Release one hold of a mutex. Only the owner may call this. When the
    /// last hold is released, ownership passes to the most urgent waiter.
    pub fn mutex_unlock(&self, id: MutexId) -> Result<(), KernelError> {
        let mut lock = self.lock_cpu()?;
        let st = self.state(&mut lock);
        let cur = st.current_index()?;
        let tid = st.thread_id_at(cur);
        let mutex = st.mutexes.get_mut(id.0).ok_or(KernelError::InvalidArgument)?;
        if mutex.owner != Some(tid) {
            return Err(KernelError::Error);
        }

        mutex.hold -= 1;
        if mutex.hold > 0 {
            return Ok(());
        }

        let q = WaitQueue::Mutex(id.0.index());
        match st.first_waiter(q) {
            Some(next) => {
                let next_id = st.thread_id_at(next);
                let next_priority = st.thread_at(next).current_priority;
                if let Some(mutex) = st.mutexes.get_mut(id.0) {
                    mutex.owner = Some(next_id);
                    mutex.original_priority = next_priority;
                    mutex.hold = 1;
                }
                st.resume_thread(next, Some(Ok(())));
                log::trace!("mutex {id:?} handed over to {next_id:?}");
                self.schedule(lock);
            }
            None => {
                if let Some(mutex) = st.mutexes.get_mut(id.0) {
                    mutex.owner = None;
                    mutex.original_priority = 0xff;
                }
            }
        }
        Ok(())
    }

    /// Get the owner of a mutex.
    pub fn mutex_owner(&self, id: MutexId) -> Result<Option<ThreadId>, KernelError> {
        let mut lock = self.lock_cpu()?;
        let st = self.state(&mut lock);
        let mutex = st.mutexes.get(id.0).ok_or(KernelError::InvalidArgument)?;
        Ok(mutex.owner)
    }

    pub fn mutex_name(&self, id: MutexId) -> Result<Name, KernelError> {
        let mut lock = self.lock_cpu()?;
        let st = self.state(&mut lock);
        Ok(st.mutexes.get(id.0).ok_or(KernelError::InvalidArgument)?.name)
    }

    /// Get the hold count of a mutex.
    pub fn mutex_hold(&self, id: MutexId) -> Result<u8, KernelError> {
        let mut lock = self.lock_cpu()?;
        let st = self.state(&mut lock);
        Ok(st.mutexes.get(id.0).ok_or(KernelError::InvalidArgument)?.hold)
    }

    /// Get the owner's priority snapshot taken at acquisition.
    pub fn mutex_original_priority(&self, id: MutexId) -> Result<u8, KernelError> {
        let mut lock = self.lock_cpu()?;
        let st = self.state(&mut lock);
        Ok(st
            .mutexes
            .get(id.0)
            .ok_or(KernelError::InvalidArgument)?
            .original_priority)
    }

    /// Get the number of threads waiting for a mutex.
    pub fn mutex_waiter_count(&self, id: MutexId) -> Result<usize, KernelError> {
        let mut lock = self.lock_cpu()?;
        let st = self.state(&mut lock);
        if !st.mutexes.contains(id.0) {
            return Err(KernelError::InvalidArgument);
        }
        Ok(st.waiter_count(WaitQueue::Mutex(id.0.index())))
    }
}
