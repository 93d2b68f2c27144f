//! Counting semaphores
use crate::{
    cfg::{NO_WAIT, SEM_VALUE_MAX},
    error::KernelError,
    port::Port,
    state::Kernel,
    utils::{intrusive_list::ListHead, make_name, Name},
    wait::{QueuePolicy, WaitQueue},
};

define_id! {
    /// Identifies a semaphore.
    pub struct SemaphoreId;
}

/// Semaphore control block.
pub(crate) struct SemaphoreCb {
    pub(crate) name: Name,
    pub(crate) value: u16,
    pub(crate) policy: QueuePolicy,
    pub(crate) wait: ListHead,
}

impl<P: Port> Kernel<P> {
    pub fn sem_init(
        &self,
        name: &str,
        value: u16,
        policy: QueuePolicy,
    ) -> Result<SemaphoreId, KernelError> {
        let mut lock = self.lock_cpu()?;
        let st = self.state(&mut lock);
        let id = st
            .semaphores
            .insert(SemaphoreCb {
                name: make_name(name),
                value,
                policy,
                wait: ListHead::new(),
            })
            .map_err(|_| KernelError::NoMemory)?;
        log::debug!("semaphore {id:?} ({name}) created with value {value}");
        Ok(SemaphoreId(id))
    }

    /// Destroy a semaphore. Every waiter is woken with `Error`.
    pub fn sem_destroy(&self, id: SemaphoreId) -> Result<(), KernelError> {
        let mut lock = self.lock_cpu()?;
        let st = self.state(&mut lock);
        if !st.semaphores.contains(id.0) {
            return Err(KernelError::InvalidArgument);
        }
        let woken = st.resume_all(WaitQueue::Semaphore(id.0.index()));
        st.semaphores.remove(id.0);
        log::debug!("semaphore {id:?} destroyed");

        if woken {
            self.schedule(lock);
        }
        Ok(())
    }

    /// Take one permit, waiting up to `timeout` ticks if none is available.
    pub fn sem_wait(&self, id: SemaphoreId, timeout: i32) -> Result<(), KernelError> {
        let mut lock = self.lock_cpu()?;
        let st = self.state(&mut lock);
        let sem = st
            .semaphores
            .get_mut(id.0)
            .ok_or(KernelError::InvalidArgument)?;

        if sem.value > 0 {
            sem.value -= 1;
            return Ok(());
        }
        if timeout == NO_WAIT {
            return Err(KernelError::Timeout);
        }
        let policy = sem.policy;
        self.wait_current(lock, WaitQueue::Semaphore(id.0.index()), policy, timeout)
    }

    /// Equivalent to `sem_wait(id, 0)`.
    pub fn sem_trywait(&self, id: SemaphoreId) -> Result<(), KernelError> {
        self.sem_wait(id, NO_WAIT)
    }

    /// Release one permit. If a thread is waiting the permit goes straight to
    /// it; otherwise the count is incremented, failing with `Full` at
    /// [`SEM_VALUE_MAX`].
    pub fn sem_post(&self, id: SemaphoreId) -> Result<(), KernelError> {
        let mut lock = self.lock_cpu()?;
        let st = self.state(&mut lock);
        if !st.semaphores.contains(id.0) {
            return Err(KernelError::InvalidArgument);
        }

        if st
            .wake_first(WaitQueue::Semaphore(id.0.index()), Ok(()))
            .is_some()
        {
            self.schedule(lock);
            return Ok(());
        }

        let sem = st
            .semaphores
            .get_mut(id.0)
            .ok_or(KernelError::InvalidArgument)?;
        if sem.value >= SEM_VALUE_MAX {
            return Err(KernelError::Full);
        }
        sem.value += 1;
        Ok(())
    }

    /// Get the number of available permits.
    pub fn sem_value(&self, id: SemaphoreId) -> Result<u16, KernelError> {
        let mut lock = self.lock_cpu()?;
        let st = self.state(&mut lock);
        Ok(st
            .semaphores
            .get(id.0)
            .ok_or(KernelError::InvalidArgument)?
            .value)
    }

    pub fn sem_name(&self, id: SemaphoreId) -> Result<Name, KernelError> {
        let mut lock = self.lock_cpu()?;
        let st = self.state(&mut lock);
        Ok(st
            .semaphores
            .get(id.0)
            .ok_or(KernelError::InvalidArgument)?
            .name)
    }

    /// Get the number of threads waiting on a semaphore.
    pub fn sem_waiter_count(&self, id: SemaphoreId) -> Result<usize, KernelError> {
        let mut lock = self.lock_cpu()?;
        let st = self.state(&mut lock);
        if !st.semaphores.contains(id.0) {
            return Err(KernelError::InvalidArgument);
        }
        Ok(st.waiter_count(WaitQueue::Semaphore(id.0.index())))
    }
}
