//! Completions
//!
//! A completion is a one-shot flag. Threads wait until it is signalled; once
//! signalled, it stays signalled and later waits return at once.
use crate::{
    cfg::NO_WAIT,
    error::KernelError,
    port::Port,
    state::Kernel,
    utils::intrusive_list::ListHead,
    wait::{QueuePolicy, WaitQueue},
};

define_id! {
    /// Identifies a completion.
    pub struct CompletionId;
}

/// Completion control block.
pub(crate) struct CompletionCb {
    pub(crate) done: bool,
    pub(crate) wait: ListHead,
}

impl<P: Port> Kernel<P> {
    pub fn completion_init(&self) -> Result<CompletionId, KernelError> {
        let mut lock = self.lock_cpu()?;
        let st = self.state(&mut lock);
        let id = st
            .completions
            .insert(CompletionCb {
                done: false,
                wait: ListHead::new(),
            })
            .map_err(|_| KernelError::NoMemory)?;
        log::debug!("completion {id:?} created");
        Ok(CompletionId(id))
    }

    /// Destroy a completion. Every waiter is woken with `Error`.
    pub fn completion_delete(&self, id: CompletionId) -> Result<(), KernelError> {
        let mut lock = self.lock_cpu()?;
        let st = self.state(&mut lock);
        if !st.completions.contains(id.0) {
            return Err(KernelError::InvalidArgument);
        }
        let woken = st.resume_all(WaitQueue::Completion(id.0.index()));
        st.completions.remove(id.0);
        log::debug!("completion {id:?} deleted");

        if woken {
            self.schedule(lock);
        }
        Ok(())
    }

    /// Wait up to `timeout` ticks for the completion to be signalled.
    pub fn completion_wait(&self, id: CompletionId, timeout: i32) -> Result<(), KernelError> {
        let mut lock = self.lock_cpu()?;
        let st = self.state(&mut lock);
        let c = st
            .completions
            .get(id.0)
            .ok_or(KernelError::InvalidArgument)?;

        if c.done {
            return Ok(());
        }
        if timeout == NO_WAIT {
            return Err(KernelError::Timeout);
        }
        self.wait_current(
            lock,
            WaitQueue::Completion(id.0.index()),
            QueuePolicy::Fifo,
            timeout,
        )
    }

    /// Signal the completion and release every waiter.
    pub fn completion_done(&self, id: CompletionId) -> Result<(), KernelError> {
        let mut lock = self.lock_cpu()?;
        let st = self.state(&mut lock);
        let c = st
            .completions
            .get_mut(id.0)
            .ok_or(KernelError::InvalidArgument)?;
        c.done = true;

        let q = WaitQueue::Completion(id.0.index());
        let mut woken = 0usize;
        while st.wake_first(q, Ok(())).is_some() {
            woken += 1;
        }
        log::trace!("completion {id:?} signalled, {woken} waiter(s) released");

        if woken > 0 {
            self.schedule(lock);
        }
        Ok(())
    }

    /// Check whether the completion has been signalled.
    pub fn completion_is_done(&self, id: CompletionId) -> Result<bool, KernelError> {
        let mut lock = self.lock_cpu()?;
        let st = self.state(&mut lock);
        Ok(st
            .completions
            .get(id.0)
            .ok_or(KernelError::InvalidArgument)?
            .done)
    }
}
