//! Mailboxes
//!
//! A mailbox is a ring buffer of machine words with separate wait lists for
//! blocked senders and blocked receivers.
//!
//! A blocked sender or receiver is woken when the other side makes room or
//! delivers a message. The woken call then checks the mailbox once more: a
//! sender that still finds it full returns `Full`, and a receiver that still
//! finds it empty returns `Timeout`.
use core::{alloc::Layout, ptr::NonNull};

use crate::{
    cfg::NO_WAIT,
    error::KernelError,
    port::Port,
    state::Kernel,
    utils::{intrusive_list::ListHead, make_name, Name},
    wait::{send_wait_error, QueuePolicy, WaitQueue},
};

define_id! {
    /// Identifies a mailbox.
    pub struct MailboxId;
}

/// Mailbox control block.
pub(crate) struct MailboxCb {
    pub(crate) name: Name,
    buf: NonNull<usize>,
    layout: Layout,
    size: usize,
    entry: usize,
    in_offset: usize,
    out_offset: usize,
    pub(crate) policy: QueuePolicy,
    pub(crate) recv_wait: ListHead,
    pub(crate) send_wait: ListHead,
}

impl MailboxCb {
    fn is_full(&self) -> bool {
        self.entry == self.size
    }

    fn push(&mut self, value: usize) {
        debug_assert!(!self.is_full());
        // Safety: `in_offset < size` and `buf` holds `size` words
        unsafe { self.buf.as_ptr().add(self.in_offset).write(value) };
        self.in_offset = (self.in_offset + 1) % self.size;
        self.entry += 1;
    }

    fn pop(&mut self) -> Option<usize> {
        if self.entry == 0 {
            return None;
        }
        // Safety: `out_offset < size` and the slot was written by `push`
        let value = unsafe { self.buf.as_ptr().add(self.out_offset).read() };
        self.out_offset = (self.out_offset + 1) % self.size;
        self.entry -= 1;
        Some(value)
    }
}

impl<P: Port> Kernel<P> {
    /// Create a mailbox holding up to `size` messages.
    pub fn mailbox_init(
        &self,
        name: &str,
        size: usize,
        policy: QueuePolicy,
    ) -> Result<MailboxId, KernelError> {
        if size == 0 {
            return Err(KernelError::InvalidArgument);
        }
        let layout = Layout::array::<usize>(size).map_err(|_| KernelError::InvalidArgument)?;
        let buf = self.port.alloc(layout).ok_or(KernelError::NoMemory)?;

        let mut lock = self.lock_cpu()?;
        let st = self.state(&mut lock);
        let cb = MailboxCb {
            name: make_name(name),
            buf: buf.cast(),
            layout,
            size,
            entry: 0,
            in_offset: 0,
            out_offset: 0,
            policy,
            recv_wait: ListHead::new(),
            send_wait: ListHead::new(),
        };
        match st.mailboxes.insert(cb) {
            Ok(id) => {
                log::debug!("mailbox {id:?} ({name}) created with {size} slots");
                Ok(MailboxId(id))
            }
            Err(_) => {
                // Safety: `buf` came from `alloc(layout)` just above
                unsafe { self.port.free(buf, layout) };
                Err(KernelError::NoMemory)
            }
        }
    }

    /// Destroy a mailbox. Every blocked sender and receiver is woken with
    /// `Error`.
    pub fn mailbox_delete(&self, id: MailboxId) -> Result<(), KernelError> {
        let mut lock = self.lock_cpu()?;
        let st = self.state(&mut lock);
        if !st.mailboxes.contains(id.0) {
            return Err(KernelError::InvalidArgument);
        }
        let idx = id.0.index();
        let woken_recv = st.resume_all(WaitQueue::MailboxRecv(idx));
        let woken_send = st.resume_all(WaitQueue::MailboxSend(idx));
        if let Some(mb) = st.mailboxes.remove(id.0) {
            // Safety: `buf` was allocated by `mailbox_init`
            unsafe { self.port.free(mb.buf.cast(), mb.layout) };
        }
        log::debug!("mailbox {id:?} deleted");

        if woken_recv || woken_send {
            self.schedule(lock);
        }
        Ok(())
    }

    /// Post `value`, waiting up to `timeout` ticks for room. Returns `Full`
    /// if there is still no room when the wait ends.
    pub fn mailbox_send_wait(
        &self,
        id: MailboxId,
        value: usize,
        timeout: i32,
    ) -> Result<(), KernelError> {
        let mut lock = self.lock_cpu()?;
        let st = self.state(&mut lock);
        let mb = st.mailboxes.get(id.0).ok_or(KernelError::InvalidArgument)?;

        if mb.is_full() {
            if timeout == NO_WAIT {
                return Err(KernelError::Full);
            }
            let policy = mb.policy;
            self.wait_current(lock, WaitQueue::MailboxSend(id.0.index()), policy, timeout)
                .map_err(send_wait_error)?;

            lock = self.lock_cpu()?;
        }

        let st = self.state(&mut lock);
        let mb = st.mailboxes.get_mut(id.0).ok_or(KernelError::Error)?;
        if mb.is_full() {
            return Err(KernelError::Full);
        }
        mb.push(value);

        if st
            .wake_first(WaitQueue::MailboxRecv(id.0.index()), Ok(()))
            .is_some()
        {
            self.schedule(lock);
        }
        Ok(())
    }

    /// Post `value` without waiting. Equivalent to
    /// `mailbox_send_wait(id, value, 0)`.
    pub fn mailbox_send(&self, id: MailboxId, value: usize) -> Result<(), KernelError> {
        self.mailbox_send_wait(id, value, NO_WAIT)
    }

    /// Take the oldest message, waiting up to `timeout` ticks for one.
    pub fn mailbox_recv(&self, id: MailboxId, timeout: i32) -> Result<usize, KernelError> {
        let mut lock = self.lock_cpu()?;
        let st = self.state(&mut lock);
        let mb = st.mailboxes.get(id.0).ok_or(KernelError::InvalidArgument)?;

        if mb.entry == 0 {
            if timeout == NO_WAIT {
                return Err(KernelError::Timeout);
            }
            let policy = mb.policy;
            self.wait_current(lock, WaitQueue::MailboxRecv(id.0.index()), policy, timeout)?;

            lock = self.lock_cpu()?;
        }

        let st = self.state(&mut lock);
        let mb = st.mailboxes.get_mut(id.0).ok_or(KernelError::Error)?;
        let value = mb.pop().ok_or(KernelError::Timeout)?;

        if st
            .wake_first(WaitQueue::MailboxSend(id.0.index()), Ok(()))
            .is_some()
        {
            self.schedule(lock);
        }
        Ok(value)
    }

    /// Get the number of queued messages.
    pub fn mailbox_entry(&self, id: MailboxId) -> Result<usize, KernelError> {
        let mut lock = self.lock_cpu()?;
        let st = self.state(&mut lock);
        Ok(st.mailboxes.get(id.0).ok_or(KernelError::InvalidArgument)?.entry)
    }

    pub fn mailbox_name(&self, id: MailboxId) -> Result<Name, KernelError> {
        let mut lock = self.lock_cpu()?;
        let st = self.state(&mut lock);
        Ok(st.mailboxes.get(id.0).ok_or(KernelError::InvalidArgument)?.name)
    }
}
