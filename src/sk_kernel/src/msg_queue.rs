//! Message queues
//!
//! A message queue carries byte messages of up to `msg_size` bytes. Its
//! storage is one block from the port allocator, divided into `max_msgs`
//! nodes. Each node is a [`NodeHeader`] followed by the payload. Free nodes
//! form a stack; queued nodes form a FIFO with head and tail indices.
//!
//! Blocking follows the mailbox rules: a woken sender or receiver checks the
//! queue once more and fails with `Full` or `Timeout` if it lost the race.
use core::{alloc::Layout, mem, ptr::NonNull};

use crate::{
    cfg::NO_WAIT,
    error::KernelError,
    port::Port,
    state::Kernel,
    utils::{intrusive_list::ListHead, make_name, Name},
    wait::{send_wait_error, QueuePolicy, WaitQueue},
};

define_id! {
    /// Identifies a message queue.
    pub struct MsgQueueId;
}

/// Marks the end of a node chain.
const NIL: usize = usize::MAX;

#[repr(C)]
#[derive(Clone, Copy)]
struct NodeHeader {
    next: usize,
    len: usize,
}

/// Message queue control block.
pub(crate) struct MsgQueueCb {
    pub(crate) name: Name,
    pool: NonNull<u8>,
    layout: Layout,
    msg_size: usize,
    max_msgs: usize,
    /// The distance between two nodes in bytes.
    stride: usize,
    head: usize,
    tail: usize,
    free: usize,
    entry: usize,
    pub(crate) policy: QueuePolicy,
    pub(crate) recv_wait: ListHead,
    pub(crate) send_wait: ListHead,
}

impl MsgQueueCb {
    /// Get the header of node `i`.
    ///
    /// # Safety
    ///
    /// `i < max_msgs`
    unsafe fn header(&self, i: usize) -> *mut NodeHeader {
        debug_assert!(i < self.max_msgs);
        unsafe { self.pool.as_ptr().add(i * self.stride).cast() }
    }

    /// Get the payload of node `i`.
    ///
    /// # Safety
    ///
    /// `i < max_msgs`
    unsafe fn payload(&self, i: usize) -> *mut u8 {
        unsafe { self.pool.as_ptr().add(i * self.stride + mem::size_of::<NodeHeader>()) }
    }

    /// Thread every node onto the free list.
    fn format(&mut self) {
        self.free = NIL;
        for i in 0..self.max_msgs {
            // Safety: `i < max_msgs`, and the header is aligned because
            //         `stride` is a multiple of its alignment
            unsafe {
                self.header(i).write(NodeHeader {
                    next: self.free,
                    len: 0,
                })
            };
            self.free = i;
        }
        self.head = NIL;
        self.tail = NIL;
        self.entry = 0;
    }

    fn has_free(&self) -> bool {
        self.free != NIL
    }

    fn push(&mut self, msg: &[u8]) {
        debug_assert!(msg.len() <= self.msg_size);
        let node = self.free;
        debug_assert_ne!(node, NIL);
        // Safety: `node` came from the free list, so it is in range. The
        //         payload area holds `msg_size` bytes.
        unsafe {
            let header = self.header(node);
            self.free = (*header).next;
            header.write(NodeHeader {
                next: NIL,
                len: msg.len(),
            });
            core::ptr::copy_nonoverlapping(msg.as_ptr(), self.payload(node), msg.len());

            if self.tail == NIL {
                self.head = node;
            } else {
                (*self.header(self.tail)).next = node;
            }
        }
        self.tail = node;
        self.entry += 1;
    }

    /// Pop the oldest message into `buf`. Returns the copied length.
    fn pop(&mut self, buf: &mut [u8]) -> Option<usize> {
        let node = self.head;
        if node == NIL {
            return None;
        }
        // Safety: `node` is on the queue, so it is in range
        unsafe {
            let header = self.header(node);
            let NodeHeader { next, len } = header.read();
            let n = len.min(buf.len());
            core::ptr::copy_nonoverlapping(self.payload(node), buf.as_mut_ptr(), n);

            self.head = next;
            if self.tail == node {
                self.tail = NIL;
            }
            (*header).next = self.free;
            self.free = node;
            self.entry -= 1;
            Some(n)
        }
    }
}

impl<P: Port> Kernel<P> {
    /// Create a message queue holding up to `max_msgs` messages of at most
    /// `msg_size` bytes each.
    pub fn msgqueue_init(
        &self,
        name: &str,
        msg_size: usize,
        max_msgs: usize,
        policy: QueuePolicy,
    ) -> Result<MsgQueueId, KernelError> {
        if msg_size == 0 || max_msgs == 0 {
            return Err(KernelError::InvalidArgument);
        }
        let align = mem::align_of::<NodeHeader>();
        let stride = (mem::size_of::<NodeHeader>() + msg_size)
            .checked_next_multiple_of(align)
            .ok_or(KernelError::InvalidArgument)?;
        let layout = stride
            .checked_mul(max_msgs)
            .and_then(|size| Layout::from_size_align(size, align).ok())
            .ok_or(KernelError::InvalidArgument)?;
        let pool = self.port.alloc(layout).ok_or(KernelError::NoMemory)?;

        let mut cb = MsgQueueCb {
            name: make_name(name),
            pool,
            layout,
            msg_size,
            max_msgs,
            stride,
            head: NIL,
            tail: NIL,
            free: NIL,
            entry: 0,
            policy,
            recv_wait: ListHead::new(),
            send_wait: ListHead::new(),
        };
        cb.format();

        let mut lock = self.lock_cpu()?;
        let st = self.state(&mut lock);
        match st.msg_queues.insert(cb) {
            Ok(id) => {
                log::debug!("message queue {id:?} ({name}) created: {max_msgs} x {msg_size} bytes");
                Ok(MsgQueueId(id))
            }
            Err(_) => {
                // Safety: `pool` came from `alloc(layout)` just above
                unsafe { self.port.free(pool, layout) };
                Err(KernelError::NoMemory)
            }
        }
    }

    /// Destroy a message queue. Every blocked sender and receiver is woken
    /// with `Error`.
    pub fn msgqueue_delete(&self, id: MsgQueueId) -> Result<(), KernelError> {
        let mut lock = self.lock_cpu()?;
        let st = self.state(&mut lock);
        if !st.msg_queues.contains(id.0) {
            return Err(KernelError::InvalidArgument);
        }
        let idx = id.0.index();
        let woken_recv = st.resume_all(WaitQueue::MsgQueueRecv(idx));
        let woken_send = st.resume_all(WaitQueue::MsgQueueSend(idx));
        if let Some(mq) = st.msg_queues.remove(id.0) {
            // Safety: `pool` was allocated by `msgqueue_init`
            unsafe { self.port.free(mq.pool, mq.layout) };
        }
        log::debug!("message queue {id:?} deleted");

        if woken_recv || woken_send {
            self.schedule(lock);
        }
        Ok(())
    }

    /// Queue a copy of `msg`, waiting up to `timeout` ticks for a free node.
    /// A message longer than `msg_size` is rejected with `Error`, and `Full`
    /// is returned if no node frees up in time.
    pub fn msgqueue_send_wait(
        &self,
        id: MsgQueueId,
        msg: &[u8],
        timeout: i32,
    ) -> Result<(), KernelError> {
        let mut lock = self.lock_cpu()?;
        let st = self.state(&mut lock);
        let mq = st.msg_queues.get(id.0).ok_or(KernelError::InvalidArgument)?;
        if msg.len() > mq.msg_size {
            return Err(KernelError::Error);
        }

        if !mq.has_free() {
            if timeout == NO_WAIT {
                return Err(KernelError::Full);
            }
            let policy = mq.policy;
            self.wait_current(lock, WaitQueue::MsgQueueSend(id.0.index()), policy, timeout)
                .map_err(send_wait_error)?;

            lock = self.lock_cpu()?;
        }

        let st = self.state(&mut lock);
        let mq = st.msg_queues.get_mut(id.0).ok_or(KernelError::Error)?;
        if !mq.has_free() {
            return Err(KernelError::Full);
        }
        mq.push(msg);

        if st
            .wake_first(WaitQueue::MsgQueueRecv(id.0.index()), Ok(()))
            .is_some()
        {
            self.schedule(lock);
        }
        Ok(())
    }

    /// Queue a copy of `msg` without waiting. Equivalent to
    /// `msgqueue_send_wait(id, msg, 0)`.
    pub fn msgqueue_send(&self, id: MsgQueueId, msg: &[u8]) -> Result<(), KernelError> {
        self.msgqueue_send_wait(id, msg, NO_WAIT)
    }

    /// Take the oldest message into `buf`, waiting up to `timeout` ticks for
    /// one. Returns the number of bytes copied, which is the smaller of the
    /// message length and `buf.len()`.
    pub fn msgqueue_recv(
        &self,
        id: MsgQueueId,
        buf: &mut [u8],
        timeout: i32,
    ) -> Result<usize, KernelError> {
        let mut lock = self.lock_cpu()?;
        let st = self.state(&mut lock);
        let mq = st.msg_queues.get(id.0).ok_or(KernelError::InvalidArgument)?;

        if mq.entry == 0 {
            if timeout == NO_WAIT {
                return Err(KernelError::Timeout);
            }
            let policy = mq.policy;
            self.wait_current(lock, WaitQueue::MsgQueueRecv(id.0.index()), policy, timeout)?;

            lock = self.lock_cpu()?;
        }

        let st = self.state(&mut lock);
        let mq = st.msg_queues.get_mut(id.0).ok_or(KernelError::Error)?;
        let n = mq.pop(buf).ok_or(KernelError::Timeout)?;

        if st
            .wake_first(WaitQueue::MsgQueueSend(id.0.index()), Ok(()))
            .is_some()
        {
            self.schedule(lock);
        }
        Ok(n)
    }

    /// Get the number of queued messages.
    pub fn msgqueue_entry(&self, id: MsgQueueId) -> Result<usize, KernelError> {
        let mut lock = self.lock_cpu()?;
        let st = self.state(&mut lock);
        Ok(st.msg_queues.get(id.0).ok_or(KernelError::InvalidArgument)?.entry)
    }

    pub fn msgqueue_name(&self, id: MsgQueueId) -> Result<Name, KernelError> {
        let mut lock = self.lock_cpu()?;
        let st = self.state(&mut lock);
        Ok(st.msg_queues.get(id.0).ok_or(KernelError::InvalidArgument)?.name)
    }
}
