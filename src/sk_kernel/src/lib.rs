#![doc = include_str!("./lib.md")]
#![deny(unsafe_op_in_unsafe_fn)]
#![cfg_attr(not(test), no_std)] // Link `std` only when building a test (`cfg(test)`)

#[macro_use]
pub mod utils;

pub mod cfg;
mod completion;
mod error;
mod event_group;
mod klock;
mod mailbox;
mod msg_queue;
mod mutex;
mod port;
mod semaphore;
mod state;
mod thread;
mod timer;
mod wait;

pub use self::{
    completion::CompletionId,
    error::{result_code, KernelError},
    event_group::{EventGroupId, EventOption},
    mailbox::MailboxId,
    msg_queue::MsgQueueId,
    mutex::MutexId,
    port::{ExitRoutine, Port, PortAllocator, PortExclusive, PortThreading, ThreadEntry},
    semaphore::SemaphoreId,
    state::Kernel,
    thread::{CleanupFn, ThreadId, ThreadState},
    timer::{ControlReply, TimerCallback, TimerCommand, TimerId, TimerMode},
    utils::Name,
    wait::QueuePolicy,
};
