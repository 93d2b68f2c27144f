//! Compile-time kernel configuration
//!
//! The kernel is sized statically: every kind of control block lives in a
//! fixed-capacity pool whose capacity is given here.

/// The number of priority levels. Priority `0` is the most urgent.
pub const PRIORITY_MAX: usize = 32;

/// The priority of the idle thread, the least urgent level. Other threads may
/// share it.
pub const IDLE_PRIORITY: u8 = (PRIORITY_MAX - 1) as u8;

/// The tick frequency assumed by [`Kernel::tick_from_ms`].
///
/// [`Kernel::tick_from_ms`]: crate::Kernel::tick_from_ms
pub const TICK_PER_SECOND: u32 = 100;

/// The maximum length of an object name in bytes. Longer names are truncated
/// at a character boundary.
pub const NAME_MAX: usize = 16;

/// The maximum recursive hold depth of a mutex.
pub const MUTEX_HOLD_MAX: u8 = 0xff;

/// The maximum value of a semaphore counter.
pub const SEM_VALUE_MAX: u16 = u16::MAX;

/// Thread control block capacity, including the idle thread.
pub const MAX_THREADS: usize = 32;

/// Software timer capacity. Every thread consumes one timer for its timeouts.
pub const MAX_TIMERS: usize = 64;

pub const MAX_MUTEXES: usize = 16;
pub const MAX_SEMAPHORES: usize = 16;
pub const MAX_EVENT_GROUPS: usize = 16;
pub const MAX_MAILBOXES: usize = 8;
pub const MAX_MSG_QUEUES: usize = 8;
pub const MAX_COMPLETIONS: usize = 16;

/// Stack size of the idle thread in bytes.
pub const IDLE_STACK_SIZE: usize = 1024;

/// The smallest stack a thread may be created with.
pub const MIN_STACK_SIZE: usize = 256;

/// Alignment of every thread stack.
pub const STACK_ALIGN: usize = 16;

/// Time slice of the idle thread in ticks.
pub const IDLE_TIME_SLICE: u32 = 32;

/// A timeout value that waits indefinitely.
pub const WAIT_FOREVER: i32 = -1;

/// A timeout value that never blocks.
pub const NO_WAIT: i32 = 0;

/// The longest timer duration or sleep in ticks. Deadlines are compared
/// modulo 2^32, so a longer interval would look like one already
/// past.
pub const TICK_DURATION_MAX: u32 = i32::MAX as u32;
