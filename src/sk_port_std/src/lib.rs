//! Simulation environment for running `sk_kernel` on a hosted environment
//!
//! [`SimPort`] implements the kernel's port traits without running any thread
//! code. Interrupt masking is a flag, a context switch only records which
//! saved stack pointer was switched in, and memory comes from the host heap.
//! A test drives the kernel by calling its API "as" whichever thread the
//! kernel reports as running, and by calling [`Kernel::tick_increase`] in
//! place of a timer interrupt.
//!
//! Because the simulated context switch returns at once, a blocking call made
//! by a thread that gets switched out returns
//! [`KernelError::Suspended`](sk_kernel::KernelError::Suspended). Its final
//! outcome is collected with [`Kernel::take_wait_result`]. The [`host`] module
//! provides a port that runs thread code on host threads instead, so blocking
//! calls return their real outcome.
//!
//! ```
//! use sk_kernel::{Kernel, ThreadState};
//!
//! let kernel = sk_port_std::new_kernel();
//! pin_utils::pin_mut!(kernel);
//! let worker = kernel.thread_create("worker", |_| {}, 0, 1024, 10, 5).unwrap();
//! kernel.thread_startup(worker).unwrap();
//! kernel.as_ref().start().unwrap();
//! assert_eq!(kernel.current_thread(), Some(worker));
//!
//! kernel.thread_sleep(3).unwrap_err();
//! assert_eq!(kernel.thread_state(worker).unwrap(), ThreadState::Suspended);
//! for _ in 0..3 {
//!     kernel.tick_increase().unwrap();
//! }
//! assert_eq!(kernel.current_thread(), Some(worker));
//! assert_eq!(kernel.take_wait_result(worker), Some(Ok(())));
//! ```
#![deny(unsafe_op_in_unsafe_fn)]
use sk_kernel::{ExitRoutine, Kernel, PortAllocator, PortThreading, ThreadEntry};
use spin::Mutex as SpinMutex;
use std::{alloc::Layout, ptr::NonNull};

pub mod frame;
pub mod host;

/// Used by tests
#[doc(hidden)]
pub extern crate env_logger;

/// A recorded context switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Switch {
    /// The saved stack pointer of the outgoing thread. `None` for the first
    /// dispatch.
    pub from_sp: Option<usize>,
    /// The stack pointer of the incoming thread.
    pub to_sp: usize,
}

#[derive(Debug, Default)]
struct Cpu {
    /// Interrupts are masked.
    masked: bool,
    /// The number of outstanding `disable_interrupts` calls.
    depth: usize,
    switches: Vec<Switch>,
    idle_waits: usize,
}

#[derive(Debug, Default)]
pub(crate) struct Heap {
    /// The number of bytes in use.
    in_use: usize,
    /// The number of live allocations.
    live: usize,
    /// The upper bound of `in_use`. `None` means unlimited.
    limit: Option<usize>,
}

impl Heap {
    pub(crate) fn alloc(&mut self, layout: Layout) -> Option<NonNull<u8>> {
        let in_use = self.in_use.checked_add(layout.size())?;
        if self.limit.map_or(false, |limit| in_use > limit) {
            log::debug!("allocation of {} bytes refused", layout.size());
            return None;
        }
        if layout.size() == 0 {
            return None;
        }

        // Safety: `layout` has a non-zero size
        let ptr = NonNull::new(unsafe { std::alloc::alloc(layout) })?;
        self.in_use = in_use;
        self.live += 1;
        Some(ptr)
    }

    /// # Safety
    ///
    /// `ptr` must have been returned by `self.alloc(layout)` and not freed
    /// yet.
    pub(crate) unsafe fn free(&mut self, ptr: NonNull<u8>, layout: Layout) {
        self.in_use -= layout.size();
        self.live -= 1;
        // Safety: Upheld by the caller
        unsafe { std::alloc::dealloc(ptr.as_ptr(), layout) };
    }
}

/// A port that simulates a single-core processor on the host.
#[derive(Debug, Default)]
pub struct SimPort {
    cpu: SpinMutex<Cpu>,
    heap: SpinMutex<Heap>,
}

impl SimPort {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check whether interrupts are masked.
    pub fn is_masked(&self) -> bool {
        self.cpu.lock().masked
    }

    /// Get the number of outstanding `disable_interrupts` calls.
    pub fn mask_depth(&self) -> usize {
        self.cpu.lock().depth
    }

    /// Get every context switch recorded so far, oldest first.
    pub fn switches(&self) -> Vec<Switch> {
        self.cpu.lock().switches.clone()
    }

    /// Get the number of recorded context switches.
    pub fn switch_count(&self) -> usize {
        self.cpu.lock().switches.len()
    }

    /// Get the number of times the processor was put to sleep.
    pub fn idle_waits(&self) -> usize {
        self.cpu.lock().idle_waits
    }

    /// Limit the heap to `limit` bytes in use. Allocations that would exceed
    /// it fail.
    pub fn set_heap_limit(&self, limit: Option<usize>) {
        self.heap.lock().limit = limit;
    }

    /// Get the number of heap bytes in use.
    pub fn heap_in_use(&self) -> usize {
        self.heap.lock().in_use
    }

    /// Get the number of live heap allocations.
    pub fn live_allocations(&self) -> usize {
        self.heap.lock().live
    }

    fn record_switch(&self, from_sp: Option<usize>, to_sp: usize) {
        let mut cpu = self.cpu.lock();
        assert!(cpu.masked, "context switch with interrupts unmasked");
        log::trace!("context switch: {from_sp:?} -> {to_sp:#x}");
        cpu.switches.push(Switch { from_sp, to_sp });
    }
}

unsafe impl PortThreading for SimPort {
    /// Whether interrupts were masked before the call.
    type InterruptState = bool;

    fn disable_interrupts(&self) -> bool {
        let mut cpu = self.cpu.lock();
        let was_masked = cpu.masked;
        cpu.masked = true;
        cpu.depth += 1;
        was_masked
    }

    unsafe fn restore_interrupts(&self, state: bool) {
        let mut cpu = self.cpu.lock();
        assert!(cpu.depth > 0, "unbalanced restore_interrupts");
        cpu.depth -= 1;
        cpu.masked = state;
    }

    unsafe fn context_switch(&self, from_sp: *mut usize, to_sp: *const usize) {
        // Safety: The kernel passes live stack pointer slots
        let (from, to) = unsafe { (*from_sp, *to_sp) };
        self.record_switch(Some(from), to);
    }

    unsafe fn context_switch_to(&self, to_sp: *const usize) {
        // Safety: The kernel passes a live stack pointer slot
        let to = unsafe { *to_sp };
        self.record_switch(None, to);
    }

    unsafe fn build_initial_frame(
        &self,
        entry: ThreadEntry,
        arg: usize,
        stack_top: NonNull<u8>,
        exit: ExitRoutine,
    ) -> usize {
        // Safety: Upheld by the caller. The kernel aligns stacks to 16 bytes.
        unsafe { frame::build(entry, arg, stack_top, exit) }
    }

    fn wait_for_interrupt(&self) {
        self.cpu.lock().idle_waits += 1;
    }
}

unsafe impl PortAllocator for SimPort {
    fn alloc(&self, layout: Layout) -> Option<NonNull<u8>> {
        self.heap.lock().alloc(layout)
    }

    unsafe fn free(&self, ptr: NonNull<u8>, layout: Layout) {
        // Safety: Upheld by the caller
        unsafe { self.heap.lock().free(ptr, layout) };
    }
}

/// The exit routine given to kernels on [`SimPort`]. Simulated threads never
/// run, so this is never reached.
pub fn exit_thread() -> ! {
    panic!("a simulated thread returned from its entry point")
}

/// Construct a kernel on a fresh [`SimPort`].
pub fn new_kernel() -> Kernel<SimPort> {
    Kernel::new(SimPort::new(), exit_thread)
}

/// Install `env_logger`. Later calls do nothing.
pub fn init_logger() {
    let _ = env_logger::try_init();
}
