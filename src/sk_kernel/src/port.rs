//! The interface between the kernel and the platform it runs on
use core::{alloc::Layout, ptr::NonNull};

/// The entry point of a thread. The `usize` is the argument given at creation.
pub type ThreadEntry = fn(usize);

/// The routine a thread falls through to when its entry point returns.
pub type ExitRoutine = fn() -> !;

/// Implemented by a port. Provides interrupt masking and context switching.
///
/// # Safety
///
/// These methods are only meant to be called by the kernel. The implementation
/// must mask every interrupt source that can call into the kernel while a
/// token returned by `disable_interrupts` is outstanding.
pub unsafe trait PortThreading {
    /// The saved interrupt mask returned by [`Self::disable_interrupts`].
    type InterruptState: Copy;

    /// Mask interrupts and return the previous mask state. Calls nest: each
    /// call must be paired with a [`Self::restore_interrupts`] call in reverse
    /// order.
    fn disable_interrupts(&self) -> Self::InterruptState;

    /// Restore the mask state saved by [`Self::disable_interrupts`].
    ///
    /// # Safety
    ///
    /// `state` must be the token from the most recent unrestored call.
    unsafe fn restore_interrupts(&self, state: Self::InterruptState);

    /// Save the register file of the running thread, store its stack pointer
    /// to `*from_sp`, and resume the thread whose stack pointer is `*to_sp`.
    /// Returns when the outgoing thread is switched back in.
    ///
    /// Interrupts are masked on entry.
    ///
    /// # Safety
    ///
    /// Both pointers must point to live stack pointer slots of the kernel's
    /// thread control blocks.
    unsafe fn context_switch(&self, from_sp: *mut usize, to_sp: *const usize);

    /// Resume the thread whose stack pointer is `*to_sp` without saving the
    /// current context. On hardware this does not return. A hosted simulator
    /// may return after recording the switch.
    ///
    /// # Safety
    ///
    /// See [`Self::context_switch`].
    unsafe fn context_switch_to(&self, to_sp: *const usize);

    /// Write an initial register image onto the stack ending at `stack_top`
    /// so that switching into it calls `entry(arg)`, and `exit()` if `entry`
    /// returns. Returns the initial stack pointer.
    ///
    /// # Safety
    ///
    /// `stack_top` must be the end of a writable region large enough for the
    /// frame.
    unsafe fn build_initial_frame(
        &self,
        entry: ThreadEntry,
        arg: usize,
        stack_top: NonNull<u8>,
        exit: ExitRoutine,
    ) -> usize;

    /// Halt the processor until an interrupt arrives.
    fn wait_for_interrupt(&self) {}
}

/// Implemented by a port. Provides the memory that backs thread stacks and
/// message buffers.
///
/// # Safety
///
/// `alloc` must return a region that is valid for `layout` and not aliased
/// until it is passed to `free`.
pub unsafe trait PortAllocator {
    /// Allocate a region. `None` is an ordinary failure.
    fn alloc(&self, layout: Layout) -> Option<NonNull<u8>>;

    /// Release a region.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by `alloc(layout)` and not freed yet.
    unsafe fn free(&self, ptr: NonNull<u8>, layout: Layout);
}

/// Implemented by a port whose kernel may be shared between host threads.
///
/// Required for `Kernel<P>: Sync`. A port that runs on a single processor
/// and masks every interrupt source in `disable_interrupts` satisfies it
/// trivially.
///
/// # Safety
///
/// Kernel code must run on at most one thread of execution at a time.
/// `disable_interrupts` must not return on any thread other than the one
/// that owns the (real or emulated) processor. Ownership may change hands
/// only inside [`PortThreading::context_switch`] and
/// [`PortThreading::context_switch_to`], or when the owner leaves kernel code
/// for good.
pub unsafe trait PortExclusive: PortThreading {}

/// The complete set of traits a port implements.
pub trait Port: PortThreading + PortAllocator + 'static {}

impl<T: PortThreading + PortAllocator + 'static> Port for T {}
