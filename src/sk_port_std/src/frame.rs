//! AArch64 initial exception frame
//!
//! The frame mirrors what the context switcher of an AArch64 target pops on
//! the way to `eret`: the return address and saved program status first, then
//! the link register, then the general purpose registers in pairs, highest
//! pair first.
//!
//! ```text
//!   stack_top ─► ┌───────────┐
//!                │ x1  │ x0  │  x0 = arg
//!                │ x3  │ x2  │
//!                │    ...    │
//!                │ x29 │ x28 │
//!                │ xzr │ x30 │  x30 = exit
//!          sp ─► │spsr │ elr │  elr = entry
//!                └───────────┘
//! ```
use core::{mem, ptr::NonNull};
use sk_kernel::{ExitRoutine, ThreadEntry};

/// `SPSR_EL1` for a new thread: EL1 with `SP_EL0`, interrupts unmasked.
pub const INITIAL_SPSR_EL1: usize = 0x04;

/// The register image written by [`build`].
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitialFrame {
    pub elr: usize,
    pub spsr: usize,
    pub x30: usize,
    pub xzr: usize,
    /// `(x28, x29)`, `(x26, x27)`, ..., `(x0, x1)`
    pub pairs: [(usize, usize); 15],
}

impl InitialFrame {
    /// Get `xN` for `n < 30`.
    pub fn x(&self, n: usize) -> usize {
        let (even, odd) = self.pairs[14 - n / 2];
        if n % 2 == 0 {
            even
        } else {
            odd
        }
    }
}

/// The size of [`InitialFrame`] in bytes. A multiple of 16, so the stack stays
/// aligned.
pub const FRAME_SIZE: usize = mem::size_of::<InitialFrame>();

const _: () = assert!(FRAME_SIZE % 16 == 0);

/// Write an initial frame below `stack_top` and return the new stack pointer.
///
/// # Safety
///
/// The [`FRAME_SIZE`] bytes below `stack_top` must be writable, and
/// `stack_top` must be aligned to [`InitialFrame`].
pub unsafe fn build(
    entry: ThreadEntry,
    arg: usize,
    stack_top: NonNull<u8>,
    exit: ExitRoutine,
) -> usize {
    let mut pairs = [(0, 0); 15];
    pairs[14].0 = arg;

    let frame = InitialFrame {
        elr: entry as usize,
        spsr: INITIAL_SPSR_EL1,
        x30: exit as usize,
        xzr: 0,
        pairs,
    };

    // Safety: Upheld by the caller
    unsafe {
        let sp = stack_top.as_ptr().sub(FRAME_SIZE).cast::<InitialFrame>();
        sp.write(frame);
        sp as usize
    }
}

/// Read back the frame at `sp`.
///
/// # Safety
///
/// `sp` must be a stack pointer returned by [`build`] whose stack is still
/// allocated.
pub unsafe fn read(sp: usize) -> InitialFrame {
    // Safety: Upheld by the caller
    unsafe { (sp as *const InitialFrame).read() }
}
