//! Kernel state locking mechanism
use core::{
    fmt, ops,
    sync::atomic::{AtomicBool, Ordering},
};
use tokenlock::UnsyncTokenLock;

use crate::{error::KernelError, port::PortThreading};

pub(crate) struct CpuLockTag<P>(P);

/// The key that "unlocks" [`CpuLockCell`].
pub(crate) type CpuLockToken<P> = tokenlock::UnsyncSingletonToken<CpuLockTag<P>>;

/// The keyhole type for [`UnsyncTokenLock`] that can be "unlocked" by
/// [`CpuLockToken`].
pub(crate) type CpuLockKeyhole<P> = tokenlock::SingletonTokenId<CpuLockTag<P>>;

/// Cell type that can be accessed by [`CpuLockToken`] (which can be obtained
/// by [`lock_cpu`]).
pub(crate) struct CpuLockCell<P, T: ?Sized>(UnsyncTokenLock<T, CpuLockKeyhole<P>>);

impl<P, T> CpuLockCell<P, T> {
    pub(crate) const fn new(x: T) -> Self {
        Self(UnsyncTokenLock::new(CpuLockKeyhole::new(), x))
    }
}

impl<P, T> ops::Deref for CpuLockCell<P, T> {
    type Target = UnsyncTokenLock<T, CpuLockKeyhole<P>>;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<P, T: ?Sized> fmt::Debug for CpuLockCell<P, T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("CpuLockCell(..)")
    }
}

/// Attempt to enter a CPU Lock state and get an RAII guard.
/// Return `Busy` if the kernel is already in a CPU Lock state.
///
/// `active` is the kernel's record of whether CPU Lock is held. Interrupts are
/// masked before it is set, so an interrupt handler never observes a stale
/// `false`.
pub(crate) fn lock_cpu<'a, P: PortThreading>(
    port: &'a P,
    active: &'a AtomicBool,
) -> Result<CpuLockGuard<'a, P>, KernelError> {
    let saved = port.disable_interrupts();
    if active.load(Ordering::Relaxed) {
        // Safety: `saved` is the token we just got
        unsafe { port.restore_interrupts(saved) };
        return Err(KernelError::Busy);
    }
    active.store(true, Ordering::Relaxed);

    Ok(CpuLockGuard {
        port,
        active,
        saved,
        // Safety: We just entered a CPU Lock state. This also means there are
        //         no instances of `CpuLockGuard` for this kernel existing at
        //         this point.
        token: unsafe { CpuLockToken::new_unchecked() },
    })
}

/// RAII guard for a CPU Lock state.
///
/// [`CpuLockToken`] can be borrowed from this type.
pub(crate) struct CpuLockGuard<'a, P: PortThreading> {
    port: &'a P,
    active: &'a AtomicBool,
    saved: P::InterruptState,
    token: CpuLockToken<P>,
}

impl<'a, P: PortThreading> CpuLockGuard<'a, P> {
    /// Leave the CPU Lock state but keep interrupts masked. Returns the saved
    /// mask, which the caller restores with
    /// [`PortThreading::restore_interrupts`] after the context switch.
    ///
    /// A thread switched in for the first time starts with CPU Lock inactive,
    /// so the outgoing thread must not carry it across the switch.
    pub(crate) fn release_for_switch(self) -> P::InterruptState {
        let saved = self.saved;
        self.active.store(false, Ordering::Relaxed);
        core::mem::forget(self);
        saved
    }
}

impl<P: PortThreading> Drop for CpuLockGuard<'_, P> {
    fn drop(&mut self) {
        self.active.store(false, Ordering::Relaxed);
        // Safety: CPU Lock is currently active, and it's us (the kernel) who
        // are currently controlling the CPU Lock state
        unsafe {
            self.port.restore_interrupts(self.saved);
        }
    }
}

impl<P: PortThreading> ops::Deref for CpuLockGuard<'_, P> {
    type Target = CpuLockToken<P>;
    fn deref(&self) -> &Self::Target {
        &self.token
    }
}

impl<P: PortThreading> ops::DerefMut for CpuLockGuard<'_, P> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.token
    }
}
