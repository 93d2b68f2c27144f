//! A port that runs every kernel thread on its own host thread
//!
//! [`HostPort`] emulates one processor shared by several host threads.
//! Exactly one of them owns the processor at a time. A context switch hands
//! it to the host thread backing the incoming kernel thread, spawning that
//! thread on first use, and parks the outgoing one until it is switched back
//! in. A blocking call therefore returns only after its caller has been
//! rescheduled, with the outcome decided by whoever woke it.
//!
//! There is no timer interrupt. Each `wait_for_interrupt` of the idle thread
//! delivers one tick, so virtual time advances exactly while every other
//! thread is blocked.
//!
//! ```
//! use sk_port_std::host;
//!
//! fn worker(_: usize) {
//!     let k = host::current_kernel();
//!     k.thread_sleep(5).unwrap();
//!     assert_eq!(k.tick_get().unwrap(), 5);
//!     k.port().shutdown();
//! }
//!
//! let k = host::run(|k| {
//!     let t = k.thread_create("worker", worker, 0, 4096, 10, 5).unwrap();
//!     k.thread_startup(t).unwrap();
//! });
//! assert_eq!(k.tick_get().unwrap(), 5);
//! ```
use sk_kernel::{ExitRoutine, Kernel, PortAllocator, PortExclusive, PortThreading, ThreadEntry};
use spin::Mutex as SpinMutex;
use std::{
    alloc::Layout,
    any::Any,
    cell::Cell,
    panic::{self, AssertUnwindSafe},
    pin::Pin,
    ptr::NonNull,
    sync::Arc,
    thread::{self, JoinHandle},
};

use crate::Heap;

/// The number of ticks the idle thread delivers before the run is declared
/// stuck.
pub const IDLE_TICK_LIMIT: u32 = 100_000;

/// The panic payload that unwinds parked host threads at shutdown.
struct Shutdown;

thread_local! {
    /// The kernel served by the current host thread. Set on the boot thread
    /// by [`run`] and inherited by every host thread the port spawns.
    static KERNEL: Cell<Option<&'static Kernel<HostPort>>> = const { Cell::new(None) };
}

struct Slot {
    entry: ThreadEntry,
    arg: usize,
    exit: ExitRoutine,
    /// The backing host thread. Spawned at the first switch into the slot.
    host: Option<thread::Thread>,
}

struct Sched {
    /// The thread that created the port. It owns the processor before the
    /// kernel starts and after the run ends.
    boot: thread::Thread,
    /// The slot that owns the processor. `None` while the boot thread does.
    running: Option<usize>,
    slots: Vec<Slot>,
    joins: Vec<JoinHandle<()>>,
    masked: bool,
    shutdown: bool,
    /// The first panic raised on a kernel thread.
    panic: Option<Box<dyn Any + Send>>,
    idle_ticks: u32,
}

impl Sched {
    fn owner(&self) -> Option<thread::ThreadId> {
        match self.running {
            Some(slot) => self.slots.get(slot)?.host.as_ref().map(|t| t.id()),
            None => Some(self.boot.id()),
        }
    }
}

struct Shared {
    sched: SpinMutex<Sched>,
}

impl Shared {
    /// Give the processor to `to`. Called by the owner.
    fn switch_to(self: &Arc<Self>, to: usize) {
        let mut sched = self.sched.lock();
        assert!(sched.masked, "context switch with interrupts unmasked");
        if sched.shutdown {
            return;
        }
        log::trace!("host switch: {:?} -> {to}", sched.running);
        sched.running = Some(to);

        let Some(slot) = sched.slots.get(to) else {
            panic!("no thread frame {to}");
        };
        if let Some(host) = &slot.host {
            host.unpark();
            return;
        }

        let (entry, arg, exit) = (slot.entry, slot.arg, slot.exit);
        let shared = Arc::clone(self);
        let kernel = KERNEL.with(Cell::get);
        let join = thread::Builder::new()
            .name(format!("sk-thread-{to}"))
            .spawn(move || shared.run_slot(to, kernel, entry, arg, exit));
        let join = match join {
            Ok(join) => join,
            Err(e) => panic!("failed to spawn a host thread: {e}"),
        };
        log::trace!("spawned {:?} for thread frame {to}", join.thread().id());
        sched.slots[to].host = Some(join.thread().clone());
        sched.joins.push(join);
    }

    /// Park until `slot` owns the processor. Returns `false` if the run is
    /// shutting down instead.
    fn wait_turn(&self, slot: usize) -> bool {
        loop {
            {
                let sched = self.sched.lock();
                if sched.shutdown {
                    return false;
                }
                if sched.running == Some(slot) {
                    return true;
                }
            }
            thread::park();
        }
    }

    fn wait_shutdown(&self) {
        while !self.sched.lock().shutdown {
            thread::park();
        }
    }

    /// Hand the processor back to the boot thread and wake every parked host
    /// thread so that it unwinds.
    fn begin_shutdown(&self) {
        let mut sched = self.sched.lock();
        if sched.shutdown {
            return;
        }
        log::debug!("shutting down");
        sched.shutdown = true;
        sched.running = None;
        sched.boot.unpark();
        for host in sched.slots.iter().filter_map(|s| s.host.as_ref()) {
            host.unpark();
        }
    }

    /// The body of a backing host thread.
    fn run_slot(
        &self,
        slot: usize,
        kernel: Option<&'static Kernel<HostPort>>,
        entry: ThreadEntry,
        arg: usize,
        exit: ExitRoutine,
    ) {
        KERNEL.with(|k| k.set(kernel));
        if !self.wait_turn(slot) {
            return;
        }
        // A thread starts with interrupts enabled
        self.sched.lock().masked = false;

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            entry(arg);
            exit();
        }));

        if let Err(payload) = result {
            if payload.is::<Shutdown>() {
                return;
            }
            log::debug!("thread frame {slot} panicked");
            {
                let mut sched = self.sched.lock();
                if sched.panic.is_none() {
                    sched.panic = Some(payload);
                }
            }
            self.begin_shutdown();
        }
    }
}

/// A port that runs every kernel thread on a host thread.
pub struct HostPort {
    shared: Arc<Shared>,
    heap: SpinMutex<Heap>,
}

impl HostPort {
    /// Construct a port owned by the calling thread.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                sched: SpinMutex::new(Sched {
                    boot: thread::current(),
                    running: None,
                    slots: Vec::new(),
                    joins: Vec::new(),
                    masked: false,
                    shutdown: false,
                    panic: None,
                    idle_ticks: 0,
                }),
            }),
            heap: SpinMutex::new(Heap::default()),
        }
    }

    /// End the run. Must be called by a kernel thread outside any kernel call.
    /// The caller unwinds, and [`run`] returns once every host thread has
    /// stopped.
    pub fn shutdown(&self) -> ! {
        let owner = self.shared.sched.lock().owner();
        assert_eq!(
            owner,
            Some(thread::current().id()),
            "shutdown requested by a host thread that does not own the processor"
        );
        self.shared.begin_shutdown();
        panic::resume_unwind(Box::new(Shutdown))
    }

    /// Get the number of ticks delivered by the idle thread.
    pub fn idle_ticks(&self) -> u32 {
        self.shared.sched.lock().idle_ticks
    }

    /// Get the number of live heap allocations.
    pub fn live_allocations(&self) -> usize {
        self.heap.lock().live
    }

    fn take_panic(&self) -> Option<Box<dyn Any + Send>> {
        self.shared.sched.lock().panic.take()
    }
}

impl Default for HostPort {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl PortThreading for HostPort {
    /// Whether interrupts were masked before the call.
    type InterruptState = bool;

    fn disable_interrupts(&self) -> bool {
        let mut sched = self.shared.sched.lock();
        if sched.owner() != Some(thread::current().id()) {
            drop(sched);
            panic!("kernel entered from a host thread that does not own the processor");
        }
        std::mem::replace(&mut sched.masked, true)
    }

    unsafe fn restore_interrupts(&self, state: bool) {
        self.shared.sched.lock().masked = state;
    }

    unsafe fn context_switch(&self, from_sp: *mut usize, to_sp: *const usize) {
        // Safety: The kernel passes live stack pointer slots
        let (from, to) = unsafe { (*from_sp, *to_sp) };
        self.shared.switch_to(to);
        if !self.shared.wait_turn(from) {
            panic::resume_unwind(Box::new(Shutdown));
        }
    }

    unsafe fn context_switch_to(&self, to_sp: *const usize) {
        // Safety: The kernel passes a live stack pointer slot
        let to = unsafe { *to_sp };
        self.shared.switch_to(to);
        self.shared.wait_shutdown();

        let joins = std::mem::take(&mut self.shared.sched.lock().joins);
        for join in joins {
            // Panics were caught and recorded by `run_slot`
            let _ = join.join();
        }
        log::debug!("every host thread has stopped");
    }

    unsafe fn build_initial_frame(
        &self,
        entry: ThreadEntry,
        arg: usize,
        _stack_top: NonNull<u8>,
        exit: ExitRoutine,
    ) -> usize {
        // The frame lives in the port. The stack is left untouched.
        let mut sched = self.shared.sched.lock();
        sched.slots.push(Slot {
            entry,
            arg,
            exit,
            host: None,
        });
        sched.slots.len() - 1
    }

    fn wait_for_interrupt(&self) {
        {
            let mut sched = self.shared.sched.lock();
            sched.idle_ticks += 1;
            if sched.idle_ticks > IDLE_TICK_LIMIT {
                drop(sched);
                panic!("every thread stayed blocked for {IDLE_TICK_LIMIT} ticks");
            }
        }
        if let Some(kernel) = KERNEL.with(Cell::get) {
            if let Err(e) = kernel.tick_increase() {
                log::warn!("tick dropped: {e:?}");
            }
        }
    }
}

// Safety: `disable_interrupts` panics on every host thread but the owner.
//         Ownership passes only in `switch_to`, called by the owner from a
//         context switch, and in `begin_shutdown`, called by a host thread
//         that has left kernel code for good.
unsafe impl PortExclusive for HostPort {}

unsafe impl PortAllocator for HostPort {
    fn alloc(&self, layout: Layout) -> Option<NonNull<u8>> {
        self.heap.lock().alloc(layout)
    }

    unsafe fn free(&self, ptr: NonNull<u8>, layout: Layout) {
        // Safety: Upheld by the caller
        unsafe { self.heap.lock().free(ptr, layout) };
    }
}

/// Get the kernel served by the calling host thread.
///
/// # Panics
///
/// Panics if called outside a kernel thread and outside [`run`].
pub fn current_kernel() -> &'static Kernel<HostPort> {
    match KERNEL.with(Cell::get) {
        Some(kernel) => kernel,
        None => panic!("not called on a kernel thread"),
    }
}

/// The exit routine given to kernels on [`HostPort`].
pub fn exit_thread() -> ! {
    let result = current_kernel().thread_exit();
    panic!("thread_exit returned {result:?}")
}

/// Boot a kernel on a fresh [`HostPort`] and run it until a kernel thread
/// calls [`HostPort::shutdown`].
///
/// `setup` runs on the calling thread before the kernel starts and creates
/// the initial threads and objects. A panic on any kernel thread ends the run
/// and is propagated from here. The kernel is leaked so that it can be
/// inspected after the run.
pub fn run(setup: impl FnOnce(&'static Kernel<HostPort>)) -> &'static Kernel<HostPort> {
    let kernel: &'static Kernel<HostPort> =
        Box::leak(Box::new(Kernel::new(HostPort::new(), exit_thread)));
    let outer = KERNEL.with(|k| k.replace(Some(kernel)));

    setup(kernel);
    let started = Pin::static_ref(kernel).start();

    KERNEL.with(|k| k.set(outer));
    if let Some(payload) = kernel.port().take_panic() {
        panic::resume_unwind(payload);
    }
    if let Err(e) = started {
        panic!("failed to start the kernel: {e:?}");
    }
    kernel
}
