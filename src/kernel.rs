//! # Kernel
//!
//! Top-level kernel initialization and public API. Owns the global
//! scheduler instance, exposes thread-registration and startup
//! functions, and provides the raw globals the port layer reads from
//! ISR context.
//!
//! ## Startup sequence
//!
//! ```text
//! reset_handler (cortex-m-rt)
//!   └─► main()
//!         ├─► kernel::setup()             ← construct the scheduler
//!         ├─► kernel::spawn(..)            ← register threads (×N)
//!         └─► kernel::enter(core_peripherals)  ← launch, never returns
//!               ├─► configure SysTick
//!               ├─► set PendSV/SysTick priorities
//!               └─► start_first_thread()
//! ```

use crate::arch::cortex_m4;
use crate::error::KernelError;
use crate::scheduler::{Scheduler, Tcb};
use crate::sync::critical_section;
use crate::thread::{Thread, ThreadFn};

/// Global scheduler instance.
///
/// # Safety
/// All access goes through [`critical_section`] (thread context) or
/// happens from ISR context, which the port serializes by pinning
/// PendSV and SysTick at the lowest priority.
static mut SCHEDULER: Scheduler =
    Scheduler::new(cortex_m4::trigger_pendsv, cortex_m4::pendsv_is_pending);

/// Raw pointer to the global scheduler, for the port layer's naked
/// handlers, which cannot hold a borrowed reference across the
/// hand-off between PendSV's assembly prologue and its Rust callbacks.
///
/// # Safety
/// Set once by [`setup`] before any thread is registered or the
/// scheduler started.
#[no_mangle]
pub static mut SCHEDULER_PTR: *mut Scheduler = core::ptr::null_mut();

/// Idle thread body: the scheduler switches here whenever no
/// registered thread is runnable. Sleeps the core until the next
/// interrupt rather than spinning.
extern "C" fn idle_thread() -> ! {
    loop {
        cortex_m::asm::wfi();
    }
}

/// Stack for the idle thread. Sized to `MIN_STACK_WORDS`: the idle
/// body makes no calls of its own.
static mut IDLE_STACK: [u32; crate::config::MIN_STACK_WORDS] = [0; crate::config::MIN_STACK_WORDS];

/// SysTick reload value in core clock cycles, overridable via
/// [`set_tick_frequency`] before [`enter`] is called. Defaults to a
/// 1 ms tick at `SYSTEM_CLOCK_HZ`.
static mut TICK_RELOAD_CYCLES: u32 = crate::config::SYSTEM_CLOCK_HZ / crate::config::TICK_HZ;

/// Initialize the kernel's global scheduler and its idle thread. Must
/// be called exactly once, before [`spawn`] or [`enter`].
pub fn setup() {
    unsafe {
        SCHEDULER = Scheduler::new(cortex_m4::trigger_pendsv, cortex_m4::pendsv_is_pending);
        SCHEDULER_PTR = &mut SCHEDULER as *mut Scheduler;

        let idle = Thread::new(idle_thread, u32::MAX, IDLE_STACK.as_mut_ptr(), IDLE_STACK.len())
            .expect("idle thread stack satisfies MIN_STACK_WORDS by construction");
        (*SCHEDULER_PTR).set_idle_thread(idle);
    }
}

/// Register a new thread with the scheduler.
///
/// `stack` is caller-owned storage (typically `static mut`) that must
/// outlive the thread; the kernel never allocates it. The first thread
/// ever registered becomes the initially active thread.
pub fn spawn(entry: ThreadFn, id: u32, stack: &'static mut [u32]) -> Result<usize, KernelError> {
    let thread = Thread::new(entry, id, stack.as_mut_ptr(), stack.len())?;
    critical_section(|_cs| unsafe { (*SCHEDULER_PTR).register_thread(thread) })
}

/// Override the SysTick reload period, in core clock cycles. Must be
/// called before [`enter`]; has no effect afterward.
pub fn set_tick_frequency(cycles: u32) {
    unsafe {
        TICK_RELOAD_CYCLES = cycles;
    }
}

/// Configure SysTick and interrupt priorities, then switch to the
/// first registered thread. **Does not return.**
///
/// # Safety
/// - [`setup`] must have already run.
/// - At least one thread must have been registered via [`spawn`].
/// - Must be called from `reset_handler` context (thread mode, using
///   MSP), not from an ISR.
pub fn enter(mut core_peripherals: cortex_m::Peripherals) -> ! {
    cortex_m4::configure_systick(&mut core_peripherals.SYST, unsafe { TICK_RELOAD_CYCLES });
    cortex_m4::set_interrupt_priorities();

    let first_sp = critical_section(|_cs| unsafe {
        let scheduler = &mut *SCHEDULER_PTR;
        if scheduler.thread_count() == 0 {
            loop {
                cortex_m::asm::wfi();
            }
        }
        scheduler.get_active_tcb().saved_sp() as *const u32
    });

    unsafe { cortex_m4::start_first_thread(first_sp) }
}

/// Raw pointer to the active TCB. Read by the PendSV handler while
/// saving the outgoing thread's context.
///
/// # Safety
/// Must only be called from ISR context or within a critical section.
pub(crate) unsafe fn active_tcb() -> *mut Tcb {
    (*SCHEDULER_PTR).active_tcb_ptr()
}

/// Promote the pending TCB to active and return the stack pointer the
/// PendSV handler should restore. Called from the handler only after
/// it has already saved the outgoing thread's context via
/// [`active_tcb`] — promoting any earlier would make `active_tcb()`
/// resolve to the incoming thread mid-save and clobber its saved SP.
///
/// # Safety
/// Must only be called from the PendSV handler, after the outgoing
/// context has been saved.
pub(crate) unsafe fn complete_switch() -> *mut u32 {
    (*SCHEDULER_PTR).complete_switch()
}

/// Periodic tick entry point, called from the SysTick handler.
/// Advances the system clock and runs the scheduler's tick-driven
/// scheduling pass.
///
/// # Safety
/// Must only be called from the SysTick handler.
pub(crate) unsafe fn on_tick() {
    let scheduler = &mut *SCHEDULER_PTR;
    scheduler.update_system_ticks(1);
    scheduler.run();
}

/// Voluntarily give up the CPU, yielding to the next runnable thread
/// of equal standing. The calling thread remains `Pending` and will be
/// scheduled again in its turn.
pub fn yield_now() {
    critical_section(|_cs| unsafe {
        (*SCHEDULER_PTR).yield_active();
    });
}

/// Functions threads call on themselves: sleeping and suspending.
pub mod this_thread {
    use super::*;

    /// Put the calling thread to sleep for `ticks` scheduler ticks and
    /// yield immediately.
    pub fn sleep_for(ticks: u32) {
        critical_section(|_cs| unsafe {
            (*SCHEDULER_PTR).sleep_thread(ticks);
        });
    }
}

/// Suspend scheduling decisions made from the tick-driven `run()` pass
/// until [`unlock_scheduler`]. Unlike a critical section, interrupts
/// remain enabled and PendSV can still fire — this only silences the
/// SysTick ISR's own decision to request one. Intended for
/// application code that needs a longer section of code to run without
/// being rescheduled by the tick, but doesn't need the full cost of
/// disabling interrupts outright.
pub fn lock_scheduler() {
    critical_section(|_cs| unsafe { (*SCHEDULER_PTR).lock() });
}

/// Re-enable scheduling decisions after [`lock_scheduler`].
pub fn unlock_scheduler() {
    critical_section(|_cs| unsafe { (*SCHEDULER_PTR).unlock() });
}

/// Suspend the calling thread (blocking on a synchronization
/// primitive) and yield to the next runnable thread.
pub(crate) fn suspend_active_thread() {
    critical_section(|_cs| unsafe {
        (*SCHEDULER_PTR).suspend_thread();
    });
}

/// Mark thread `id` runnable again. Used by synchronization primitives
/// to release a waiter.
pub(crate) fn wake_thread(id: usize) {
    critical_section(|_cs| unsafe {
        (*SCHEDULER_PTR).wake(id);
    });
}

/// The table index of the currently active thread, or `None` if idle
/// is running.
pub(crate) fn active_thread_id() -> Option<usize> {
    critical_section(|_cs| unsafe { (*SCHEDULER_PTR).active_thread_id() })
}

/// Elapsed scheduler ticks since startup.
pub fn elapsed_ticks() -> u32 {
    critical_section(|_cs| unsafe { (*SCHEDULER_PTR).get_elapsed_ticks() })
}
