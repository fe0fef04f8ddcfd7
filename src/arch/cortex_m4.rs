//! # Cortex-M4 port layer
//!
//! Hardware-specific code for the ARM Cortex-M4 (Thumb-2) processor:
//! stack-frame synthesis, PendSV/SysTick handlers, and the first-thread
//! launch sequence.
//!
//! ## Context switch mechanism
//!
//! The Cortex-M4 uses a split-stack model:
//! - **MSP** (Main Stack Pointer): used by `reset_handler` and by
//!   interrupt handlers themselves.
//! - **PSP** (Process Stack Pointer): used by threads in Thread mode.
//!
//! On exception entry, the hardware automatically stacks R0-R3, R12,
//! LR, PC, and xPSR onto the active stack (the hardware frame). PendSV
//! manually saves and restores R4-R11 (the software frame) either side
//! of that, which completes a full context save/restore. With the
//! `fpu` feature enabled, D0-D15 and FPSCR are additionally saved
//! around the integer frame for threads that use the floating-point
//! unit.
//!
//! ## Interrupt priorities
//!
//! PendSV and SysTick are both configured at the lowest priority
//! (0xFF). PendSV must never preempt another handler — if it did, a
//! higher-priority ISR could observe a half-switched stack — so it is
//! pinned below everything else and only ever actually runs once the
//! processor has nothing higher-priority left pending.

use core::arch::asm;

use cortex_m::peripheral::syst::SystClkSource;

use crate::thread::ThreadFn;

// ---------------------------------------------------------------------------
// Stack-frame synthesis
// ---------------------------------------------------------------------------

/// Number of words in the software-saved frame PendSV pushes/pops:
/// R4-R11 (8 words), plus D8-D15/FPSCR (17 words) when `fpu` is
/// enabled. `pub(crate)` so `config::MIN_STACK_WORDS` can size itself
/// off the frame this port actually synthesizes/saves, instead of
/// duplicating the count.
#[cfg(not(feature = "fpu"))]
pub(crate) const SW_FRAME_WORDS: usize = 8;
#[cfg(feature = "fpu")]
pub(crate) const SW_FRAME_WORDS: usize = 8 + 17;

/// Number of words in the hardware exception frame: R0-R3, R12, LR,
/// PC, xPSR.
pub(crate) const HW_FRAME_WORDS: usize = 8;

/// Synthesize the initial register context for a not-yet-run thread at
/// the high end of its stack region, so that the first time the
/// processor "restores" this thread via PendSV, execution begins at
/// `entry` with interrupts enabled and the thread believes it is
/// returning from an exception.
///
/// Layout from low to high address: the software frame (R4-R11,
/// zeroed) at the bottom, then the hardware frame (R0-R3, R12, LR,
/// PC, xPSR) on top, matching what PendSV expects to find.
///
/// # Safety
/// `stack_ptr` must be valid for `stack_words` words and exclusively
/// owned by the caller for the thread's lifetime.
pub unsafe fn init_stack_frame(stack_ptr: *mut u32, stack_words: usize, entry: ThreadFn) -> *mut u32 {
    let top = stack_ptr.add(stack_words);
    let frame_words = HW_FRAME_WORDS + SW_FRAME_WORDS;
    let sp = top.sub(frame_words);

    for i in 0..SW_FRAME_WORDS {
        core::ptr::write(sp.add(i), 0);
    }

    let hw = sp.add(SW_FRAME_WORDS);
    core::ptr::write(hw.add(0), 0); // R0
    core::ptr::write(hw.add(1), 0); // R1
    core::ptr::write(hw.add(2), 0); // R2
    core::ptr::write(hw.add(3), 0); // R3
    core::ptr::write(hw.add(4), 0); // R12
    core::ptr::write(hw.add(5), thread_exit as usize as u32); // LR: fallback if entry returns
    core::ptr::write(hw.add(6), entry as usize as u32); // PC: thread entry point
    core::ptr::write(hw.add(7), 0x0100_0000); // xPSR: Thumb bit set

    sp
}

/// Fallback return address for a thread whose entry function returns,
/// which it must not (`ThreadFn` is `-> !`). Traps rather than
/// executing whatever garbage follows the stack.
extern "C" fn thread_exit() -> ! {
    loop {
        cortex_m::asm::udf();
    }
}

// ---------------------------------------------------------------------------
// SysTick configuration
// ---------------------------------------------------------------------------

/// Configure the SysTick timer to fire once every `reload_cycles` core
/// clock cycles (the RELOAD register is zero-based, so the caller's
/// period is `reload_cycles` counts, not `reload_cycles + 1`).
pub fn configure_systick(syst: &mut cortex_m::peripheral::SYST, reload_cycles: u32) {
    syst.set_reload(reload_cycles.saturating_sub(1));
    syst.clear_current();
    syst.set_clock_source(SystClkSource::Core);
    syst.enable_counter();
    syst.enable_interrupt();
}

// ---------------------------------------------------------------------------
// PendSV trigger
// ---------------------------------------------------------------------------

/// Set the PENDSVSET bit in the Interrupt Control and State Register,
/// requesting a context switch at the earliest priority-permitted
/// moment. Matches the scheduler's `SetPendingSwitch` signature.
#[inline]
pub fn trigger_pendsv() {
    const ICSR: *mut u32 = 0xE000_ED04 as *mut u32;
    unsafe {
        core::ptr::write_volatile(ICSR, 1 << 28);
    }
}

/// Read back whether a PendSV request is still outstanding (not yet
/// serviced). Matches the scheduler's `IsSwitchPending` signature.
#[inline]
pub fn pendsv_is_pending() -> bool {
    const ICSR: *const u32 = 0xE000_ED04 as *const u32;
    unsafe { core::ptr::read_volatile(ICSR) & (1 << 28) != 0 }
}

// ---------------------------------------------------------------------------
// Interrupt priority configuration
// ---------------------------------------------------------------------------

/// Set PendSV and SysTick to the lowest interrupt priority so neither
/// preempts an application ISR.
pub fn set_interrupt_priorities() {
    unsafe {
        // SHPR3 @ 0xE000_ED20: bits [23:16] PendSV, bits [31:24] SysTick.
        let shpr3: *mut u32 = 0xE000_ED20 as *mut u32;
        let val = core::ptr::read_volatile(shpr3);
        let val = val | (0xFF << 16) | (0xFF << 24);
        core::ptr::write_volatile(shpr3, val);
    }
}

// ---------------------------------------------------------------------------
// First thread launch
// ---------------------------------------------------------------------------

/// Switch to PSP and branch into the first thread's entry point via a
/// fabricated exception return. Called once from `kernel::enter()` and
/// never returns.
///
/// # Safety
/// Must be called exactly once, with `psp` pointing at a stack frame
/// produced by [`init_stack_frame`].
pub unsafe fn start_first_thread(psp: *const u32) -> ! {
    asm!(
        "adds r0, #{sw_frame_bytes}",
        "msr psp, r0",

        "movs r0, #2",
        "msr control, r0",
        "isb",

        "pop {{r0-r3, r12}}",
        "pop {{r4}}",
        "pop {{r5}}",
        "pop {{r6}}",

        "cpsie i",
        "bx r5",

        sw_frame_bytes = const (SW_FRAME_WORDS * 4),
        in("r0") psp,
        options(noreturn)
    );
}

// ---------------------------------------------------------------------------
// PendSV handler (context switch)
// ---------------------------------------------------------------------------

/// PendSV exception handler. Performs the actual context switch:
/// 1. Save R4-R11 (and, with `fpu`, D8-D15/FPSCR) onto the active
///    thread's stack.
/// 2. Store the updated PSP into the active TCB.
/// 3. Ask the scheduler which TCB is pending.
/// 4. Load the new PSP from that TCB.
/// 5. Restore its R4-R11 (and FPU state).
/// 6. Return from exception; hardware restores R0-R3, R12, LR, PC,
///    xPSR.
///
/// # Safety
/// Naked function invoked directly by the NVIC. Must follow the exact
/// Cortex-M4 exception entry/exit convention.
#[cfg(not(feature = "fpu"))]
#[no_mangle]
#[naked]
pub unsafe extern "C" fn PendSV() {
    asm!(
        "mrs r0, psp",
        "stmdb r0!, {{r4-r11}}",
        "bl {save_context}",
        "bl {next_context}",
        "ldmia r0!, {{r4-r11}}",
        "msr psp, r0",
        "ldr r0, =0xFFFFFFFD",
        "bx r0",
        save_context = sym save_current_context,
        next_context = sym next_thread_context,
        options(noreturn)
    );
}

/// FPU-aware PendSV handler: wraps the integer frame with D8-D15 and
/// FPSCR saves, enabled by the `fpu` feature for applications that use
/// the floating-point unit from thread code.
#[cfg(feature = "fpu")]
#[no_mangle]
#[naked]
pub unsafe extern "C" fn PendSV() {
    asm!(
        "mrs r0, psp",
        "vstmdb r0!, {{d8-d15}}",
        "vmrs r1, fpscr",
        "stmdb r0!, {{r1}}",
        "stmdb r0!, {{r4-r11}}",
        "bl {save_context}",
        "bl {next_context}",
        "ldmia r0!, {{r4-r11}}",
        "ldmia r0!, {{r1}}",
        "vmsr fpscr, r1",
        "vldmia r0!, {{d8-d15}}",
        "msr psp, r0",
        "ldr r0, =0xFFFFFFFD",
        "bx r0",
        save_context = sym save_current_context,
        next_context = sym next_thread_context,
        options(noreturn)
    );
}

/// Store the active thread's updated stack pointer into its TCB.
/// Called from PendSV with interrupts already disabled by virtue of
/// exception context.
///
/// # Safety
/// Must only be called from the PendSV handler.
#[no_mangle]
unsafe extern "C" fn save_current_context(psp: *mut u32) {
    let active = &mut *crate::kernel::active_tcb();
    active.set_saved_sp(psp);
}

/// Promote the pending TCB to active and fetch its stack pointer, the
/// one PendSV should switch to. Must run after
/// [`save_current_context`] — it is what actually advances the
/// scheduler's active pointer past the outgoing thread.
///
/// # Safety
/// Must only be called from the PendSV handler, after the outgoing
/// context has been saved and the scheduler has a pending TCB set.
#[no_mangle]
unsafe extern "C" fn next_thread_context() -> *mut u32 {
    crate::kernel::complete_switch()
}

// ---------------------------------------------------------------------------
// SysTick handler
// ---------------------------------------------------------------------------

/// Periodic tick entry point. Advances the system clock and hands off
/// to the scheduler's tick-driven scheduling pass, which requests a
/// PendSV itself when a switch is warranted.
#[no_mangle]
pub unsafe extern "C" fn SysTick() {
    crate::kernel::on_tick();
}

// ---------------------------------------------------------------------------
// Fault handlers
// ---------------------------------------------------------------------------
//
// There is no recovery path for a processor fault in this kernel core
// — no crash-to-restart, no task termination and relaunch. Each
// handler reports the fault the only way available without a wired
// logging sink (a breakpoint, if a debugger is attached) and then
// halts, matching `KernelError::Fault`'s "fatal" framing in the error
// taxonomy.

#[cortex_m_rt::exception]
unsafe fn HardFault(_frame: &cortex_m_rt::ExceptionFrame) -> ! {
    cortex_m::asm::bkpt();
    loop {
        cortex_m::asm::wfi();
    }
}

#[cortex_m_rt::exception]
fn MemoryManagement() {
    cortex_m::asm::bkpt();
    loop {
        cortex_m::asm::wfi();
    }
}

#[cortex_m_rt::exception]
fn BusFault() {
    cortex_m::asm::bkpt();
    loop {
        cortex_m::asm::wfi();
    }
}

#[cortex_m_rt::exception]
fn UsageFault() {
    cortex_m::asm::bkpt();
    loop {
        cortex_m::asm::wfi();
    }
}
