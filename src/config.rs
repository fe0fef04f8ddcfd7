//! # Kernel configuration
//!
//! Compile-time constants governing the scheduler and system behavior.
//! All limits are fixed at compile time — no dynamic allocation after
//! init.

/// Maximum number of threads the kernel can manage simultaneously.
/// Bounds the static TCB table. Increase with care — every registered
/// thread's stack is caller-supplied, but the TCB table itself is sized
/// to this constant.
pub const MAX_THREADS: usize = 8;

/// SysTick frequency in Hz. Determines scheduler tick granularity.
/// A 1 ms tick (1000 Hz) is the default.
pub const TICK_HZ: u32 = 1000;

/// Minimum stack size, in machine words, a thread may be constructed
/// with. Derived from the port's actual frame layout — the hardware
/// exception frame plus the software-saved context PendSV pushes/pops
/// (which grows under the `fpu` feature to also cover D8-D15/FPSCR) —
/// plus headroom for the thread's own call chain. A hand-picked
/// constant here would silently fall short whenever the port's frame
/// grows, as it does under `fpu`.
pub const MIN_STACK_WORDS: usize =
    crate::arch::cortex_m4::HW_FRAME_WORDS + crate::arch::cortex_m4::SW_FRAME_WORDS + 16;

/// System clock frequency in Hz (default for STM32F4 at 16 MHz HSI).
pub const SYSTEM_CLOCK_HZ: u32 = 16_000_000;

/// Capacity of each synchronization primitive's wait queue. A queue
/// sized to `MAX_THREADS` can never overflow: no more threads can be
/// suspended on a single primitive than exist in the system.
pub const MAX_WAIT_QUEUE: usize = MAX_THREADS;

/// Default upper bound for a counting semaphore's count when the
/// caller does not need a tighter one. Call sites that need a smaller
/// or larger `M` specify it directly as `Semaphore::<M>`.
pub const SEMAPHORE_DEFAULT_MAX: u32 = 255;
