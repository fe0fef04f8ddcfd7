//! # Synchronization primitives
//!
//! Interrupt-safe critical sections, plus the counting semaphore and
//! mutex built on top of the scheduler's suspend/wake primitives.
//! Grounded on the original kernel's `semaphore`/`mutex` classes:
//! both block the calling thread rather than spin, releasing the CPU
//! to whatever else is runnable while waiting.

pub mod mutex;
pub mod semaphore;

use cortex_m::interrupt;

pub use mutex::Mutex;
pub use semaphore::Semaphore;

/// Execute a closure with interrupts disabled, restoring the previous
/// state on exit. The primary mechanism for touching scheduler or
/// primitive state shared with ISR context.
///
/// Keep critical sections short: every tick the scheduler misses while
/// interrupts are masked delays the next scheduling decision.
#[inline]
pub fn critical_section<F, R>(f: F) -> R
where
    F: FnOnce(&interrupt::CriticalSection) -> R,
{
    interrupt::free(f)
}

/// RAII guard that disables interrupts on construction and restores
/// the prior primask state on drop. An alternative to
/// [`critical_section`] for scopes that don't fit a closure cleanly
/// (e.g. spanning an early return).
pub struct InterruptGuard {
    was_enabled: bool,
}

impl InterruptGuard {
    /// Disable interrupts, remembering whether they were enabled
    /// beforehand.
    pub fn new() -> Self {
        let was_enabled = cortex_m::register::primask::read().is_active();
        cortex_m::interrupt::disable();
        InterruptGuard { was_enabled }
    }
}

impl Default for InterruptGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for InterruptGuard {
    fn drop(&mut self) {
        if self.was_enabled {
            unsafe {
                cortex_m::interrupt::enable();
            }
        }
    }
}
