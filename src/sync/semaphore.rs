//! # Counting semaphore
//!
//! A counting semaphore with a const-generic upper bound, replacing
//! the original kernel's non-type template parameter
//! (`counting_semaphore<LeastMaxValue>`). `acquire` suspends the
//! calling thread when the count is exhausted rather than spinning;
//! `release` wakes the longest-waiting suspended thread, if any, in
//! FIFO order.
//!
//! State lives behind a `UnsafeCell`, guarded by
//! [`critical_section`](super::critical_section) on every access, so a
//! `Semaphore` can sit in a `static` and be shared by reference between
//! threads and ISRs without an outer lock — the same shape
//! `cortex_m::interrupt::Mutex<RefCell<T>>` gives application code,
//! specialized to this kernel's own primitive.

use core::cell::UnsafeCell;

use crate::error::KernelError;
use crate::kernel;
use crate::queue::RingQueue;
use crate::sync::critical_section;

struct State {
    count: u32,
    waiters: RingQueue<usize, { crate::config::MAX_WAIT_QUEUE }>,
}

/// A counting semaphore whose count never exceeds `MAX`.
pub struct Semaphore<const MAX: u32> {
    state: UnsafeCell<State>,
}

// Safety: every access to `state` goes through `critical_section`,
// which serializes thread and ISR access on this single-core target.
unsafe impl<const MAX: u32> Sync for Semaphore<MAX> {}

/// A semaphore that only ever holds 0 or 1, used as a binary signal
/// between threads (not a mutex — it carries no ownership semantics).
pub type BinarySemaphore = Semaphore<1>;

impl<const MAX: u32> Semaphore<MAX> {
    /// Construct a semaphore starting at `initial_count`, clamped to
    /// `MAX`.
    pub const fn new(initial_count: u32) -> Self {
        let count = if initial_count > MAX { MAX } else { initial_count };
        Semaphore {
            state: UnsafeCell::new(State {
                count,
                waiters: RingQueue::new(),
            }),
        }
    }

    /// Acquire a permit, suspending the calling thread until one
    /// becomes available.
    ///
    /// The count is decremented exactly once, at the point the
    /// permit is actually granted — whether that's immediate (count
    /// already positive) or after being woken by a matching
    /// `release`. The original implementation's `acquire` decremented
    /// once, then again when resumed from suspension; the thread
    /// cleared two permits for one acquisition under contention. This
    /// implementation decrements only here.
    pub fn acquire(&self) {
        loop {
            let granted = critical_section(|_cs| {
                let state = unsafe { &mut *self.state.get() };
                if state.count > 0 {
                    state.count -= 1;
                    true
                } else {
                    if let Some(id) = kernel::active_thread_id() {
                        let _ = state.waiters.push_back(id);
                    }
                    false
                }
            });
            if granted {
                return;
            }
            kernel::suspend_active_thread();
        }
    }

    /// Attempt to acquire a permit without blocking.
    pub fn try_acquire(&self) -> bool {
        critical_section(|_cs| {
            let state = unsafe { &mut *self.state.get() };
            if state.count > 0 {
                state.count -= 1;
                true
            } else {
                false
            }
        })
    }

    /// Attempt to acquire a permit, giving up after `ticks` scheduler
    /// ticks of waiting. Polls in one-tick increments rather than
    /// combining the sleeping and suspended states, since a thread in
    /// this kernel occupies exactly one wait state at a time.
    pub fn try_acquire_for(&self, ticks: u32) -> bool {
        if self.try_acquire() {
            return true;
        }
        let mut remaining = ticks;
        while remaining > 0 {
            kernel::this_thread::sleep_for(1);
            if self.try_acquire() {
                return true;
            }
            remaining -= 1;
        }
        false
    }

    /// Release a permit: increments the count, clamped to `MAX`, and
    /// wakes the longest-waiting suspended thread, if any. Both happen
    /// unconditionally — a waiter is woken to *retry* its acquisition,
    /// not handed the permit directly, so the count must already
    /// reflect the release by the time it re-checks.
    pub fn release(&self) {
        let woken = critical_section(|_cs| {
            let state = unsafe { &mut *self.state.get() };
            state.count = core::cmp::min(state.count + 1, MAX);
            state.waiters.pop_front()
        });
        if let Some(id) = woken {
            kernel::wake_thread(id);
        }
    }

    /// Construct with an initial count of zero, returning an error if
    /// `MAX` is zero (a semaphore with no usable permits is a
    /// configuration mistake, not a valid empty semaphore).
    pub const fn new_empty() -> Result<Self, KernelError> {
        if MAX == 0 {
            Err(KernelError::InvalidConfiguration)
        } else {
            Ok(Self::new(0))
        }
    }

    /// Current count, for diagnostics and tests.
    pub fn count(&self) -> u32 {
        critical_section(|_cs| unsafe { &*self.state.get() }.count)
    }
}
