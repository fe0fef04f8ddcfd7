//! # Mutex
//!
//! A non-recursive mutual-exclusion lock built on the same
//! suspend/wake primitives as [`Semaphore`](super::semaphore::Semaphore).
//! Grounded on the original kernel's `mutex` class: ownership is
//! tracked by thread id so an unlock from a non-owning thread is
//! rejected, but the lock performs no priority inheritance — a thread
//! holding the mutex is not boosted above a higher-priority thread
//! waiting on it. See the module-level scheduler documentation for why
//! that tradeoff is accepted for this kernel.
//!
//! Like [`Semaphore`](super::semaphore::Semaphore), state lives behind
//! a `UnsafeCell` guarded by `critical_section` on every access, so a
//! `Mutex` can be shared by plain reference from a `static`.

use core::cell::UnsafeCell;

use crate::error::KernelError;
use crate::kernel;
use crate::queue::RingQueue;
use crate::sync::critical_section;

struct State {
    owner: Option<usize>,
    waiters: RingQueue<usize, { crate::config::MAX_WAIT_QUEUE }>,
}

/// A non-recursive mutual-exclusion lock.
pub struct Mutex {
    state: UnsafeCell<State>,
}

// Safety: every access to `state` goes through `critical_section`,
// which serializes thread and ISR access on this single-core target.
unsafe impl Sync for Mutex {}

impl Mutex {
    /// Construct an unlocked mutex.
    pub const fn new() -> Self {
        Mutex {
            state: UnsafeCell::new(State {
                owner: None,
                waiters: RingQueue::new(),
            }),
        }
    }

    /// Acquire the lock, suspending the calling thread until it is
    /// free.
    pub fn lock(&self) {
        loop {
            let granted = critical_section(|_cs| {
                let state = unsafe { &mut *self.state.get() };
                let caller = kernel::active_thread_id();
                if state.owner.is_none() {
                    state.owner = caller;
                    true
                } else if state.owner == caller {
                    // `unlock` already handed ownership to this thread
                    // directly while it was suspended; resuming here
                    // just confirms the hand-off, it doesn't re-enqueue.
                    true
                } else {
                    if let Some(id) = caller {
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

    /// Attempt to acquire the lock without blocking.
    pub fn try_lock(&self) -> bool {
        critical_section(|_cs| {
            let state = unsafe { &mut *self.state.get() };
            if state.owner.is_none() {
                state.owner = kernel::active_thread_id();
                true
            } else {
                false
            }
        })
    }

    /// Release the lock. Only the owning thread may unlock; an unlock
    /// attempt by any other thread is rejected with
    /// [`KernelError::InvalidConfiguration`] rather than silently
    /// transferring ownership.
    pub fn unlock(&self) -> Result<(), KernelError> {
        let woken = critical_section(|_cs| {
            let state = unsafe { &mut *self.state.get() };
            let caller = kernel::active_thread_id();
            if state.owner != caller {
                return Err(KernelError::InvalidConfiguration);
            }
            match state.waiters.pop_front() {
                Some(id) => {
                    state.owner = Some(id);
                    Ok(Some(id))
                }
                None => {
                    state.owner = None;
                    Ok(None)
                }
            }
        })?;
        if let Some(id) = woken {
            kernel::wake_thread(id);
        }
        Ok(())
    }

    /// `true` if the mutex is currently held by some thread.
    pub fn is_locked(&self) -> bool {
        critical_section(|_cs| unsafe { &*self.state.get() }.owner.is_some())
    }
}

impl Default for Mutex {
    fn default() -> Self {
        Self::new()
    }
}
