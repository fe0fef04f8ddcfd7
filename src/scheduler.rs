//! # Scheduler
//!
//! Registry of threads, cooperative selection of the next runnable
//! thread, sleep bookkeeping, and the protocol for requesting context
//! switches from the port layer.
//!
//! The scheduler itself never touches the MCU — it is parameterized
//! over two function pointers supplied by the port at construction:
//! one to request a context-switch exception, one to check whether a
//! request is already outstanding. This mirrors the dependency the
//! original kernel injects into its scheduler (`set_pending_interrupt`
//! / `is_interrupt_pending`) so the scheduling algorithm can be
//! exercised on the host without a Cortex-M4 target.

use crate::clock::SystemClock;
use crate::config::MAX_THREADS;
use crate::error::KernelError;
use crate::thread::{Thread, ThreadState};

/// Per-thread bookkeeping record owned by the scheduler.
pub struct Tcb {
    thread: Thread,
    saved_sp: *mut u32,
    next: Option<usize>,
    remaining_sleep_ticks: i32,
}

impl Tcb {
    const fn empty(thread: Thread) -> Self {
        Tcb {
            thread,
            saved_sp: core::ptr::null_mut(),
            next: None,
            remaining_sleep_ticks: 0,
        }
    }

    /// An empty, never-scheduled placeholder TCB filling the
    /// fixed-capacity table before any thread is registered. A named
    /// associated const, not a bare repeat expression, so
    /// `[Tcb::EMPTY; MAX_THREADS]` stays correct however `MAX_THREADS`
    /// is set — the compiler re-evaluates the constant per slot rather
    /// than requiring `Tcb: Copy`.
    const EMPTY: Tcb = Tcb::empty(EMPTY_THREAD);

    fn from_thread(thread: Thread) -> Self {
        let saved_sp = thread.saved_sp();
        Tcb {
            thread,
            saved_sp,
            next: None,
            remaining_sleep_ticks: 0,
        }
    }

    /// Read-only access to the owned [`Thread`].
    pub fn thread(&self) -> &Thread {
        &self.thread
    }

    /// The stack pointer the port reads and writes across a context
    /// switch. Kept in sync with the owned `Thread`'s own saved
    /// pointer.
    #[inline]
    pub fn saved_sp(&self) -> *mut u32 {
        self.saved_sp
    }

    #[inline]
    pub fn set_saved_sp(&mut self, sp: *mut u32) {
        self.saved_sp = sp;
        self.thread.set_saved_sp(sp);
    }
}

/// A handle identifying one TCB slot: either a registered thread's
/// table index, or the distinguished idle TCB.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TcbHandle {
    Thread(usize),
    Idle,
}

/// A function the scheduler calls (with interrupts already disabled)
/// to request the port raise its context-switch exception.
pub type SetPendingSwitch = fn();

/// A function the scheduler calls to check whether a context-switch
/// request is already outstanding.
pub type IsSwitchPending = fn() -> bool;

extern "C" fn unused_entry() -> ! {
    loop {}
}

const EMPTY_THREAD: Thread = Thread::placeholder(unused_entry);

/// Registry of threads and the cooperative/tick-driven selection
/// logic described in the kernel's scheduling model.
pub struct Scheduler {
    clock: SystemClock,
    tcb_table: [Tcb; MAX_THREADS],
    thread_count: usize,
    idle: Tcb,
    active: TcbHandle,
    pending: Option<TcbHandle>,
    last_tick: u32,
    locked: bool,
    set_pending: SetPendingSwitch,
    is_pending: IsSwitchPending,
}

impl Scheduler {
    /// Construct a scheduler with no threads registered. `set_pending`
    /// and `is_pending` are the port's context-switch request hooks
    /// (see module docs).
    pub const fn new(set_pending: SetPendingSwitch, is_pending: IsSwitchPending) -> Self {
        Scheduler {
            clock: SystemClock::new(),
            tcb_table: [Tcb::EMPTY; MAX_THREADS],
            thread_count: 0,
            idle: Tcb::EMPTY,
            active: TcbHandle::Idle,
            pending: None,
            last_tick: 0,
            locked: false,
            set_pending,
            is_pending,
        }
    }

    fn tcb(&self, handle: TcbHandle) -> &Tcb {
        match handle {
            TcbHandle::Thread(i) => &self.tcb_table[i],
            TcbHandle::Idle => &self.idle,
        }
    }

    fn tcb_mut(&mut self, handle: TcbHandle) -> &mut Tcb {
        match handle {
            TcbHandle::Thread(i) => &mut self.tcb_table[i],
            TcbHandle::Idle => &mut self.idle,
        }
    }

    /// Register a new thread. The first thread ever registered
    /// becomes the active thread. Fails once `MAX_THREADS` threads are
    /// registered.
    ///
    /// Not meant to be called once the kernel is dispatching threads
    /// (caller's responsibility per the kernel's startup contract).
    pub fn register_thread(&mut self, thread: Thread) -> Result<usize, KernelError> {
        if self.thread_count >= MAX_THREADS {
            return Err(KernelError::CapacityExceeded);
        }
        let id = self.thread_count;
        self.tcb_table[id] = Tcb::from_thread(thread);
        if id > 0 {
            self.tcb_table[id - 1].next = Some(id);
        }
        self.thread_count += 1;

        if id == 0 {
            self.active = TcbHandle::Thread(0);
            self.tcb_table[0].thread.set_state(ThreadState::Active);
        }
        Ok(id)
    }

    /// Install the distinguished idle thread, scheduled whenever no
    /// registered thread is runnable.
    pub fn set_idle_thread(&mut self, thread: Thread) {
        self.idle = Tcb::from_thread(thread);
    }

    /// Number of registered (non-idle) threads.
    pub fn thread_count(&self) -> usize {
        self.thread_count
    }

    /// The currently active TCB.
    pub fn get_active_tcb(&self) -> &Tcb {
        self.tcb(self.active)
    }

    /// The TCB chosen as the next to run, if a switch is outstanding.
    pub fn get_pending_tcb(&self) -> Option<&Tcb> {
        self.pending.map(|h| self.tcb(h))
    }

    /// Raw pointer to the active TCB, for the port's global. Until
    /// [`complete_switch`](Self::complete_switch) runs, this is still
    /// the *outgoing* thread — the one PendSV's save step needs to
    /// write the just-captured stack pointer into.
    pub fn active_tcb_ptr(&mut self) -> *mut Tcb {
        self.tcb_mut(self.active) as *mut Tcb
    }

    /// Disable scheduling decisions. `run()` becomes a no-op until
    /// `unlock()`; ticks still accumulate. Used to bound critical
    /// sections larger than "interrupts disabled" permits.
    pub fn lock(&mut self) {
        self.locked = true;
    }

    /// Re-enable scheduling decisions.
    pub fn unlock(&mut self) {
        self.locked = false;
    }

    /// The tick-driven scheduling pass. Wakes sleeping threads whose
    /// deadline has passed and, if no switch is already outstanding,
    /// requests one to the first runnable `Pending` thread (or to
    /// idle, if the active thread is no longer runnable).
    pub fn run(&mut self) {
        if self.locked {
            return;
        }

        let now = self.clock.get_ticks();
        let delta = now.wrapping_sub(self.last_tick);
        self.last_tick = now;

        for i in 0..self.thread_count {
            let tcb = &mut self.tcb_table[i];
            if tcb.thread.state() == ThreadState::Sleeping {
                tcb.remaining_sleep_ticks -= delta as i32;
                if tcb.remaining_sleep_ticks <= 0 {
                    tcb.thread.set_state(ThreadState::Pending);
                }
            }
        }

        if (self.is_pending)() {
            return;
        }

        let mut next = None;
        for i in 0..self.thread_count {
            if self.tcb_table[i].thread.state() == ThreadState::Pending {
                next = Some(i);
                break;
            }
        }

        if let Some(i) = next {
            if let TcbHandle::Thread(active_idx) = self.active {
                if active_idx != i {
                    self.tcb_table[active_idx]
                        .thread
                        .set_state(ThreadState::Pending);
                }
            }
            self.context_switch_to(TcbHandle::Thread(i));
            return;
        }

        let active_runnable = self.tcb(self.active).thread.state() == ThreadState::Active;
        if !active_runnable && self.active != TcbHandle::Idle {
            self.context_switch_to(TcbHandle::Idle);
        }
    }

    /// Read the elapsed tick count.
    pub fn get_elapsed_ticks(&self) -> u32 {
        self.clock.get_ticks()
    }

    /// Advance the system clock. Called exclusively from the tick
    /// ISR.
    pub fn update_system_ticks(&mut self, delta: u32) {
        self.clock.update(delta);
    }

    /// Put the active thread to sleep for `ticks` and yield to the
    /// next runnable thread. `ticks == 0` yields without blocking on
    /// the clock at all — the caller goes straight back to `Pending`,
    /// the same as [`yield_active`](Self::yield_active), rather than
    /// parking in `Sleeping` for a tick pass to notice the deadline has
    /// already elapsed.
    pub fn sleep_thread(&mut self, ticks: u32) {
        if ticks == 0 {
            self.yield_active();
            return;
        }
        if let TcbHandle::Thread(i) = self.active {
            self.tcb_table[i].remaining_sleep_ticks = ticks as i32;
            self.tcb_table[i].thread.set_state(ThreadState::Sleeping);
        }
        self.jump_to_next_pending();
    }

    /// Suspend the active thread (called on its behalf by a
    /// synchronization primitive) and yield to the next runnable
    /// thread.
    pub fn suspend_thread(&mut self) {
        if let TcbHandle::Thread(i) = self.active {
            self.tcb_table[i].thread.set_state(ThreadState::Suspended);
        }
        self.jump_to_next_pending();
    }

    /// Mark a previously suspended or sleeping thread `Pending` again.
    /// Used by synchronization primitives to release a waiter.
    pub fn wake(&mut self, id: usize) {
        if id < self.thread_count {
            self.tcb_table[id].thread.set_state(ThreadState::Pending);
        }
    }

    /// Voluntarily give up the CPU: the active thread remains
    /// runnable (returns to `Pending`, staying in the round-robin
    /// rotation) and the scheduler switches to the next `Pending`
    /// thread, if any. If no other thread is `Pending`, the caller
    /// simply keeps running — yielding alone in the system is a
    /// no-op, not a detour through idle.
    pub fn yield_active(&mut self) {
        let caller = self.active;
        if let TcbHandle::Thread(i) = caller {
            self.tcb_table[i].thread.set_state(ThreadState::Pending);
        }

        for i in 0..self.thread_count {
            if self.tcb_table[i].thread.state() == ThreadState::Pending
                && TcbHandle::Thread(i) != caller
            {
                self.context_switch_to(TcbHandle::Thread(i));
                return;
            }
        }

        if let TcbHandle::Thread(i) = caller {
            self.tcb_table[i].thread.set_state(ThreadState::Active);
        }
    }

    /// The table index of the currently active thread, if it is a
    /// registered thread (not idle).
    pub fn active_thread_id(&self) -> Option<usize> {
        match self.active {
            TcbHandle::Thread(i) => Some(i),
            TcbHandle::Idle => None,
        }
    }

    /// Request a context switch to `handle`. Marks the incoming
    /// thread's logical state `Active` and asks the port to raise
    /// PendSV, but deliberately leaves `self.active` pointing at the
    /// *outgoing* thread — PendSV's save step still needs
    /// `active_tcb_ptr()` to resolve to the thread whose stack pointer
    /// it just captured. `self.active` only advances once
    /// [`complete_switch`](Self::complete_switch) runs from inside the
    /// handler, after the save, per the port's exact save-then-swap
    /// sequence.
    fn context_switch_to(&mut self, handle: TcbHandle) {
        self.pending = Some(handle);
        self.tcb_mut(handle).thread.set_state(ThreadState::Active);
        (self.set_pending)();
    }

    /// Called by the port's context-switch handler once the outgoing
    /// thread's context has been saved. Promotes the pending TCB to
    /// `active` and returns the stack pointer PendSV should restore.
    ///
    /// # Panics
    /// If PendSV fired with no pending thread set — a port-level
    /// programming error (`set_pending_switch` called without a
    /// target).
    pub fn complete_switch(&mut self) -> *mut u32 {
        let handle = self.pending.take().expect(
            "PendSV fired with no pending thread: set_pending_switch was called without a target",
        );
        self.active = handle;
        self.tcb(handle).saved_sp()
    }

    fn jump_to_next_pending(&mut self) {
        if (self.is_pending)() {
            return;
        }

        let caller = self.active;
        for i in 0..self.thread_count {
            if self.tcb_table[i].thread.state() == ThreadState::Pending
                && TcbHandle::Thread(i) != caller
            {
                self.context_switch_to(TcbHandle::Thread(i));
                return;
            }
        }

        self.context_switch_to(TcbHandle::Idle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicBool, Ordering};

    static PENDING_FLAG: AtomicBool = AtomicBool::new(false);

    fn reset_flag() {
        PENDING_FLAG.store(false, Ordering::SeqCst);
    }

    fn set_pending() {
        PENDING_FLAG.store(true, Ordering::SeqCst);
    }

    fn is_pending() -> bool {
        PENDING_FLAG.load(Ordering::SeqCst)
    }

    /// Emulates the PendSV handler having run: clears the outstanding
    /// request and promotes the pending TCB to active, exactly as
    /// `complete_switch` does from inside the real handler after the
    /// outgoing context has been saved.
    fn ack_switch(sched: &mut Scheduler) {
        PENDING_FLAG.store(false, Ordering::SeqCst);
        sched.complete_switch();
    }

    extern "C" fn task_a() -> ! {
        loop {}
    }
    extern "C" fn task_b() -> ! {
        loop {}
    }

    fn make_thread(id: u32, stack: &mut [u32]) -> Thread {
        Thread::new(task_a, id, stack.as_mut_ptr(), stack.len()).unwrap()
    }

    #[test]
    fn first_registered_thread_becomes_active() {
        reset_flag();
        let mut sched = Scheduler::new(set_pending, is_pending);
        let mut stack = [0u32; 64];
        sched.register_thread(make_thread(1, &mut stack)).unwrap();
        assert_eq!(sched.active_thread_id(), Some(0));
        assert_eq!(
            sched.get_active_tcb().thread().state(),
            ThreadState::Active
        );
    }

    #[test]
    fn registration_fails_past_capacity() {
        reset_flag();
        let mut sched = Scheduler::new(set_pending, is_pending);
        let mut stacks = [[0u32; 64]; MAX_THREADS];
        for (i, stack) in stacks.iter_mut().enumerate() {
            sched
                .register_thread(make_thread(i as u32, stack))
                .unwrap();
        }
        let mut extra = [0u32; 64];
        let err = sched
            .register_thread(make_thread(99, &mut extra))
            .unwrap_err();
        assert_eq!(err, KernelError::CapacityExceeded);
        assert_eq!(sched.thread_count(), MAX_THREADS);
    }

    #[test]
    fn sleep_wakes_after_enough_ticks() {
        reset_flag();
        let mut sched = Scheduler::new(set_pending, is_pending);
        let mut stack_a = [0u32; 64];
        let mut stack_b = [0u32; 64];
        sched.register_thread(make_thread(1, &mut stack_a)).unwrap();
        sched
            .register_thread(Thread::new(task_b, 2, stack_b.as_mut_ptr(), stack_b.len()).unwrap())
            .unwrap();

        sched.sleep_thread(10);
        ack_switch(&mut sched);
        assert_eq!(
            sched.get_active_tcb().thread().id(),
            2,
            "should have switched to the other registered thread"
        );

        // Advance ticks below the deadline: still sleeping.
        sched.update_system_ticks(5);
        sched.run();
        assert_eq!(sched.tcb_table[0].thread.state(), ThreadState::Sleeping);

        // Cross the deadline: thread 0 wakes and, since nothing else
        // is pending a switch, is immediately selected to run. The
        // thread's own state flips to `Active` as soon as the switch is
        // requested; the scheduler's active pointer only follows once
        // PendSV's save-then-promote sequence completes.
        sched.update_system_ticks(5);
        sched.run();
        assert_eq!(sched.tcb_table[0].thread.state(), ThreadState::Active);
        ack_switch(&mut sched);
        assert_eq!(sched.active_thread_id(), Some(0));
    }

    #[test]
    fn sleep_ordering_wakes_lower_index_first() {
        reset_flag();
        let mut sched = Scheduler::new(set_pending, is_pending);
        let mut stack_a = [0u32; 64];
        let mut stack_b = [0u32; 64];
        let mut idle_stack = [0u32; 64];
        sched.register_thread(make_thread(1, &mut stack_a)).unwrap();
        sched
            .register_thread(Thread::new(task_b, 2, stack_b.as_mut_ptr(), stack_b.len()).unwrap())
            .unwrap();
        sched.set_idle_thread(
            Thread::new(unused_entry, 0xFFFF, idle_stack.as_mut_ptr(), idle_stack.len()).unwrap(),
        );

        sched.tcb_table[0].remaining_sleep_ticks = 10;
        sched.tcb_table[0].thread.set_state(ThreadState::Sleeping);
        sched.tcb_table[1].remaining_sleep_ticks = 10;
        sched.tcb_table[1].thread.set_state(ThreadState::Sleeping);

        sched.update_system_ticks(10);
        sched.run();
        assert_eq!(
            sched.get_active_tcb().thread().id(),
            1,
            "lower insertion index (thread 1) wakes first"
        );
    }

    #[test]
    fn idle_runs_when_nothing_else_is_pending() {
        reset_flag();
        let mut sched = Scheduler::new(set_pending, is_pending);
        let mut stack_a = [0u32; 64];
        let mut stack_b = [0u32; 64];
        let mut idle_stack = [0u32; 64];
        sched.register_thread(make_thread(1, &mut stack_a)).unwrap();
        sched
            .register_thread(Thread::new(task_b, 2, stack_b.as_mut_ptr(), stack_b.len()).unwrap())
            .unwrap();
        sched.set_idle_thread(
            Thread::new(unused_entry, 0xFFFF, idle_stack.as_mut_ptr(), idle_stack.len()).unwrap(),
        );

        sched.sleep_thread(100);
        ack_switch(&mut sched);
        sched.sleep_thread(100);
        ack_switch(&mut sched);

        sched.update_system_ticks(50);
        sched.run();
        assert_eq!(sched.active, TcbHandle::Idle);
    }

    #[test]
    fn lock_suppresses_scheduling_decisions() {
        reset_flag();
        let mut sched = Scheduler::new(set_pending, is_pending);
        let mut stack_a = [0u32; 64];
        let mut stack_b = [0u32; 64];
        sched.register_thread(make_thread(1, &mut stack_a)).unwrap();
        sched
            .register_thread(Thread::new(task_b, 2, stack_b.as_mut_ptr(), stack_b.len()).unwrap())
            .unwrap();

        sched.lock();
        sched.tcb_table[1].thread.set_state(ThreadState::Pending);
        sched.update_system_ticks(1);
        sched.run();
        assert_eq!(
            sched.active_thread_id(),
            Some(0),
            "run() must be a no-op while locked"
        );

        sched.unlock();
        sched.run();
        ack_switch(&mut sched);
        assert_eq!(sched.active_thread_id(), Some(1));
    }

    #[test]
    fn yield_active_switches_to_the_other_pending_thread() {
        reset_flag();
        let mut sched = Scheduler::new(set_pending, is_pending);
        let mut stack_a = [0u32; 64];
        let mut stack_b = [0u32; 64];
        sched.register_thread(make_thread(1, &mut stack_a)).unwrap();
        sched
            .register_thread(Thread::new(task_b, 2, stack_b.as_mut_ptr(), stack_b.len()).unwrap())
            .unwrap();

        sched.tcb_table[1].thread.set_state(ThreadState::Pending);
        sched.yield_active();
        ack_switch(&mut sched);

        assert_eq!(sched.active_thread_id(), Some(1));
        assert_eq!(sched.tcb_table[0].thread.state(), ThreadState::Pending);
    }

    #[test]
    fn yield_active_is_a_no_op_when_alone() {
        reset_flag();
        let mut sched = Scheduler::new(set_pending, is_pending);
        let mut stack_a = [0u32; 64];
        sched.register_thread(make_thread(1, &mut stack_a)).unwrap();

        sched.yield_active();

        assert_eq!(sched.active_thread_id(), Some(0));
        assert_eq!(sched.tcb_table[0].thread.state(), ThreadState::Active);
        assert!(!is_pending(), "a lone thread's yield must not request PendSV");
    }
}
