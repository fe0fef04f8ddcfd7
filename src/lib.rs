//! # rtos-kernel
//!
//! A small preemptive real-time kernel core for ARM Cortex-M4F
//! microcontrollers: threads, a first-fit round-robin scheduler driven
//! by PendSV/SysTick, and two blocking synchronization primitives.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                   Application threads                   │
//! ├────────────────────────────────────────────────────────┤
//! │                 Kernel API (kernel.rs)                  │
//! │       setup() · spawn() · enter() · yield_now()         │
//! ├──────────────┬────────────────────┬───────────────────┤
//! │  Scheduler   │   Thread model     │  Sync primitives  │
//! │  scheduler.rs│   thread.rs        │  sync/            │
//! │  ─ run()     │   ─ ThreadState    │  ─ Semaphore      │
//! │  ─ sleep()   │   ─ stack frame    │  ─ Mutex          │
//! │  ─ suspend() │                    │                   │
//! ├──────────────┴────────────────────┴───────────────────┤
//! │            Port layer (arch/cortex_m4.rs)               │
//! │   PendSV · SysTick · context switch · stack synthesis   │
//! ├────────────────────────────────────────────────────────┤
//! │         ARM Cortex-M4 hardware (Thumb-2)                │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Scheduling model
//!
//! Threads move through four states: `Pending` (runnable, waiting for
//! the scheduler to pick it), `Active` (currently executing — exactly
//! one thread, outside the brief window inside PendSV), `Sleeping`
//! (waiting out a tick deadline), and `Suspended` (blocked on a
//! synchronization primitive). Selection is first-fit round-robin over
//! the `Pending` threads in registration order; there is no priority
//! field and no priority inheritance. A dedicated idle thread runs
//! whenever nothing else is `Pending`.
//!
//! ## Memory model
//!
//! - No heap, no `alloc`: `core` only.
//! - Fixed-size TCB table (`MAX_THREADS`), allocated once at startup.
//! - Per-thread stacks are caller-supplied storage, not owned by the
//!   kernel.
//! - Wait queues for synchronization primitives are bounded ring
//!   buffers sized to `MAX_THREADS`.
//! - Shared state crossing the thread/ISR boundary is protected by
//!   `cortex_m::interrupt::free` critical sections.

#![no_std]

pub mod arch;
pub mod clock;
pub mod config;
pub mod error;
pub mod kernel;
pub mod queue;
pub mod scheduler;
pub mod sync;
pub mod thread;
