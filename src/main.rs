//! # Demo firmware
//!
//! A small demonstration of the kernel's public API: three threads
//! sharing a counter behind a mutex, plus a producer/consumer pair
//! synchronized with a counting semaphore.
//!
//! | Thread | Role |
//! |--------|------|
//! | `producer_thread` | Posts to the semaphore every 50 ticks |
//! | `consumer_thread` | Acquires the semaphore, increments the shared counter under the mutex |
//! | `reporter_thread` | Wakes every 200 ticks and reads the counter under the mutex |

#![no_std]
#![no_main]

use cortex_m_rt::entry;
use panic_halt as _;

use rtos_kernel::kernel::{self, this_thread};
use rtos_kernel::sync::{Mutex, Semaphore};

static SHARED_COUNTER: Mutex = Mutex::new();
static ITEMS_READY: Semaphore<16> = Semaphore::new(0);

static mut COUNTER_VALUE: u32 = 0;

static mut PRODUCER_STACK: [u32; 64] = [0; 64];
static mut CONSUMER_STACK: [u32; 64] = [0; 64];
static mut REPORTER_STACK: [u32; 64] = [0; 64];

extern "C" fn producer_thread() -> ! {
    loop {
        this_thread::sleep_for(50);
        ITEMS_READY.release();
    }
}

extern "C" fn consumer_thread() -> ! {
    loop {
        ITEMS_READY.acquire();

        SHARED_COUNTER.lock();
        unsafe {
            COUNTER_VALUE = COUNTER_VALUE.wrapping_add(1);
        }
        SHARED_COUNTER.unlock().ok();
    }
}

extern "C" fn reporter_thread() -> ! {
    loop {
        this_thread::sleep_for(200);

        SHARED_COUNTER.lock();
        let _snapshot = unsafe { COUNTER_VALUE };
        SHARED_COUNTER.unlock().ok();

        // A real board would emit `_snapshot` over a UART or similar
        // sink; this kernel core has no logging facade of its own.
    }
}

#[entry]
fn main() -> ! {
    let cp = cortex_m::Peripherals::take().unwrap();

    kernel::setup();

    kernel::spawn(producer_thread, 1, unsafe { &mut PRODUCER_STACK })
        .expect("producer thread registration");
    kernel::spawn(consumer_thread, 2, unsafe { &mut CONSUMER_STACK })
        .expect("consumer thread registration");
    kernel::spawn(reporter_thread, 3, unsafe { &mut REPORTER_STACK })
        .expect("reporter thread registration");

    kernel::enter(cp)
}
