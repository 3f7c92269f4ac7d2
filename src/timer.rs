use core::cell::RefCell;
use cortex_m::{
    interrupt::Mutex,
    peripheral::{syst::SystClkSource, SYST},
};
use cortex_m_rt::exception;
use stm32f4xx_hal::rcc::Clocks;
use crate::arbitration::Clock;

/// Rate in Hz
const TIMER_RATE: u32 = 1000;
/// Elapsed time in milliseconds
static TIMER_MS: Mutex<RefCell<u32>> = Mutex::new(RefCell::new(0));

/// Setup SysTick exception
pub fn setup(mut syst: SYST, clocks: Clocks) {
    syst.set_clock_source(SystClkSource::Core);
    syst.set_reload(clocks.sysclk().0 / TIMER_RATE - 1);
    syst.clear_current();
    syst.enable_interrupt();
    syst.enable_counter();
}

/// SysTick exception (Timer)
#[exception]
fn SysTick() {
    cortex_m::interrupt::free(|cs| {
        TIMER_MS.borrow(cs)
            .replace_with(|time| time.wrapping_add(1));
    });
}

/// Obtain current time in milliseconds
pub fn now() -> u32 {
    cortex_m::interrupt::free(|cs| {
        *TIMER_MS.borrow(cs)
            .borrow()
    })
}

/// Block for `ms` milliseconds, sleeping between interrupts
pub fn sleep(ms: u32) {
    let start = now();
    while now().wrapping_sub(start) < ms {
        cortex_m::asm::wfi();
    }
}

/// Stop SysTick before handing over to the application
pub fn stop() {
    unsafe {
        (*SYST::ptr()).csr.write(0);
    }
}

pub struct SysTickClock;

impl Clock for SysTickClock {
    fn now(&mut self) -> u32 {
        now()
    }

    fn sleep(&mut self, ms: u32) {
        sleep(ms)
    }
}
