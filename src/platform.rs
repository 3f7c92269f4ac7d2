//! STM32F4 flight controller board.

use core::{mem, ops::Range, ptr, slice};
use bit_field::BitField;
use cortex_m::peripheral::{NVIC, SCB};
use log::{debug, info};
use crate::{
    board::{Board, BootHistory, LedPattern},
    board_info::{BoardInfo, Capabilities},
    decision::StrapPinState,
    integrity::{AppDescriptor, FirmwareCheck, IntegrityResult},
    jump::{AppVector, EntryError},
    leds::Leds,
    pins::StrapPins,
    reboot_magic::RebootMagic,
    timer,
};

/// Main SRAM (SRAM1 + SRAM2 + SRAM3)
pub const SRAM: Range<u32> = 0x2000_0000..0x2003_0000;

const RCC_CSR: *mut u32 = 0x4002_3874 as *mut u32;
const RCC_CSR_RMVF: usize = 24;
const RCC_CSR_IWDGRSTF: usize = 29;
const RCC_CSR_WWDGRSTF: usize = 30;

const RCC_APB1ENR: *mut u32 = 0x4002_3840 as *mut u32;
const RCC_APB1ENR_PWREN: usize = 28;
const PWR_CR: *mut u32 = 0x4000_7000 as *mut u32;
const PWR_CR_DBP: usize = 8;
/// RTC backup register 0, survives reset
const RTC_BKP0R: *mut u32 = 0x4000_2850 as *mut u32;

const FLASH_OPTKEYR: *mut u32 = 0x4002_3C08 as *mut u32;
const FLASH_SR: *mut u32 = 0x4002_3C0C as *mut u32;
const FLASH_SR_BSY: usize = 16;
const FLASH_OPTCR: *mut u32 = 0x4002_3C14 as *mut u32;
const FLASH_OPTCR_OPTLOCK: usize = 0;
const FLASH_OPTCR_OPTSTRT: usize = 1;
const FLASH_OPTCR_NWRP: Range<usize> = 16..28;
const FLASH_OPTKEY1: u32 = 0x0819_2A3B;
const FLASH_OPTKEY2: u32 = 0x4C5D_6E7F;
pub const FLASH_BASE: u32 = 0x0800_0000;
/// Size of the first four flash sectors
const SMALL_SECTOR_KB: u32 = 16;

const DBGMCU_IDCODE: *const u32 = 0xE004_2000 as *const u32;
/// Silicon revision with only the lower 1 MiB of flash usable
const REV_ID_1M_ONLY: u32 = 0x1000;

unsafe fn modify(reg: *mut u32, f: impl FnOnce(&mut u32)) {
    let mut value = ptr::read_volatile(reg);
    f(&mut value);
    ptr::write_volatile(reg, value);
}

/// Parts of revision A report 2 MiB but must not use the upper bank
pub fn flash_limited_to_1m() -> bool {
    let idcode = unsafe { ptr::read_volatile(DBGMCU_IDCODE) };
    idcode.get_bits(16..32) == REV_ID_1M_ONLY
}

/// Halt with the fatal pattern
pub fn halt(leds: &mut Leds) -> ! {
    leds.show(LedPattern::Fatal);
    loop {
        cortex_m::asm::wfi();
    }
}

pub struct Stm32Board<F> {
    leds: Leds,
    strap: StrapPins,
    caps: Capabilities,
    info: BoardInfo,
    check: F,
}

impl<F: FirmwareCheck> Stm32Board<F> {
    pub fn new(leds: Leds, strap: StrapPins, caps: Capabilities, info: BoardInfo, check: F) -> Self {
        // backup domain write access
        unsafe {
            modify(RCC_APB1ENR, |v| { v.set_bit(RCC_APB1ENR_PWREN, true); });
            modify(PWR_CR, |v| { v.set_bit(PWR_CR_DBP, true); });
        }
        Stm32Board { leds, strap, caps, info, check }
    }

    fn image(&self) -> &'static [u8] {
        unsafe {
            slice::from_raw_parts(
                self.info.app_base_address() as *const u8,
                self.info.fw_size_bytes as usize,
            )
        }
    }

    /// Write the write-protect bits of the option bytes if they differ
    fn write_protection(&mut self, nwrp: u32) {
        let optcr = unsafe { ptr::read_volatile(FLASH_OPTCR) };
        if optcr.get_bits(FLASH_OPTCR_NWRP) == nwrp {
            return;
        }
        debug!("option bytes nWRP {:#05x} -> {:#05x}", optcr.get_bits(FLASH_OPTCR_NWRP), nwrp);
        unsafe {
            if optcr.get_bit(FLASH_OPTCR_OPTLOCK) {
                ptr::write_volatile(FLASH_OPTKEYR, FLASH_OPTKEY1);
                ptr::write_volatile(FLASH_OPTKEYR, FLASH_OPTKEY2);
            }
            while ptr::read_volatile(FLASH_SR).get_bit(FLASH_SR_BSY) {}
            modify(FLASH_OPTCR, |v| { v.set_bits(FLASH_OPTCR_NWRP, nwrp); });
            modify(FLASH_OPTCR, |v| { v.set_bit(FLASH_OPTCR_OPTSTRT, true); });
            while ptr::read_volatile(FLASH_SR).get_bit(FLASH_SR_BSY) {}
            modify(FLASH_OPTCR, |v| { v.set_bit(FLASH_OPTCR_OPTLOCK, true); });
        }
    }
}

impl<F: FirmwareCheck> Board for Stm32Board<F> {
    fn read_boot_history(&mut self) -> BootHistory {
        let csr = unsafe { ptr::read_volatile(RCC_CSR) };
        let watchdog_reset = csr.get_bit(RCC_CSR_IWDGRSTF) || csr.get_bit(RCC_CSR_WWDGRSTF);
        let magic = RebootMagic::decode(unsafe { ptr::read_volatile(RTC_BKP0R) });
        BootHistory { watchdog_reset, magic }
    }

    fn persist_reboot_magic(&mut self, magic: RebootMagic) {
        unsafe { ptr::write_volatile(RTC_BKP0R, magic.encode()) };
    }

    fn clear_watchdog_reason(&mut self) {
        unsafe { modify(RCC_CSR, |v| { v.set_bit(RCC_CSR_RMVF, true); }) };
    }

    fn check_firmware_integrity(&mut self) -> IntegrityResult {
        let image = self.image();
        self.check.check(image)
    }

    fn app_descriptor(&mut self) -> Option<AppDescriptor> {
        let image = self.image();
        self.check.app_descriptor(image)
    }

    fn strap_pins(&mut self) -> StrapPinState {
        self.strap.sample(&self.caps)
    }

    fn set_led(&mut self, pattern: LedPattern) {
        self.leds.show(pattern);
    }

    fn unprotect_flash(&mut self) {
        let all = (1 << FLASH_OPTCR_NWRP.len()) - 1;
        self.write_protection(all);
    }

    fn protect_flash(&mut self) {
        let all: u32 = (1 << FLASH_OPTCR_NWRP.len()) - 1;
        // sectors below the application hold the bootloader
        let sectors = (self.info.app_base_address() - FLASH_BASE) / 1024 / SMALL_SECTOR_KB;
        let mut nwrp = all;
        for sector in 0..sectors.min(4) as usize {
            nwrp.set_bit(sector, false);
        }
        self.write_protection(nwrp);
    }

    fn enter_application(&mut self, base_address: u32) -> EntryError {
        let table = unsafe { slice::from_raw_parts(base_address as *const u8, 8) };
        let vector = match AppVector::parse(table) {
            Ok(vector) => vector,
            Err(e) => return e,
        };
        if let Err(e) = vector.validate(&self.info, SRAM) {
            return e;
        }
        info!("jump: sp={:#010x} pc={:#010x}", vector.initial_sp, vector.reset_vector);

        unsafe {
            cortex_m::interrupt::disable();
            timer::stop();
            let nvic = &*NVIC::ptr();
            for i in 0..8 {
                nvic.icer[i].write(0xFFFF_FFFF);
                nvic.icpr[i].write(0xFFFF_FFFF);
            }
            (*SCB::ptr()).vtor.write(base_address);
            cortex_m::asm::dsb();
            cortex_m::asm::isb();
            cortex_m::register::msp::write(vector.initial_sp);
            let reset: extern "C" fn() -> ! = mem::transmute(vector.reset_vector as usize);
            reset();
        }
    }
}
