//! What the boot logic needs from the hardware. Implemented by the
//! STM32 platform, and by a mock in tests.

use crate::{
    decision::StrapPinState,
    integrity::{AppDescriptor, IntegrityResult},
    jump::EntryError,
    reboot_magic::RebootMagic,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LedPattern {
    /// Resident, waiting for an update
    Bootloader,
    /// Installed firmware failed verification
    BadFirmware,
    /// Handing over to the application
    Booting,
    /// Invariant violated, halted
    Fatal,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Error {
    /// External flash did not identify itself
    ExternalFlash,
    /// Boot log could not be written
    BootLog,
}

/// State carried over from the previous boot session
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BootHistory {
    pub watchdog_reset: bool,
    pub magic: RebootMagic,
}

pub trait Board {
    fn read_boot_history(&mut self) -> BootHistory;

    /// Takes effect on the next reset
    fn persist_reboot_magic(&mut self, magic: RebootMagic);

    fn clear_watchdog_reason(&mut self);

    fn check_firmware_integrity(&mut self) -> IntegrityResult;

    fn app_descriptor(&mut self) -> Option<AppDescriptor> {
        None
    }

    fn strap_pins(&mut self) -> StrapPinState;

    fn set_led(&mut self, pattern: LedPattern);

    /// Append a counted line to the log on the SD card. Boards without
    /// a log sink fail.
    fn append_boot_log(&mut self, _line: &str) -> Result<(), Error> {
        Err(Error::BootLog)
    }

    /// `WouldBlock` while the chip does not respond yet. Boards without
    /// a driver never become ready.
    fn init_external_flash(&mut self) -> nb::Result<(), Error> {
        Err(nb::Error::Other(Error::ExternalFlash))
    }

    fn unprotect_flash(&mut self) {}

    fn protect_flash(&mut self) {}

    /// Does not return on success
    fn enter_application(&mut self, base_address: u32) -> EntryError;
}

#[cfg(test)]
mod test {
    use super::*;

    /// Implements only what every board must provide
    struct BareBoard;

    impl Board for BareBoard {
        fn read_boot_history(&mut self) -> BootHistory {
            BootHistory::default()
        }

        fn persist_reboot_magic(&mut self, _magic: RebootMagic) {}

        fn clear_watchdog_reason(&mut self) {}

        fn check_firmware_integrity(&mut self) -> IntegrityResult {
            IntegrityResult::Ok
        }

        fn strap_pins(&mut self) -> StrapPinState {
            StrapPinState::default()
        }

        fn set_led(&mut self, _pattern: LedPattern) {}

        fn enter_application(&mut self, _base_address: u32) -> EntryError {
            EntryError::Returned
        }
    }

    #[test]
    fn missing_boot_log_is_an_error() {
        assert_eq!(BareBoard.append_boot_log("GOOD FIRMWARE: CRC and signature OK"), Err(Error::BootLog));
    }

    #[test]
    fn missing_external_flash_never_ready() {
        let mut board = BareBoard;
        for _ in 0..3 {
            assert_eq!(board.init_external_flash(), Err(nb::Error::Other(Error::ExternalFlash)));
        }
    }
}
