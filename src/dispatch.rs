use log::{error, info, warn};
use crate::{
    arbitration::TerminalAction,
    board::{Board, LedPattern},
    board_info::{BoardInfo, Capabilities},
    integrity::IntegrityResult,
    jump::EntryError,
    transport::TransportSet,
};

/// What the session does after the terminal action came back
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dispatch {
    /// Application entry returned or was refused
    EntryFailed(EntryError),
    /// New image written, with the result of checking it
    Flashed(Option<IntegrityResult>),
}

/// Perform the terminal transition of a boot session.
///
/// `Boot` only comes back if the application could not be entered.
pub fn enter<B: Board>(
    action: TerminalAction,
    board: &mut B,
    transports: &mut TransportSet,
    info: &BoardInfo,
    caps: &Capabilities,
) -> Dispatch {
    match action {
        TerminalAction::Boot => {
            if caps.flash_protection {
                board.protect_flash();
            }
            transports.stop();
            board.set_led(LedPattern::Booting);
            info!("booting application at {:#010x}", info.app_base_address());

            let e = board.enter_application(info.app_base_address());
            error!("application entry failed: {:?}", e);
            board.set_led(LedPattern::Fatal);
            Dispatch::EntryFailed(e)
        }
        TerminalAction::Flashed => {
            // a write may have silently produced a bad image
            let integrity = if caps.check_firmware {
                let result = board.check_firmware_integrity();
                if result.is_ok() {
                    info!("new firmware verified");
                } else {
                    warn!("new firmware failed verification: {}", result);
                }
                Some(result)
            } else {
                None
            };
            Dispatch::Flashed(integrity)
        }
    }
}
