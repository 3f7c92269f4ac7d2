use log::{info, warn};
use crate::{
    board::Board,
    decision::BootPlan,
    transport::{Tick, TransportKind, TransportSet},
};

/// Millisecond time source. `sleep()` is the only place the update
/// loop suspends.
pub trait Clock {
    fn now(&mut self) -> u32;

    fn sleep(&mut self, ms: u32);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TerminalAction {
    Boot,
    Flashed,
}

/// Poll all transports until one flashes an image, or the window of
/// `plan` expires without any transport claiming the device.
pub fn run<C: Clock>(
    plan: BootPlan,
    transports: &mut TransportSet,
    clock: &mut C,
    poll_interval_ms: u32,
) -> TerminalAction {
    let start = clock.now();
    let mut claimed: Option<TransportKind> = None;
    if plan.timeout_ms == 0 {
        info!("waiting for update");
    } else {
        info!("waiting {} ms for update", plan.timeout_ms);
    }

    loop {
        let now = clock.now();
        match transports.step(now) {
            Tick::Idle => {}
            Tick::Claimed(kind) => {
                if claimed.is_none() {
                    info!("{}: update started, boot timeout disabled", kind.name());
                    claimed = Some(kind);
                }
            }
            Tick::Flashed(kind) => {
                info!("{}: firmware written after {} ms", kind.name(), now.wrapping_sub(start));
                return TerminalAction::Flashed;
            }
        }

        if claimed.is_none()
            && plan.timeout_ms != 0
            && now.wrapping_sub(start) > plan.timeout_ms
        {
            return TerminalAction::Boot;
        }

        clock.sleep(poll_interval_ms);
    }
}

/// There is no booting or flashing without the external flash, so
/// keep probing for as long as it takes. Returns the number of failed
/// probes.
pub fn wait_for_external_flash<B: Board, C: Clock>(board: &mut B, clock: &mut C, retry_ms: u32) -> u32 {
    let mut failures = 0;
    loop {
        match board.init_external_flash() {
            Ok(()) => {
                if failures > 0 {
                    info!("external flash up after {} retries", failures);
                }
                return failures;
            }
            Err(nb::Error::WouldBlock) => {}
            Err(nb::Error::Other(e)) => {
                if failures == 0 {
                    warn!("external flash: {:?}", e);
                }
            }
        }
        failures += 1;
        clock.sleep(retry_ms);
    }
}
