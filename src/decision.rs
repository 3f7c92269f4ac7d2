//! Boot decision: fuses reset history, persisted intent, firmware
//! verification and strap pins into a `BootPlan`.
//!
//! The rules form a strict precedence chain. Each stage may override
//! the plan of the stages before it:
//!
//! - watchdog reset: retry the application at once, unless the
//!   application never confirmed itself with `FirmwareOk`
//! - an update already in progress, then the reboot magic (`Hold`,
//!   `FastBoot`, `CanBootloaderRequest`)
//! - otherwise a short window before booting verified firmware
//! - firmware that failed verification keeps the bootloader resident
//! - the stay-in-bootloader strap pin vetoes everything

use crate::{
    config::BootConfig,
    integrity::IntegrityResult,
    reboot_magic::RebootMagic,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BootPlan {
    /// Boot once the window expires, or at once without a window
    pub try_boot: bool,
    /// Update window; 0 waits forever
    pub timeout_ms: u32,
}

impl BootPlan {
    pub const fn new(try_boot: bool, timeout_ms: u32) -> Self {
        BootPlan { try_boot, timeout_ms }
    }

    /// Stay resident until an update arrives
    pub const STAY: BootPlan = BootPlan::new(false, 0);
    /// Boot without waiting
    pub const BOOT_NOW: BootPlan = BootPlan::new(true, 0);

    /// Boot without entering the update loop. A boot plan with a
    /// timeout still leaves that window to cancel it.
    pub fn boots_immediately(&self) -> bool {
        self.try_boot && self.timeout_ms == 0
    }
}

/// Strap pins sampled at boot. `None` when the board has no such pin.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct StrapPinState {
    pub stay_in_bootloader: Option<bool>,
    pub vbus_present: Option<bool>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BootInputs {
    pub watchdog_reset: bool,
    pub magic: RebootMagic,
    /// `None` when no firmware check is built
    pub integrity: Option<IntegrityResult>,
    pub strap_pins: StrapPinState,
    /// A transport saw an update in progress before the loop started
    pub update_pending: bool,
}

/// Which rule determined the final plan
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Rule {
    Watchdog,
    WatchdogUnconfirmed,
    Hold,
    FastBoot,
    CanRequest,
    UpdatePending,
    BadFirmware,
    FastBootVerified,
    NoUsbHost,
    Unverified,
    StayPin,
}

impl Rule {
    pub fn name(&self) -> &'static str {
        match self {
            Rule::Watchdog => "watchdog",
            Rule::WatchdogUnconfirmed => "watchdog_unconfirmed",
            Rule::Hold => "hold",
            Rule::FastBoot => "fast_boot",
            Rule::CanRequest => "can_request",
            Rule::UpdatePending => "update_pending",
            Rule::BadFirmware => "bad_firmware",
            Rule::FastBootVerified => "fast_boot_verified",
            Rule::NoUsbHost => "no_usb_host",
            Rule::Unverified => "unverified",
            Rule::StayPin => "stay_pin",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Resolution {
    pub plan: BootPlan,
    pub rule: Rule,
    /// Node id to forward to the CAN transport
    pub can_node_id: Option<u8>,
    /// Set when verification failed; raise the fault LED
    pub fault: Option<IntegrityResult>,
    /// Clear the reset reason so the next reset is not blamed on the
    /// watchdog
    pub clear_watchdog_reason: bool,
}

/// Pure boot decision
pub fn resolve(inputs: &BootInputs, config: &BootConfig) -> Resolution {
    let (plan, rule) = if inputs.watchdog_reset {
        watchdog_plan(inputs.magic)
    } else {
        let (plan, rule) = match intent_plan(inputs, config) {
            Some(intent) => intent,
            None => verified_plan(inputs.integrity, config),
        };
        let (plan, rule) = integrity_veto(plan, rule, inputs.integrity);
        vbus_shortcut(plan, rule, inputs.strap_pins)
    };
    let (plan, rule) = strap_veto(plan, rule, inputs.strap_pins);

    let can_node_id = match inputs.magic {
        RebootMagic::CanBootloaderRequest(node_id) => Some(node_id),
        _ => None,
    };
    let fault = inputs.integrity.filter(|result| !result.is_ok());

    Resolution {
        plan,
        rule,
        can_node_id,
        fault,
        clear_watchdog_reason: inputs.watchdog_reset || plan.try_boot,
    }
}

/// A crash without prior confirmation means the firmware is presumed
/// bad and has to be replaced.
fn watchdog_plan(magic: RebootMagic) -> (BootPlan, Rule) {
    if magic == RebootMagic::FirmwareOk {
        (BootPlan::BOOT_NOW, Rule::Watchdog)
    } else {
        (BootPlan::STAY, Rule::WatchdogUnconfirmed)
    }
}

/// Intent left by a running update or by the application
fn intent_plan(inputs: &BootInputs, config: &BootConfig) -> Option<(BootPlan, Rule)> {
    if inputs.update_pending {
        return Some((BootPlan::STAY, Rule::UpdatePending));
    }
    match inputs.magic {
        RebootMagic::Hold =>
            Some((BootPlan::STAY, Rule::Hold)),
        RebootMagic::FastBoot =>
            Some((BootPlan::BOOT_NOW, Rule::FastBoot)),
        RebootMagic::CanBootloaderRequest(_) =>
            Some((BootPlan::new(false, config.can_request_timeout_ms), Rule::CanRequest)),
        RebootMagic::Off | RebootMagic::FirmwareOk =>
            None,
    }
}

/// Short window for verified firmware, or the plain update window
/// when firmware is not checked
fn verified_plan(integrity: Option<IntegrityResult>, config: &BootConfig) -> (BootPlan, Rule) {
    match integrity {
        Some(IntegrityResult::Ok) =>
            (BootPlan::new(true, config.fast_boot_timeout_ms), Rule::FastBootVerified),
        _ =>
            (BootPlan::new(false, config.default_timeout_ms), Rule::Unverified),
    }
}

/// Never boot firmware that failed verification
fn integrity_veto(plan: BootPlan, rule: Rule, integrity: Option<IntegrityResult>) -> (BootPlan, Rule) {
    match integrity {
        Some(result) if !result.is_ok() => (BootPlan::STAY, Rule::BadFirmware),
        _ => (plan, rule),
    }
}

/// Without a USB host attached nobody can cancel the fast boot window
fn vbus_shortcut(plan: BootPlan, rule: Rule, pins: StrapPinState) -> (BootPlan, Rule) {
    match (rule, pins.vbus_present) {
        (Rule::FastBootVerified, Some(false)) => (BootPlan::BOOT_NOW, Rule::NoUsbHost),
        _ => (plan, rule),
    }
}

/// A held strap pin keeps the bootloader resident
fn strap_veto(plan: BootPlan, rule: Rule, pins: StrapPinState) -> (BootPlan, Rule) {
    match pins.stay_in_bootloader {
        Some(true) => (BootPlan::STAY, Rule::StayPin),
        _ => (plan, rule),
    }
}
