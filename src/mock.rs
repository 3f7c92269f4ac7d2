//! Test doubles for the hardware and the update transports

use crate::{
    arbitration::Clock,
    board::{Board, BootHistory, Error, LedPattern},
    decision::StrapPinState,
    integrity::{AppDescriptor, IntegrityResult},
    jump::EntryError,
    reboot_magic::RebootMagic,
    transport::{Transport, TransportKind, TransportStep},
};

/// Advances only when slept on
pub struct FakeClock {
    pub now_ms: u32,
}

impl FakeClock {
    pub fn at(now_ms: u32) -> Self {
        FakeClock { now_ms }
    }
}

impl Clock for FakeClock {
    fn now(&mut self) -> u32 {
        self.now_ms
    }

    fn sleep(&mut self, ms: u32) {
        self.now_ms = self.now_ms.wrapping_add(ms);
    }
}

pub struct MockBoard {
    pub watchdog_reset: bool,
    pub magic: RebootMagic,
    /// Results of successive checks, the last one repeats
    pub integrity: Vec<IntegrityResult>,
    pub integrity_checks: usize,
    pub descriptor: Option<AppDescriptor>,
    pub strap_pins: StrapPinState,
    pub leds: Vec<LedPattern>,
    pub persisted: Vec<RebootMagic>,
    pub watchdog_cleared: usize,
    pub boot_log: Vec<String>,
    pub ext_flash_busy: u32,
    pub ext_flash_error: bool,
    pub ext_flash_probes: u32,
    pub protected: Option<bool>,
    pub entries: Vec<u32>,
    /// Refuse this many application entries before "jumping"
    pub refuse_entries: usize,
    /// Order of side effects
    pub events: Vec<&'static str>,
}

impl MockBoard {
    pub fn new() -> Self {
        MockBoard {
            watchdog_reset: false,
            magic: RebootMagic::Off,
            integrity: vec![IntegrityResult::Ok],
            integrity_checks: 0,
            descriptor: None,
            strap_pins: StrapPinState::default(),
            leds: Vec::new(),
            persisted: Vec::new(),
            watchdog_cleared: 0,
            boot_log: Vec::new(),
            ext_flash_busy: 0,
            ext_flash_error: false,
            ext_flash_probes: 0,
            protected: None,
            entries: Vec::new(),
            refuse_entries: 0,
            events: Vec::new(),
        }
    }

    pub fn last_led(&self) -> Option<LedPattern> {
        self.leds.last().cloned()
    }
}

impl Board for MockBoard {
    fn read_boot_history(&mut self) -> BootHistory {
        self.events.push("read_history");
        BootHistory {
            watchdog_reset: self.watchdog_reset,
            magic: self.magic,
        }
    }

    fn persist_reboot_magic(&mut self, magic: RebootMagic) {
        self.events.push("persist_magic");
        self.persisted.push(magic);
        self.magic = magic;
    }

    fn clear_watchdog_reason(&mut self) {
        self.events.push("clear_watchdog");
        self.watchdog_cleared += 1;
        self.watchdog_reset = false;
    }

    fn check_firmware_integrity(&mut self) -> IntegrityResult {
        self.events.push("check_firmware");
        let index = self.integrity_checks.min(self.integrity.len() - 1);
        self.integrity_checks += 1;
        self.integrity[index]
    }

    fn app_descriptor(&mut self) -> Option<AppDescriptor> {
        self.descriptor
    }

    fn strap_pins(&mut self) -> StrapPinState {
        self.strap_pins
    }

    fn set_led(&mut self, pattern: LedPattern) {
        self.leds.push(pattern);
    }

    fn append_boot_log(&mut self, line: &str) -> Result<(), Error> {
        self.events.push("boot_log");
        self.boot_log.push(line.to_owned());
        Ok(())
    }

    fn init_external_flash(&mut self) -> nb::Result<(), Error> {
        self.ext_flash_probes += 1;
        if self.ext_flash_busy > 0 {
            self.ext_flash_busy -= 1;
            if self.ext_flash_error {
                Err(nb::Error::Other(Error::ExternalFlash))
            } else {
                Err(nb::Error::WouldBlock)
            }
        } else {
            self.events.push("ext_flash_ready");
            Ok(())
        }
    }

    fn unprotect_flash(&mut self) {
        self.protected = Some(false);
    }

    fn protect_flash(&mut self) {
        self.events.push("protect_flash");
        self.protected = Some(true);
    }

    fn enter_application(&mut self, base_address: u32) -> EntryError {
        self.events.push("enter_application");
        self.entries.push(base_address);
        if self.refuse_entries > 0 {
            self.refuse_entries -= 1;
            EntryError::Erased
        } else {
            // stands in for a jump that never comes back
            EntryError::Returned
        }
    }
}

/// Transport following a fixed timeline
pub struct ScriptedTransport {
    pub kind: TransportKind,
    pub claim_at: Option<u32>,
    pub claim_once: bool,
    pub flash_at: Option<u32>,
    pub pending: bool,
    pub steps: usize,
    pub node_id: Option<u8>,
    pub started: usize,
    pub stopped: usize,
    pub status_lines: Vec<Vec<u8>>,
}

impl ScriptedTransport {
    pub fn new(kind: TransportKind) -> Self {
        ScriptedTransport {
            kind,
            claim_at: None,
            claim_once: false,
            flash_at: None,
            pending: false,
            steps: 0,
            node_id: None,
            started: 0,
            stopped: 0,
            status_lines: Vec::new(),
        }
    }

    pub fn claim_at(&mut self, now_ms: u32) {
        self.claim_at = Some(now_ms);
    }

    pub fn flash_at(&mut self, now_ms: u32) {
        self.flash_at = Some(now_ms);
    }
}

impl Transport for ScriptedTransport {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    fn step(&mut self, now_ms: u32) -> TransportStep {
        self.steps += 1;
        match (self.flash_at, self.claim_at) {
            (Some(t), _) if now_ms >= t => {
                self.flash_at = None;
                self.claim_at = None;
                TransportStep::Flashed
            }
            (_, Some(t)) if now_ms >= t => {
                if self.claim_once {
                    self.claim_at = None;
                }
                TransportStep::Claimed
            }
            _ => TransportStep::Idle,
        }
    }

    fn set_node_id(&mut self, node_id: u8) {
        self.node_id = Some(node_id);
    }

    fn update_pending(&mut self) -> bool {
        self.pending
    }

    fn start(&mut self) {
        self.started += 1;
    }

    fn stop(&mut self) {
        self.stopped += 1;
    }

    fn status(&mut self, line: &[u8]) {
        self.status_lines.push(line.to_vec());
    }
}
