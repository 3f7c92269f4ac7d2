//! One boot session: decide, wait for updates, hand over.

use log::{error, info, warn};
use crate::{
    arbitration::{self, Clock, TerminalAction},
    board::{Board, LedPattern},
    board_info::{BoardInfo, Capabilities},
    config::BootConfig,
    decision::{resolve, BootInputs, Resolution},
    dispatch::{self, Dispatch},
    integrity::IntegrityResult,
    reboot_magic::RebootMagic,
    report::BootReport,
    transport::TransportSet,
};

pub struct BootSession<'a, B, C> {
    board: B,
    clock: C,
    transports: TransportSet<'a>,
    info: BoardInfo,
    caps: Capabilities,
    config: BootConfig,
    transports_started: bool,
    /// Result of checking a freshly written image
    rechecked: Option<IntegrityResult>,
}

impl<'a, B: Board, C: Clock> BootSession<'a, B, C> {
    pub fn new(
        board: B,
        clock: C,
        transports: TransportSet<'a>,
        info: BoardInfo,
        caps: Capabilities,
        config: BootConfig,
    ) -> Self {
        BootSession {
            board,
            clock,
            transports,
            info,
            caps,
            config,
            transports_started: false,
            rechecked: None,
        }
    }

    pub fn board(&self) -> &B {
        &self.board
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Decision phase: gather inputs, resolve, consume persisted
    /// intent.
    pub fn decide(&mut self) -> Resolution {
        if self.caps.flash_protection {
            self.board.unprotect_flash();
        }

        let history = self.board.read_boot_history();
        let integrity = match self.rechecked.take() {
            Some(result) => Some(result),
            None if self.caps.check_firmware => Some(self.board.check_firmware_integrity()),
            None => None,
        };
        let inputs = BootInputs {
            watchdog_reset: history.watchdog_reset,
            magic: history.magic,
            integrity,
            strap_pins: self.board.strap_pins(),
            update_pending: self.transports.update_pending(),
        };
        let resolution = resolve(&inputs, &self.config);
        info!(
            "watchdog={} magic={} integrity={} -> {}: try_boot={} timeout={}",
            inputs.watchdog_reset, inputs.magic.name(),
            integrity.map(|result| result.name()).unwrap_or("unchecked"),
            resolution.rule.name(),
            resolution.plan.try_boot, resolution.plan.timeout_ms,
        );

        // must be cleared before anything can reset the MCU again
        self.board.persist_reboot_magic(RebootMagic::Off);
        if resolution.clear_watchdog_reason {
            self.board.clear_watchdog_reason();
        }

        match resolution.fault {
            Some(result) => {
                warn!("bad firmware: {}", result);
                self.board.set_led(LedPattern::BadFirmware);
            }
            None =>
                self.board.set_led(LedPattern::Bootloader),
        }
        if let Some(result) = integrity {
            if self.caps.sdcard {
                let _ = self.board.append_boot_log(result.boot_log_line())
                    .map_err(|e| warn!("boot log: {:?}", e));
            }
        }

        if let Some(node_id) = resolution.can_node_id {
            if !self.transports.set_node_id(node_id) {
                warn!("no CAN transport for node id {}", node_id);
            }
        }

        self.publish(&inputs, &resolution);
        resolution
    }

    fn publish(&mut self, inputs: &BootInputs, resolution: &Resolution) {
        let firmware = match inputs.integrity {
            Some(IntegrityResult::Ok) => self.board.app_descriptor(),
            _ => None,
        };
        if let Some(descriptor) = firmware {
            info!("firmware {}", descriptor);
        }
        match BootReport::new(&self.info, inputs, resolution, firmware).to_json() {
            Ok(mut buf) => {
                if buf.push(b'\n').is_err() {
                    warn!("boot report of {} bytes fills the buffer, sent without newline", buf.len());
                }
                self.transports.status(&buf);
            }
            Err(e) =>
                error!("unable to serialize boot report: {:?}", e),
        }
    }

    /// Decide, then boot or run the update loop, then dispatch
    pub fn run_once(&mut self) -> Dispatch {
        let resolution = self.decide();

        if self.caps.ext_flash_required {
            arbitration::wait_for_external_flash(
                &mut self.board, &mut self.clock, self.config.ext_flash_retry_ms
            );
        }

        let action = if resolution.plan.boots_immediately() {
            TerminalAction::Boot
        } else {
            if !self.transports_started {
                self.transports.start();
                self.transports_started = true;
            }
            arbitration::run(
                resolution.plan, &mut self.transports,
                &mut self.clock, self.config.poll_interval_ms
            )
        };

        dispatch::enter(action, &mut self.board, &mut self.transports, &self.info, &self.caps)
    }

    /// Sessions repeat after a flash, or when the application could not
    /// be entered, as though the board had been reset.
    pub fn run(mut self) -> ! {
        loop {
            match self.run_once() {
                Dispatch::Flashed(integrity) =>
                    self.rechecked = integrity,
                Dispatch::EntryFailed(e) => {
                    warn!("restarting boot decision after {:?}", e);
                    // stopped for the handover
                    self.transports_started = false;
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::board_info::BoardGeometry;
    use crate::decision::{BootPlan, Rule, StrapPinState};
    use crate::jump::EntryError;
    use crate::mock::{FakeClock, MockBoard, ScriptedTransport};
    use crate::transport::TransportKind;

    const APP_BASE: u32 = 0x0800_4000;

    fn info() -> BoardInfo {
        BoardInfo::new(&BoardGeometry {
            board_type: 9,
            board_revision: 0,
            flash_base: 0x0800_0000,
            flash_size_kb: 2048,
            bootloader_kb: 16,
            reserve_end_kb: 0,
            app_start_offset_kb: 0,
            ext_flash_size_mb: 0,
            ext_flash_reserve_start_kb: 0,
            ext_flash_reserve_end_kb: 0,
        }).unwrap()
    }

    fn caps() -> Capabilities {
        Capabilities {
            can: true,
            serial: true,
            check_firmware: true,
            flash_protection: true,
            ..Capabilities::default()
        }
    }

    fn session<'a>(board: MockBoard, transports: TransportSet<'a>) -> BootSession<'a, MockBoard, FakeClock> {
        BootSession::new(board, FakeClock::at(0), transports, info(), caps(), BootConfig::default())
    }

    #[test]
    fn fast_boot_skips_update_loop() {
        let mut board = MockBoard::new();
        board.magic = RebootMagic::FastBoot;
        let mut serial = ScriptedTransport::new(TransportKind::Serial);
        let mut set = TransportSet::new();
        set.register(&mut serial);

        let mut session = session(board, set);
        assert_eq!(session.run_once(), Dispatch::EntryFailed(EntryError::Returned));
        assert_eq!(session.board().entries, vec![APP_BASE]);
        assert_eq!(session.clock().now_ms, 0);
        assert_eq!(session.board().persisted, vec![RebootMagic::Off]);
        drop(session);
        assert_eq!(serial.steps, 0);
        assert_eq!(serial.started, 0);
    }

    #[test]
    fn bad_crc_waits_indefinitely() {
        let mut board = MockBoard::new();
        board.integrity = vec![IntegrityResult::BadCrc];
        let mut serial = ScriptedTransport::new(TransportKind::Serial);
        serial.flash_at(600_000);
        let mut set = TransportSet::new();
        set.register(&mut serial);

        let mut session = session(board, set);
        let resolution = session.decide();
        assert_eq!(resolution.plan, BootPlan::STAY);
        assert_eq!(session.board().last_led(), Some(LedPattern::BadFirmware));
        assert_eq!(session.run_once(), Dispatch::Flashed(Some(IntegrityResult::BadCrc)));
        assert_eq!(session.clock().now_ms, 600_000);
        assert!(session.board().entries.is_empty());
    }

    #[test]
    fn can_request_boots_after_window() {
        let mut board = MockBoard::new();
        board.magic = RebootMagic::CanBootloaderRequest(7);
        let mut can = ScriptedTransport::new(TransportKind::Can);
        let mut set = TransportSet::new();
        set.register(&mut can);

        let mut session = session(board, set);
        assert_eq!(session.run_once(), Dispatch::EntryFailed(EntryError::Returned));
        assert_eq!(session.clock().now_ms, 10_001);
        assert_eq!(session.board().entries, vec![APP_BASE]);
        drop(session);
        assert_eq!(can.node_id, Some(7));
        assert_eq!(can.started, 1);
        assert_eq!(can.stopped, 1);
    }

    #[test]
    fn flash_is_rechecked_then_decided_again() {
        let mut board = MockBoard::new();
        board.integrity = vec![IntegrityResult::Ok];
        let mut network = ScriptedTransport::new(TransportKind::Network);
        network.flash_at(500);
        let mut set = TransportSet::new();
        set.register(&mut network);

        let mut session = session(board, set);
        assert_eq!(session.run_once(), Dispatch::Flashed(Some(IntegrityResult::Ok)));
        assert_eq!(session.clock().now_ms, 500);
        assert_eq!(session.board().integrity_checks, 2);

        session.rechecked = Some(IntegrityResult::Ok);
        let resolution = session.decide();
        // no third check, the recheck result is used
        assert_eq!(session.board().integrity_checks, 2);
        assert_eq!(resolution.plan, BootPlan::new(true, 1000));
    }

    #[test]
    fn bad_flash_keeps_bootloader_resident() {
        let mut board = MockBoard::new();
        board.integrity = vec![IntegrityResult::Ok, IntegrityResult::BadSignature];
        let mut serial = ScriptedTransport::new(TransportKind::Serial);
        serial.flash_at(100);
        let mut set = TransportSet::new();
        set.register(&mut serial);

        let mut session = session(board, set);
        match session.run_once() {
            Dispatch::Flashed(integrity) => session.rechecked = integrity,
            other => panic!("{:?}", other),
        }
        let resolution = session.decide();
        assert_eq!(resolution.rule, Rule::BadFirmware);
        assert_eq!(session.board().last_led(), Some(LedPattern::BadFirmware));
    }

    #[test]
    fn unconfirmed_watchdog_stays_then_boots_after_flash() {
        let mut board = MockBoard::new();
        board.watchdog_reset = true;
        let mut serial = ScriptedTransport::new(TransportKind::Serial);
        serial.flash_at(42);
        let mut set = TransportSet::new();
        set.register(&mut serial);

        let mut session = session(board, set);
        match session.run_once() {
            Dispatch::Flashed(integrity) => session.rechecked = integrity,
            other => panic!("{:?}", other),
        }
        assert_eq!(session.board().watchdog_cleared, 1);
        // watchdog reason is gone, verified firmware fast boots
        assert_eq!(session.decide().plan, BootPlan::new(true, 1000));
    }

    #[test]
    fn magic_cleared_before_boot() {
        let mut board = MockBoard::new();
        board.magic = RebootMagic::FastBoot;
        let mut session = session(board, TransportSet::new());
        session.run_once();
        let events = &session.board().events;
        let persist = events.iter().position(|e| *e == "persist_magic").unwrap();
        let clear = events.iter().position(|e| *e == "clear_watchdog").unwrap();
        let protect = events.iter().position(|e| *e == "protect_flash").unwrap();
        let enter = events.iter().position(|e| *e == "enter_application").unwrap();
        assert!(persist < enter);
        assert!(clear < enter);
        assert!(protect < enter);
    }

    #[test]
    fn stay_pin_holds() {
        let mut board = MockBoard::new();
        board.magic = RebootMagic::FastBoot;
        board.strap_pins = StrapPinState { stay_in_bootloader: Some(true), vbus_present: None };
        let mut session = session(board, TransportSet::new());
        let resolution = session.decide();
        assert_eq!(resolution.plan, BootPlan::STAY);
        assert_eq!(resolution.rule, Rule::StayPin);
    }

    #[test]
    fn pending_update_keeps_bootloader() {
        let board = MockBoard::new();
        let mut can = ScriptedTransport::new(TransportKind::Can);
        can.pending = true;
        let mut set = TransportSet::new();
        set.register(&mut can);
        let mut session = session(board, set);
        assert_eq!(session.decide().rule, Rule::UpdatePending);
    }

    #[test]
    fn waits_for_external_flash_before_boot() {
        let mut board = MockBoard::new();
        board.magic = RebootMagic::FastBoot;
        board.ext_flash_busy = 3;
        let caps = Capabilities { ext_flash_required: true, ..caps() };
        let mut session = BootSession::new(
            board, FakeClock::at(0), TransportSet::new(), info(), caps, BootConfig::default()
        );
        session.run_once();
        assert_eq!(session.clock().now_ms, 60);
        let events = &session.board().events;
        let ready = events.iter().position(|e| *e == "ext_flash_ready").unwrap();
        let enter = events.iter().position(|e| *e == "enter_application").unwrap();
        assert!(ready < enter);
    }

    #[test]
    fn boot_log_written_with_sdcard() {
        let mut board = MockBoard::new();
        board.integrity = vec![IntegrityResult::Absent];
        let caps = Capabilities { sdcard: true, ..caps() };
        let mut session = BootSession::new(
            board, FakeClock::at(0), TransportSet::new(), info(), caps, BootConfig::default()
        );
        session.decide();
        assert_eq!(session.board().boot_log, vec!["BAD FIRMWARE: CRC or signature check failed"]);
    }

    #[test]
    fn status_published_to_transports() {
        let mut board = MockBoard::new();
        board.descriptor = Some(crate::integrity::AppDescriptor {
            version_major: 4,
            version_minor: 6,
            git_hash: 0x1234,
        });
        let mut network = ScriptedTransport::new(TransportKind::Network);
        let mut set = TransportSet::new();
        set.register(&mut network);
        let mut session = session(board, set);
        session.decide();
        drop(session);
        assert_eq!(network.status_lines.len(), 1);
        let line = core::str::from_utf8(&network.status_lines[0]).unwrap();
        assert!(line.contains("\"git_hash\":4660"), "{}", line);
        assert!(line.ends_with("}\n"), "{}", line);
    }

    #[test]
    fn unchecked_board_uses_default_window() {
        let board = MockBoard::new();
        let caps = Capabilities { check_firmware: false, ..caps() };
        let mut session = BootSession::new(
            board, FakeClock::at(0), TransportSet::new(), info(), caps, BootConfig::default()
        );
        assert_eq!(session.run_once(), Dispatch::EntryFailed(EntryError::Returned));
        assert_eq!(session.clock().now_ms, 5001);
        assert_eq!(session.board().integrity_checks, 0);
    }
}
