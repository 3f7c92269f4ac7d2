use log::info;

/// Transport kinds in polling priority order
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportKind {
    Can = 0,
    Network = 1,
    SdCard = 2,
    Serial = 3,
}

pub const TRANSPORTS: usize = 4;

impl TransportKind {
    pub fn name(&self) -> &'static str {
        match self {
            TransportKind::Can => "can",
            TransportKind::Network => "network",
            TransportKind::SdCard => "sdcard",
            TransportKind::Serial => "serial",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportStep {
    Idle,
    /// An update transaction has begun
    Claimed,
    /// A complete image was written
    Flashed,
}

/// A channel through which new firmware can arrive.
///
/// `step()` must not block. Errors inside the transport (malformed
/// frames, a failed mount) are reported as `Idle`.
pub trait Transport {
    fn kind(&self) -> TransportKind;

    fn step(&mut self, now_ms: u32) -> TransportStep;

    /// Node id requested by the application through the reboot magic
    fn set_node_id(&mut self, _node_id: u8) {}

    /// Checked once at entry: is an update already in progress?
    fn update_pending(&mut self) -> bool {
        false
    }

    /// Bring up before the update loop
    fn start(&mut self) {}

    /// Release peripherals before the application runs
    fn stop(&mut self) {}

    /// Publish a status line to a connected peer
    fn status(&mut self, _line: &[u8]) {}
}

/// Outcome of one round over all transports
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tick {
    Idle,
    Claimed(TransportKind),
    Flashed(TransportKind),
}

/// At most one transport per kind, polled in `TransportKind` order
pub struct TransportSet<'a> {
    slots: [Option<&'a mut dyn Transport>; TRANSPORTS],
}

impl<'a> Default for TransportSet<'a> {
    fn default() -> Self {
        TransportSet::new()
    }
}

impl<'a> TransportSet<'a> {
    pub fn new() -> Self {
        TransportSet {
            slots: [None, None, None, None],
        }
    }

    /// Replaces any transport of the same kind
    pub fn register(&mut self, transport: &'a mut dyn Transport) {
        let kind = transport.kind();
        self.slots[kind as usize] = Some(transport);
    }

    pub fn for_each<F: FnMut(&mut dyn Transport)>(&mut self, mut callback: F) {
        for slot in self.slots.iter_mut() {
            if let Some(transport) = slot {
                callback(&mut **transport);
            }
        }
    }

    /// Step every transport once. The first to report `Flashed` ends
    /// the round.
    pub fn step(&mut self, now_ms: u32) -> Tick {
        let mut tick = Tick::Idle;
        for slot in self.slots.iter_mut() {
            if let Some(transport) = slot {
                match transport.step(now_ms) {
                    TransportStep::Idle => {}
                    TransportStep::Claimed => {
                        if tick == Tick::Idle {
                            tick = Tick::Claimed(transport.kind());
                        }
                    }
                    TransportStep::Flashed =>
                        return Tick::Flashed(transport.kind()),
                }
            }
        }
        tick
    }

    /// Entry pre-check across all transports
    pub fn update_pending(&mut self) -> bool {
        let mut pending = false;
        self.for_each(|transport| {
            if transport.update_pending() {
                info!("{}: update in progress", transport.kind().name());
                pending = true;
            }
        });
        pending
    }

    pub fn set_node_id(&mut self, node_id: u8) -> bool {
        let mut forwarded = false;
        if let Some(can) = &mut self.slots[TransportKind::Can as usize] {
            can.set_node_id(node_id);
            forwarded = true;
        }
        forwarded
    }

    pub fn start(&mut self) {
        self.for_each(|transport| transport.start());
    }

    pub fn stop(&mut self) {
        self.for_each(|transport| transport.stop());
    }

    pub fn status(&mut self, line: &[u8]) {
        self.for_each(|transport| transport.status(line));
    }
}
