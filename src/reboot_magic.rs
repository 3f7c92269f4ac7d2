use bit_field::BitField;

const MAGIC_OFF: u32 = 0;
const MAGIC_HOLD: u32 = 0xb007_0001;
const MAGIC_FAST: u32 = 0xb007_0002;
/// ORed with the 8 bit local node id
const MAGIC_CANBL: u32 = 0xb008_0000;
/// Set by the application once it has run long enough to be trusted
const MAGIC_FWOK: u32 = 0xb009_3a26;

/// Intent passed from the previous boot session through battery-backed
/// RAM.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RebootMagic {
    Off,
    /// Stay in the bootloader
    Hold,
    /// Skip the wait, boot immediately
    FastBoot,
    /// Listen for a CAN firmware update as node `node_id`
    CanBootloaderRequest(u8),
    /// The application confirmed itself healthy before resetting
    FirmwareOk,
}

impl Default for RebootMagic {
    fn default() -> Self {
        RebootMagic::Off
    }
}

impl RebootMagic {
    /// Unknown values decode as `Off` so that stale backup RAM never
    /// traps the board in the bootloader.
    pub fn decode(raw: u32) -> Self {
        match raw {
            MAGIC_HOLD => RebootMagic::Hold,
            MAGIC_FAST => RebootMagic::FastBoot,
            MAGIC_FWOK => RebootMagic::FirmwareOk,
            _ if Self::is_canbl(raw) =>
                RebootMagic::CanBootloaderRequest(raw.get_bits(0..8) as u8),
            _ => RebootMagic::Off,
        }
    }

    pub fn encode(self) -> u32 {
        match self {
            RebootMagic::Off => MAGIC_OFF,
            RebootMagic::Hold => MAGIC_HOLD,
            RebootMagic::FastBoot => MAGIC_FAST,
            RebootMagic::FirmwareOk => MAGIC_FWOK,
            RebootMagic::CanBootloaderRequest(node_id) => {
                let mut raw = MAGIC_CANBL;
                raw.set_bits(0..8, node_id.into());
                raw
            }
        }
    }

    fn is_canbl(raw: u32) -> bool {
        raw.get_bits(8..32) == MAGIC_CANBL.get_bits(8..32)
    }

    pub fn name(&self) -> &'static str {
        match self {
            RebootMagic::Off => "off",
            RebootMagic::Hold => "hold",
            RebootMagic::FastBoot => "fast",
            RebootMagic::CanBootloaderRequest(_) => "canbl",
            RebootMagic::FirmwareOk => "fwok",
        }
    }
}
