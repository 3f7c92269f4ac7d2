use core::ops::Range;
use byteorder::{ByteOrder, LittleEndian};
use crate::{
    board_info::BoardInfo,
    integrity::{FirmwareCheck, IntegrityResult},
};

/// Erased flash
const ERASED: u32 = 0xFFFF_FFFF;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryError {
    /// Fewer than two words of vector table
    Truncated,
    /// No application programmed
    Erased,
    StackOutsideRam(u32),
    ResetOutsideApp(u32),
    /// Reset vector without the Thumb bit
    NotThumb(u32),
    /// Control came back from the application
    Returned,
}

/// Head of the application vector table
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AppVector {
    pub initial_sp: u32,
    pub reset_vector: u32,
}

impl AppVector {
    pub fn parse(table: &[u8]) -> Result<Self, EntryError> {
        if table.len() < 8 {
            return Err(EntryError::Truncated);
        }
        Ok(AppVector {
            initial_sp: LittleEndian::read_u32(&table[0..4]),
            reset_vector: LittleEndian::read_u32(&table[4..8]),
        })
    }

    /// The stack may start at the very end of RAM
    pub fn validate(&self, info: &BoardInfo, ram: Range<u32>) -> Result<(), EntryError> {
        if self.initial_sp == ERASED && self.reset_vector == ERASED {
            return Err(EntryError::Erased);
        }
        if self.initial_sp <= ram.start || self.initial_sp > ram.end {
            return Err(EntryError::StackOutsideRam(self.initial_sp));
        }
        if self.reset_vector & 1 == 0 {
            return Err(EntryError::NotThumb(self.reset_vector));
        }
        let entry = self.reset_vector & !1;
        if entry < info.app_base_address() || entry >= info.app_end_address() {
            return Err(EntryError::ResetOutsideApp(self.reset_vector));
        }
        Ok(())
    }
}

/// Presence check: an image whose vector table could not be entered
/// is `Absent`. Boards with CRC or signature checking supply their
/// own `FirmwareCheck`.
pub struct VectorCheck {
    info: BoardInfo,
    ram: Range<u32>,
}

impl VectorCheck {
    pub fn new(info: BoardInfo, ram: Range<u32>) -> Self {
        VectorCheck { info, ram }
    }
}

impl FirmwareCheck for VectorCheck {
    fn check(&mut self, image: &[u8]) -> IntegrityResult {
        match AppVector::parse(image).and_then(|vector| vector.validate(&self.info, self.ram.clone())) {
            Ok(()) => IntegrityResult::Ok,
            Err(_) => IntegrityResult::Absent,
        }
    }
}
