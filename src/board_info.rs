use serde::Serialize;

const KIB: i64 = 1024;
const MIB: i64 = 1024 * KIB;

/// Flash layout of a board, fixed at build time.
#[derive(Clone, Copy, Debug)]
pub struct BoardGeometry {
    pub board_type: u32,
    pub board_revision: u32,
    pub flash_base: u32,
    pub flash_size_kb: u32,
    pub bootloader_kb: u32,
    pub reserve_end_kb: u32,
    pub app_start_offset_kb: u32,
    pub ext_flash_size_mb: u32,
    pub ext_flash_reserve_start_kb: u32,
    pub ext_flash_reserve_end_kb: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Error {
    /// Bootloader, reserved trailer and application offset leave no
    /// room for firmware
    InvalidFirmwareSize(i64),
    /// External flash reserves exceed its size
    InvalidExternalFlashSize(i64),
}

#[derive(Serialize, Clone, Copy, Debug, PartialEq)]
pub struct BoardInfo {
    pub board_type: u32,
    pub board_revision: u32,
    pub fw_size_bytes: u32,
    pub external_flash_size_bytes: u32,
    #[serde(skip)]
    app_base: u32,
    #[serde(skip)]
    bootloader_kb: u32,
    #[serde(skip)]
    app_start_offset_kb: u32,
}

impl BoardInfo {
    pub fn new(geometry: &BoardGeometry) -> Result<Self, Error> {
        let fw_size = (i64::from(geometry.flash_size_kb)
                       - i64::from(geometry.bootloader_kb)
                       - i64::from(geometry.reserve_end_kb)
                       - i64::from(geometry.app_start_offset_kb)) * KIB;
        if fw_size <= 0 {
            return Err(Error::InvalidFirmwareSize(fw_size));
        }

        let ext_size = if geometry.ext_flash_size_mb == 0 {
            0
        } else {
            i64::from(geometry.ext_flash_size_mb) * MIB
                - (i64::from(geometry.ext_flash_reserve_start_kb)
                   + i64::from(geometry.ext_flash_reserve_end_kb)) * KIB
        };
        if ext_size < 0 {
            return Err(Error::InvalidExternalFlashSize(ext_size));
        }

        let app_base = geometry.flash_base
            + (geometry.bootloader_kb + geometry.app_start_offset_kb) * KIB as u32;

        Ok(BoardInfo {
            board_type: geometry.board_type,
            board_revision: geometry.board_revision,
            fw_size_bytes: fw_size as u32,
            external_flash_size_bytes: ext_size as u32,
            app_base,
            bootloader_kb: geometry.bootloader_kb,
            app_start_offset_kb: geometry.app_start_offset_kb,
        })
    }

    /// Some parts report 2 MiB of flash but only the lower 1 MiB is
    /// usable. There is no reserved trailer on those.
    pub fn limit_flash_1m(&mut self) -> Result<(), Error> {
        let fw_size = (1024 - i64::from(self.bootloader_kb) - i64::from(self.app_start_offset_kb)) * KIB;
        if fw_size <= 0 {
            return Err(Error::InvalidFirmwareSize(fw_size));
        }
        self.fw_size_bytes = fw_size as u32;
        Ok(())
    }

    /// Address of the application vector table
    pub fn app_base_address(&self) -> u32 {
        self.app_base
    }

    /// First address past the application region
    pub fn app_end_address(&self) -> u32 {
        self.app_base + self.fw_size_bytes
    }
}

/// What the board was built with. Replaces per-board conditional
/// compilation inside the boot logic.
#[derive(Serialize, Clone, Copy, Debug, Default, PartialEq)]
pub struct Capabilities {
    pub can: bool,
    pub network: bool,
    pub sdcard: bool,
    pub serial: bool,
    pub check_firmware: bool,
    pub ext_flash_required: bool,
    pub flash_protection: bool,
    pub stay_pin: bool,
    pub vbus_check: bool,
}

impl Capabilities {
    /// Capabilities selected by cargo features
    pub const fn from_features() -> Self {
        Capabilities {
            can: cfg!(feature = "can"),
            network: cfg!(feature = "network"),
            sdcard: cfg!(feature = "sdcard"),
            serial: cfg!(feature = "serial"),
            check_firmware: cfg!(feature = "check-firmware"),
            ext_flash_required: cfg!(feature = "ext-flash"),
            flash_protection: cfg!(feature = "flash-protection"),
            stay_pin: cfg!(feature = "stay-pin"),
            vbus_check: cfg!(feature = "vbus-check"),
        }
    }
}
