use core::fmt;
use serde::Serialize;

/// Verdict of the firmware check on the installed application
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IntegrityResult {
    Ok,
    BadCrc,
    BadSignature,
    Absent,
}

impl IntegrityResult {
    pub fn is_ok(&self) -> bool {
        *self == IntegrityResult::Ok
    }

    pub fn name(&self) -> &'static str {
        match self {
            IntegrityResult::Ok => "ok",
            IntegrityResult::BadCrc => "bad_crc",
            IntegrityResult::BadSignature => "bad_signature",
            IntegrityResult::Absent => "absent",
        }
    }

    /// Line appended to the boot log on the SD card
    pub fn boot_log_line(&self) -> &'static str {
        if self.is_ok() {
            "GOOD FIRMWARE: CRC and signature OK"
        } else {
            "BAD FIRMWARE: CRC or signature check failed"
        }
    }
}

impl fmt::Display for IntegrityResult {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        fmt.write_str(self.name())
    }
}

/// Verifies the application image in flash
pub trait FirmwareCheck {
    fn check(&mut self, image: &[u8]) -> IntegrityResult;

    fn app_descriptor(&mut self, _image: &[u8]) -> Option<AppDescriptor> {
        None
    }
}

/// Version information embedded in a verified application
#[derive(Serialize, Clone, Copy, Debug, PartialEq)]
pub struct AppDescriptor {
    pub version_major: u32,
    pub version_minor: u32,
    pub git_hash: u32,
}

impl fmt::Display for AppDescriptor {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        write!(fmt, "{}.{}.{:x}", self.version_major, self.version_minor, self.git_hash)
    }
}
