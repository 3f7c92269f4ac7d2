use serde::{Serialize, Deserialize};

/// Timings of the boot decision and the update loop, in milliseconds
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct BootConfig {
    /// Window used when nothing else decided, and firmware could not be
    /// verified
    pub default_timeout_ms: u32,
    /// Cancellation window before booting verified firmware
    pub fast_boot_timeout_ms: u32,
    /// Window after the application requested a CAN update
    pub can_request_timeout_ms: u32,
    /// Sleep between update loop iterations
    pub poll_interval_ms: u32,
    /// Sleep between external flash probes
    pub ext_flash_retry_ms: u32,
}

impl Default for BootConfig {
    fn default() -> Self {
        BootConfig {
            default_timeout_ms: 5_000,
            fast_boot_timeout_ms: 1_000,
            can_request_timeout_ms: 10_000,
            poll_interval_ms: 1,
            ext_flash_retry_ms: 20,
        }
    }
}
