use serde::Serialize;
use heapless::{consts::U512, Vec};
use crate::{
    board_info::BoardInfo,
    decision::{BootInputs, Resolution},
    integrity::AppDescriptor,
};

pub type JsonBuffer = Vec<u8, U512>;

/// Outcome of a boot decision, published to connected peers
#[derive(Serialize, Clone, Debug)]
pub struct BootReport<'a> {
    board: &'a BoardInfo,
    watchdog_reset: bool,
    magic: &'static str,
    integrity: Option<&'static str>,
    firmware: Option<AppDescriptor>,
    rule: &'static str,
    try_boot: bool,
    timeout_ms: u32,
}

impl<'a> BootReport<'a> {
    pub fn new(
        board: &'a BoardInfo,
        inputs: &BootInputs,
        resolution: &Resolution,
        firmware: Option<AppDescriptor>,
    ) -> Self {
        BootReport {
            board,
            watchdog_reset: inputs.watchdog_reset,
            magic: inputs.magic.name(),
            integrity: inputs.integrity.map(|result| result.name()),
            firmware,
            rule: resolution.rule.name(),
            try_boot: resolution.plan.try_boot,
            timeout_ms: resolution.plan.timeout_ms,
        }
    }

    pub fn to_json(&self) -> Result<JsonBuffer, serde_json_core::ser::Error> {
        serde_json_core::to_vec(self)
    }
}
