use crate::transport::TransportStep;

/// Parses the update protocol carried over the serial port
pub trait SerialProtocol {
    fn feed(&mut self, byte: u8, now_ms: u32) -> TransportStep;
}

/// Accepts no commands, never claims the device
pub struct Passive;

impl SerialProtocol for Passive {
    fn feed(&mut self, _byte: u8, _now_ms: u32) -> TransportStep {
        TransportStep::Idle
    }
}

/// Feed all received bytes. A completed flash stops consumption, the
/// remaining bytes belong to the next session.
pub fn drain<P, I>(protocol: &mut P, bytes: I, now_ms: u32) -> TransportStep
where
    P: SerialProtocol,
    I: IntoIterator<Item = u8>,
{
    let mut step = TransportStep::Idle;
    for byte in bytes {
        match protocol.feed(byte, now_ms) {
            TransportStep::Idle => {}
            TransportStep::Claimed =>
                step = TransportStep::Claimed,
            TransportStep::Flashed =>
                return TransportStep::Flashed,
        }
    }
    step
}
