use log::LevelFilter;

#[cfg(not(feature = "semihosting"))]
static USB_LOGGER: crate::usb::Logger = crate::usb::Logger;

#[cfg(not(feature = "semihosting"))]
pub fn init_log() {
    if log::set_logger(&USB_LOGGER).is_ok() {
        log::set_max_level(LevelFilter::Info);
    }
}

#[cfg(feature = "semihosting")]
pub fn init_log() {
    use cortex_m_log::log::{Logger, init};
    use cortex_m_log::printer::semihosting::{InterruptOk, hio::HStdout};
    static mut LOGGER: Option<Logger<InterruptOk<HStdout>>> = None;
    let inner = match InterruptOk::<_>::stdout() {
        Ok(inner) => inner,
        // no debugger attached
        Err(_) => return,
    };
    let logger = Logger {
        inner,
        level: LevelFilter::Debug,
    };
    let logger = unsafe {
        LOGGER.get_or_insert(logger)
    };

    let _ = init(logger);
}
