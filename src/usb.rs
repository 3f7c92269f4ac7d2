use core::{fmt::{self, Write}, mem::MaybeUninit};
use cortex_m::interrupt::free;
use heapless::{consts::U256, spsc::Queue};
use stm32f4xx_hal::{
    otg_fs::{USB, UsbBus as Bus},
    stm32::{interrupt, Interrupt, NVIC},
};
use usb_device::{
    class_prelude::{UsbBusAllocator},
    prelude::{UsbDevice, UsbDeviceBuilder, UsbVidPid},
};
use usbd_serial::SerialPort;
use log::{Record, Log, Metadata};
use crate::{
    serial::{self, SerialProtocol},
    transport::{Transport, TransportKind, TransportStep},
};

static mut EP_MEMORY: [u32; 1024] = [0; 1024];

static mut BUS: MaybeUninit<UsbBusAllocator<Bus<USB>>> = MaybeUninit::uninit();
static mut STATE: Option<State> = None;

pub struct State {
    serial: SerialPort<'static, Bus<USB>>,
    dev: UsbDevice<'static, Bus<USB>>,
    rx: Queue<u8, U256>,
}

impl State {
    pub fn setup(usb: USB, board_type: u16) {
        unsafe { BUS.write(Bus::new(usb, &mut EP_MEMORY)) };

        let bus = unsafe { BUS.assume_init_ref() };
        let serial = SerialPort::new(bus);
        let dev = UsbDeviceBuilder::new(bus, UsbVidPid(0x1209, 0x5740))
            .manufacturer("fmuboot")
            .product("bootloader")
            .device_release(board_type)
            .self_powered(true)
            .device_class(usbd_serial::USB_CLASS_CDC)
            .build();

        free(|_| {
            unsafe { STATE = Some(State { serial, dev, rx: Queue::new() }); }
        });

        unsafe {
            NVIC::unmask(Interrupt::OTG_FS);
        }
    }

    pub fn get() -> Option<&'static mut Self> {
        unsafe { STATE.as_mut() }
    }

    pub fn poll() {
        if let Some(ref mut s) = Self::get() {
            if s.dev.poll(&mut [&mut s.serial]) {
                let mut buf = [0u8; 64];
                if let Ok(count) = s.serial.read(&mut buf) {
                    for byte in &buf[..count] {
                        // overrun drops input
                        let _ = s.rx.enqueue(*byte);
                    }
                }
            }
        }
    }

    pub fn read_byte() -> Option<u8> {
        free(|_| Self::get().and_then(|s| s.rx.dequeue()))
    }

    pub fn write(data: &[u8]) {
        if let Some(ref mut state) = Self::get() {
            for chunk in data.chunks(16) {
                if free(|_| state.serial.write(chunk)).is_err() {
                    break;
                }
            }
        }
    }

    pub fn start() {
        if Self::get().is_some() {
            unsafe { NVIC::unmask(Interrupt::OTG_FS) };
        }
    }

    /// The application brings up its own USB stack
    pub fn stop() {
        NVIC::mask(Interrupt::OTG_FS);
        NVIC::unpend(Interrupt::OTG_FS);
    }
}

#[interrupt]
fn OTG_FS() {
    free(|_| {
        State::poll();
    });
}

/// Update protocol over the CDC port. Only the protocol claims the
/// device, an open port alone does not.
pub struct UsbTransport<P> {
    protocol: P,
}

impl<P: SerialProtocol> UsbTransport<P> {
    pub fn new(protocol: P) -> Self {
        UsbTransport { protocol }
    }
}

impl<P: SerialProtocol> Transport for UsbTransport<P> {
    fn kind(&self) -> TransportKind {
        TransportKind::Serial
    }

    fn step(&mut self, now_ms: u32) -> TransportStep {
        serial::drain(&mut self.protocol, core::iter::from_fn(State::read_byte), now_ms)
    }

    fn start(&mut self) {
        State::start();
    }

    fn stop(&mut self) {
        State::stop();
    }

    fn status(&mut self, line: &[u8]) {
        State::write(line);
    }
}

pub struct Logger;

impl Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let mut output = SerialOutput;
            let _ = writeln!(&mut output, "{} - {}", record.level(), record.args());
        }
    }

    fn flush(&self) {
        if let Some(ref mut state) = State::get() {
            let _ = free(|_| state.serial.flush());
        }
    }
}

pub struct SerialOutput;

impl Write for SerialOutput {
    fn write_str(&mut self, s: &str) -> core::result::Result<(), core::fmt::Error> {
        if let Some(ref mut state) = State::get() {
            for chunk in s.as_bytes().chunks(16) {
                free(|_| state.serial.write(chunk))
                    .map_err(|_| fmt::Error)?;
            }
        }
        Ok(())
    }
}
