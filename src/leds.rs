use stm32f4xx_hal::{
    gpio::{
        gpiod::{PD9, PD10},
        Output, PushPull,
    },
    hal::digital::v2::OutputPin,
};
use crate::board::LedPattern;

pub struct Leds {
    /// Red LED, faults
    pub red: Led<PD9<Output<PushPull>>>,
    /// Green LED, bootloader active
    pub green: Led<PD10<Output<PushPull>>>,
}

impl Leds {
    pub fn new<M1, M2>(red: PD9<M1>, green: PD10<M2>) -> Self {
        Leds {
            red: Led::new(red.into_push_pull_output()),
            green: Led::new(green.into_push_pull_output()),
        }
    }

    pub fn show(&mut self, pattern: LedPattern) {
        let (red, green) = match pattern {
            LedPattern::Bootloader => (false, true),
            LedPattern::BadFirmware => (true, false),
            LedPattern::Booting => (false, false),
            LedPattern::Fatal => (true, true),
        };
        self.red.set(red);
        self.green.set(green);
    }
}

pub struct Led<P> {
    pin: P,
}

impl<P: OutputPin> Led<P> {
    pub fn new(pin: P) -> Self {
        Led { pin }
    }

    pub fn on(&mut self) {
        let _ = self.pin.set_high();
    }

    pub fn off(&mut self) {
        let _ = self.pin.set_low();
    }

    pub fn set(&mut self, on: bool) {
        if on {
            self.on();
        } else {
            self.off();
        }
    }
}
