use stm32f4xx_hal::{
    gpio::{
        gpioa::{PA9, PA11, PA12},
        gpiob::PB2,
        Alternate, AF10, Floating, GpioExt, Input, PullUp,
    },
    hal::digital::v2::InputPin,
    stm32::{GPIOA, GPIOB, GPIOD},
};
use crate::{
    board_info::Capabilities,
    decision::StrapPinState,
    leds::Leds,
};

/// Level of the stay-in-bootloader pin that holds the board
const STAY_IN_BOOTLOADER_LEVEL: bool = false;

pub type UsbDm = PA11<Alternate<AF10>>;
pub type UsbDp = PA12<Alternate<AF10>>;

pub struct StrapPins {
    /// BOOT1, pulled up
    stay: PB2<Input<PullUp>>,
    /// OTG_FS_VBUS sense
    vbus: PA9<Input<Floating>>,
}

impl StrapPins {
    pub fn sample(&self, caps: &Capabilities) -> StrapPinState {
        let stay_in_bootloader = if caps.stay_pin {
            self.stay.is_high().ok()
                .map(|level| level == STAY_IN_BOOTLOADER_LEVEL)
        } else {
            None
        };
        let vbus_present = if caps.vbus_check {
            self.vbus.is_high().ok()
        } else {
            None
        };
        StrapPinState { stay_in_bootloader, vbus_present }
    }
}

pub struct Pins {
    pub leds: Leds,
    pub strap: StrapPins,
    pub usb_dm: UsbDm,
    pub usb_dp: UsbDp,
}

impl Pins {
    pub fn setup(gpioa: GPIOA, gpiob: GPIOB, gpiod: GPIOD) -> Self {
        let gpioa = gpioa.split();
        let gpiob = gpiob.split();
        let gpiod = gpiod.split();

        let leds = Leds::new(gpiod.pd9, gpiod.pd10);
        let strap = StrapPins {
            stay: gpiob.pb2.into_pull_up_input(),
            vbus: gpioa.pa9.into_floating_input(),
        };
        // OTG_FS D-/D+
        let usb_dm = gpioa.pa11.into_alternate_af10();
        let usb_dp = gpioa.pa12.into_alternate_af10();

        Pins { leds, strap, usb_dm, usb_dp }
    }
}
