#![cfg_attr(not(test), no_std)]
#![cfg_attr(not(test), no_main)]
#![cfg_attr(test, allow(unused))]

#[cfg(not(any(feature = "semihosting", test)))]
use panic_abort as _;
#[cfg(all(feature = "semihosting", not(test)))]
use panic_semihosting as _;

use log::{error, info, warn};

#[cfg(not(test))]
use cortex_m_rt::entry;
#[cfg(not(test))]
use stm32f4xx_hal::{
    rcc::RccExt,
    time::{U32Ext, MegaHertz},
    otg_fs::USB,
    stm32::{CorePeripherals, Peripherals},
};

mod reboot_magic;
mod board_info;
use board_info::{BoardGeometry, BoardInfo, Capabilities};
mod config;
use config::BootConfig;
mod integrity;
mod decision;
mod transport;
mod serial;
use transport::TransportSet;
mod board;
mod jump;
use jump::VectorCheck;
mod arbitration;
mod dispatch;
mod report;
mod session;
use session::BootSession;
#[cfg(test)]
mod mock;

#[cfg(not(test))]
mod init_log;
#[cfg(not(test))]
use init_log::init_log;
#[cfg(not(test))]
mod usb;
#[cfg(not(test))]
mod leds;
#[cfg(not(test))]
mod pins;
#[cfg(not(test))]
use pins::Pins;
#[cfg(not(test))]
mod timer;
#[cfg(not(test))]
mod platform;
#[cfg(not(test))]
use platform::Stm32Board;


#[cfg(all(not(test), feature = "ext-flash"))]
compile_error!("the STM32 board has no external flash driver");
#[cfg(all(not(test), feature = "sdcard"))]
compile_error!("the STM32 board has no SD card boot log");

#[cfg(not(test))]
const HSE: MegaHertz = MegaHertz(24);

const GEOMETRY: BoardGeometry = BoardGeometry {
    board_type: 9,
    board_revision: 0,
    flash_base: 0x0800_0000,
    flash_size_kb: 2048,
    bootloader_kb: 16,
    reserve_end_kb: 0,
    app_start_offset_kb: 0,
    ext_flash_size_mb: 0,
    ext_flash_reserve_start_kb: 0,
    ext_flash_reserve_end_kb: 0,
};

/// Board info with any silicon flash limitation applied
fn load_board_info(limited_to_1m: bool) -> Result<BoardInfo, board_info::Error> {
    let mut info = BoardInfo::new(&GEOMETRY)?;
    if limited_to_1m {
        info.limit_flash_1m()?;
    }
    Ok(info)
}

/// Initialization and boot session
#[cfg(not(test))]
#[entry]
fn main() -> ! {
    init_log();
    info!("fmuboot");

    let cp = CorePeripherals::take().unwrap();
    let dp = Peripherals::take().unwrap();
    let clocks = dp.RCC.constrain()
        .cfgr
        .use_hse(HSE)
        .sysclk(168.mhz())
        .hclk(168.mhz())
        .pclk1(42.mhz())
        .pclk2(84.mhz())
        .require_pll48clk()
        .freeze();

    timer::setup(cp.SYST, clocks);

    let mut pins = Pins::setup(dp.GPIOA, dp.GPIOB, dp.GPIOD);

    let info = match load_board_info(platform::flash_limited_to_1m()) {
        Ok(info) => info,
        Err(e) => {
            error!("invalid board geometry: {:?}", e);
            platform::halt(&mut pins.leds);
        }
    };
    let caps = Capabilities::from_features();
    info!("board {} rev {}, {} bytes of application flash",
          info.board_type, info.board_revision, info.fw_size_bytes);

    let mut usb_serial = usb::UsbTransport::new(serial::Passive);
    let mut transports = TransportSet::new();
    if caps.serial {
        usb::State::setup(USB {
            usb_global: dp.OTG_FS_GLOBAL,
            usb_device: dp.OTG_FS_DEVICE,
            usb_pwrclk: dp.OTG_FS_PWRCLK,
            pin_dm: pins.usb_dm,
            pin_dp: pins.usb_dp,
        }, info.board_type as u16);
        transports.register(&mut usb_serial);
    }
    if caps.can || caps.network || caps.sdcard {
        warn!("only the serial transport is available on this board");
    }

    let check = VectorCheck::new(info, platform::SRAM);
    let board = Stm32Board::new(pins.leds, pins.strap, caps, info, check);
    BootSession::new(board, timer::SysTickClock, transports, info, caps, BootConfig::default())
        .run()
}
