/*++

Licensed under the Apache-2.0 license.

File Name:

    lib.rs

Abstract:

    File contains exports for the MCU16 emulator peripheral library.

--*/

mod imem;
mod platform;
mod spi_flash;
mod spi_host;
mod sys;
mod timer;
mod uart;

pub use imem::ExecMem;
pub use platform::{EmuPlatform, EmuPlatformArgs};
pub use spi_flash::{SpiFlash, SpiFlashErr, SpiFlashImpl, SpiFlashInput};
pub use spi_host::SpiHost;
pub use sys::{HwInfo, SysCtrl};
pub use timer::{EmuTimer, TimerClock};
pub use uart::{Uart, UartHangup, UartInput};
