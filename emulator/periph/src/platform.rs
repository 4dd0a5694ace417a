/*++

Licensed under the Apache-2.0 license.

File Name:

    platform.rs

Abstract:

    File contains the emulated MCU16 board: every peripheral the bootloader
    drives, wired together.

--*/

use crate::{
    EmuTimer, ExecMem, HwInfo, SpiFlash, SpiHost, SysCtrl, TimerClock, Uart, UartHangup, UartInput,
};
use mcu_bootloader::{BootOutcome, BootParameters, Bootloader, RomEnv};
use romtime::Ticker;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Emulated board arguments
pub struct EmuPlatformArgs {
    pub hw: HwInfo,
    /// `None` leaves the flash socket empty.
    pub flash: Option<SpiFlash>,
    pub clock: TimerClock,
    /// Captures UART output instead of writing it to stdout.
    pub uart_output: Option<Rc<RefCell<Vec<u8>>>>,
    pub uart_input: UartInput,
    /// Marks the end of `uart_input`.
    pub uart_hangup: UartHangup,
}

impl Default for EmuPlatformArgs {
    fn default() -> Self {
        Self {
            hw: HwInfo::default(),
            flash: Some(SpiFlash::default()),
            clock: TimerClock::default(),
            uart_output: None,
            uart_input: UartInput::default(),
            uart_hangup: UartHangup::default(),
        }
    }
}

pub struct EmuPlatform {
    pub uart: Uart,
    pub spi: SpiHost,
    pub imem: ExecMem,
    pub timer: EmuTimer,
    pub sys: SysCtrl,
    pub info: HwInfo,
}

impl EmuPlatform {
    pub fn new(args: EmuPlatformArgs) -> Self {
        let ticker = Arc::new(Ticker::new());
        let irq_enabled = Arc::new(AtomicBool::new(false));
        Self {
            uart: Uart::new(args.uart_output, args.uart_input, args.uart_hangup),
            spi: SpiHost::new(args.flash),
            imem: ExecMem::new(args.hw.imem_size, args.hw.imem_writable),
            timer: EmuTimer::new(args.clock, ticker.clone(), irq_enabled.clone()),
            sys: SysCtrl::new(irq_enabled, ticker),
            info: args.hw,
        }
    }

    pub fn flash(&self) -> Option<&SpiFlash> {
        self.spi.flash()
    }

    /// Borrows the peripherals as the bootloader sees them.
    pub fn env(&mut self) -> RomEnv<'_> {
        RomEnv {
            serial: &mut self.uart,
            spi: &mut self.spi,
            imem: &mut self.imem,
            timer: &mut self.timer,
            sys: &mut self.sys,
            info: &self.info,
        }
    }

    /// Runs the bootloader from reset until it boots or halts.
    pub fn run(&mut self, params: BootParameters) -> BootOutcome {
        Bootloader::new(self.env(), params).run()
    }
}
