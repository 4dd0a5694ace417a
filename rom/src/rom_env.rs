/*++

Licensed under the Apache-2.0 license.

File Name:

    rom_env.rs

Abstract:

    Bootloader environment - bundles every peripheral the bootloader drives

--*/

use core::fmt::Write;
use romtime::{ExecMemory, SerialPort, SerialWriter, SpiBus, SystemControl, SystemInfo, TickTimer};

/// Peripherals handed to the bootloader by the platform.
pub struct RomEnv<'a> {
    pub serial: &'a mut dyn SerialPort,
    pub spi: &'a mut dyn SpiBus,
    pub imem: &'a mut dyn ExecMemory,
    pub timer: &'a mut dyn TickTimer,
    pub sys: &'a mut dyn SystemControl,
    pub info: &'a dyn SystemInfo,
}

impl RomEnv<'_> {
    /// Console output writer.
    pub fn console(&mut self) -> SerialWriter<'_> {
        SerialWriter(&mut *self.serial)
    }

    pub fn print(&mut self, s: &str) {
        self.console().write_bytes(s.as_bytes());
    }

    pub fn print_fmt(&mut self, args: core::fmt::Arguments) {
        // Writing to the serial port cannot fail.
        let _ = self.console().write_fmt(args);
    }

    /// Execution memory capacity in bytes.
    pub fn imem_capacity(&self) -> usize {
        self.info.imem_size()
    }
}
