// Licensed under the Apache-2.0 license

//! Operator facing text of the bootloader console.

use crate::{RomEnv, BOOTLOADER_VERSION};
use romtime::HexWord;

pub const PROMPT: &str = "\r\nCMD:> ";

pub const HELP: &str = "Available commands:\r\n \
                        h: Help\r\n \
                        r: Restart\r\n \
                        u: Upload via serial\r\n \
                        p: Program boot flash\r\n \
                        e: Execute\r\n";

pub const CONFIRM_STORE: &str = "Proceed to program boot flash? (y/n) ";

/// Single character console commands. Matching is case-sensitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Restart,
    Help,
    Upload,
    Program,
    Execute,
    Unknown(u8),
}

impl From<u8> for Command {
    fn from(byte: u8) -> Self {
        match byte {
            b'r' => Command::Restart,
            b'h' => Command::Help,
            b'u' => Command::Upload,
            b'p' => Command::Program,
            b'e' => Command::Execute,
            other => Command::Unknown(other),
        }
    }
}

/// Prints the version and the hardware capabilities.
pub fn print_banner(env: &mut RomEnv) {
    let hw_version = env.info.hw_version();
    let clock_hz = env.info.clock_hz();
    let imem_size = env.info.imem_size();
    let dmem_size = env.info.dmem_size();
    let rom = !env.info.imem_writable();
    let boot = env.info.has_bootloader();

    env.print_fmt(format_args!(
        "\r\n\r\nMCU16 Bootloader v{}\r\n\r\n",
        BOOTLOADER_VERSION
    ));
    env.print_fmt(format_args!("HWV:  0x{}\r\n", HexWord(hw_version)));
    env.print_fmt(format_args!("CLK:  {} Hz\r\n", clock_hz));
    env.print_fmt(format_args!(
        "IMEM: {} bytes{}\r\n",
        imem_size,
        if rom { " (true ROM)" } else { "" }
    ));
    env.print_fmt(format_args!("DMEM: {} bytes\r\n", dmem_size));
    env.print_fmt(format_args!(
        "BOOT: {}\r\n\r\n",
        if boot { "flash resident" } else { "none" }
    ));
}
