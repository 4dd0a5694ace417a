// Licensed under the Apache-2.0 license

//! Platform layer shared by the bootloader and every platform that hosts it.
//!
//! The bootloader never touches registers directly. Each platform implements
//! the traits in [`hil`] once and hands the implementations to the
//! bootloader environment.

#![cfg_attr(not(test), no_std)]

pub mod hil;
pub use hil::*;
mod serial;
pub use serial::*;
mod ticker;
pub use ticker::*;

use core::fmt::{Display, Write};

/// Formats a 16-bit value as four upper-case hex digits.
pub struct HexWord(pub u16);
impl Display for HexWord {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        for shift in [12, 8, 4, 0] {
            let c = ((self.0 >> shift) & 0xf) as u8;
            if c < 10 {
                f.write_char((c + b'0') as char)?;
            } else {
                f.write_char((c - 10 + b'A') as char)?;
            }
        }
        Ok(())
    }
}
