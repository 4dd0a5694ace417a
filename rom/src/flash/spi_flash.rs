// Licensed under the Apache-2.0 license

//! Driver for the serial NOR flash holding the boot image.
//!
//! Every operation is one or more complete chip-select frames: select,
//! opcode, optional 24-bit address, optional data, deselect. No frame is held
//! open between calls.

use crate::FlashError;
use bitflags::bitflags;
use romtime::SpiBus;

/// Size of the block erased by [`Opcode::SectorErase`].
pub const SECTOR_SIZE: u32 = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    PageProgram = 0x02,
    Read = 0x03,
    ReadStatus = 0x05,
    WriteEnable = 0x06,
    ReadId = 0x9e,
    ReleasePowerDown = 0xab,
    PowerDown = 0xb9,
    SectorErase = 0xd8,
}

impl From<Opcode> for u8 {
    fn from(op: Opcode) -> u8 {
        op as u8
    }
}

bitflags! {
    /// Status register 1.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FlashStatus: u8 {
        /// Program or erase in progress.
        const BUSY = 1 << 0;
        /// Write enable latch.
        const WEL = 1 << 1;
    }
}

/// Splits a 24-bit flash address into the three address bytes in the order
/// they are clocked out.
///
/// The two lower bytes come from the byte-swapped low half-word, so the
/// result is identical on either host byte order.
pub fn address_bytes(address: u32) -> [u8; 3] {
    let low = address as u16;
    [
        (address >> 16) as u8,
        low.swap_bytes() as u8,
        low as u8,
    ]
}

pub struct SpiFlash<'a> {
    spi: &'a mut dyn SpiBus,
    busy_poll_limit: u32,
}

impl<'a> SpiFlash<'a> {
    pub fn new(spi: &'a mut dyn SpiBus, busy_poll_limit: u32) -> Self {
        Self {
            spi,
            busy_poll_limit,
        }
    }

    fn begin(&mut self, opcode: Opcode) {
        self.spi.select();
        self.spi.transfer(opcode.into());
    }

    fn begin_at(&mut self, opcode: Opcode, address: u32) {
        self.begin(opcode);
        for b in address_bytes(address) {
            self.spi.transfer(b);
        }
    }

    fn end(&mut self) {
        self.spi.deselect();
    }

    pub fn read_byte(&mut self, address: u32) -> u8 {
        self.begin_at(Opcode::Read, address);
        let data = self.spi.transfer(0);
        self.end();
        data
    }

    /// Programs a single byte and waits for the device to finish.
    pub fn write_byte(&mut self, address: u32, data: u8) -> Result<(), FlashError> {
        self.write_command(Opcode::WriteEnable);
        self.begin_at(Opcode::PageProgram, address);
        self.spi.transfer(data);
        self.end();
        self.wait_ready(Opcode::PageProgram)
    }

    /// Erases the sector starting at `base`, which must be sector aligned.
    pub fn erase_sector(&mut self, base: u32) -> Result<(), FlashError> {
        self.write_command(Opcode::WriteEnable);
        self.begin_at(Opcode::SectorErase, base);
        self.end();
        self.wait_ready(Opcode::SectorErase)
    }

    pub fn read_status(&mut self) -> FlashStatus {
        self.begin(Opcode::ReadStatus);
        let status = self.spi.transfer(0);
        self.end();
        FlashStatus::from_bits_retain(status)
    }

    /// First byte of the identification sequence (manufacturer ID). An absent
    /// device reads as zero.
    pub fn read_first_id(&mut self) -> u8 {
        self.begin(Opcode::ReadId);
        let id = self.spi.transfer(0);
        self.end();
        id
    }

    /// Sends a command without address or data phase.
    pub fn write_command(&mut self, opcode: Opcode) {
        self.begin(opcode);
        self.end();
    }

    pub fn power_down(&mut self) {
        self.write_command(Opcode::PowerDown);
    }

    pub fn release_power_down(&mut self) {
        self.write_command(Opcode::ReleasePowerDown);
    }

    fn wait_ready(&mut self, opcode: Opcode) -> Result<(), FlashError> {
        let mut polls = 0;
        loop {
            if !self.read_status().contains(FlashStatus::BUSY) {
                return Ok(());
            }
            polls += 1;
            if polls >= self.busy_poll_limit {
                log::error!(
                    "boot flash still busy after {} polls (opcode 0x{:02x})",
                    polls,
                    opcode as u8
                );
                return Err(FlashError::Timeout {
                    opcode: opcode.into(),
                });
            }
        }
    }
}
