/*++

Licensed under the Apache-2.0 license.

File Name:

    spi_host.rs

Abstract:

    File contains SPI host emulation

--*/

use crate::spi_flash::{SpiFlash, SpiFlashErr, SpiFlashInput};
use romtime::SpiBus;

/// SPI controller with the boot flash on chip-select 0.
///
/// Each byte transfer is full duplex: while the device drives data the
/// transmitted byte is a don't-care, otherwise the device consumes it and
/// the data line floats high. Without a device the line is pulled low.
pub struct SpiHost {
    flash0: Option<SpiFlash>,
    cs_low: bool,
    transfers: u64,
    errors: Vec<SpiFlashErr>,
}

impl SpiHost {
    /// Time reported to the device for every completed frame.
    const POLL_TIME: u64 = 1;

    pub fn new(flash0: Option<SpiFlash>) -> Self {
        Self {
            flash0,
            cs_low: false,
            transfers: 0,
            errors: Vec::new(),
        }
    }

    pub fn flash(&self) -> Option<&SpiFlash> {
        self.flash0.as_ref()
    }

    pub fn is_selected(&self) -> bool {
        self.cs_low
    }

    /// Bytes clocked since creation.
    pub fn transfers(&self) -> u64 {
        self.transfers
    }

    /// Protocol errors reported by the device.
    pub fn errors(&self) -> &[SpiFlashErr] {
        &self.errors
    }

    fn record(&mut self, ret: Result<(), SpiFlashErr>) {
        if let Err(err) = ret {
            log::error!("Spi flash reports error: {:?}", err);
            self.errors.push(err);
        }
    }
}

impl SpiBus for SpiHost {
    fn select(&mut self) {
        if self.cs_low {
            log::warn!("chip select asserted twice");
            return;
        }
        self.cs_low = true;
        if let Some(flash) = self.flash0.clone() {
            self.record(flash.input(&SpiFlashInput::CsLow));
        }
    }

    fn deselect(&mut self) {
        if !self.cs_low {
            log::warn!("chip select released while not asserted");
            return;
        }
        self.cs_low = false;
        if let Some(flash) = self.flash0.clone() {
            self.record(flash.input(&SpiFlashInput::CsHigh));
            // Let the SPI flash know that some time has passed
            self.record(flash.time_pass(Self::POLL_TIME));
        }
    }

    fn transfer(&mut self, byte: u8) -> u8 {
        self.transfers += 1;
        if !self.cs_low {
            log::warn!("SPI transfer of 0x{:02x} without chip select", byte);
            return 0xff;
        }
        let Some(flash) = self.flash0.clone() else {
            return 0x00;
        };
        if flash.output_pending() {
            match flash.req_output(1) {
                Ok(out) => out.first().copied().unwrap_or(0xff),
                Err(err) => {
                    self.record(Err(err));
                    0xff
                }
            }
        } else {
            self.record(flash.input(&SpiFlashInput::BytesSend(vec![byte])));
            0xff
        }
    }
}
