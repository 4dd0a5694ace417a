/*++

Licensed under the Apache-2.0 license.

File Name:

    params.rs

Abstract:

    Build and board specific knobs of the bootloader.

--*/

use crate::flash::SECTOR_SIZE;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ParamError {
    #[error("flash base 0x{0:06x} is not aligned to a flash sector")]
    UnalignedFlashBase(u32),
    #[error("flash base 0x{0:08x} does not fit a 24-bit flash address")]
    FlashBaseOutOfRange(u32),
    #[error("tick rate must not be zero")]
    ZeroTickRate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootParameters {
    /// Flash address of the boot image. Must be sector aligned since storing
    /// erases the whole sector.
    pub flash_base: u32,
    /// Seconds without a key press before autoboot starts.
    pub autoboot_timeout_s: u32,
    pub tick_hz: u32,
    /// Status register reads before a program or erase is declared stuck.
    pub flash_busy_poll_limit: u32,
    /// Polls of the transmitter before boot gives up on draining it.
    pub serial_tx_poll_limit: u32,
    /// Polls of the receiver per byte during an upload. `None` waits forever.
    pub serial_rx_poll_limit: Option<u32>,
    /// Ask for confirmation before overwriting the boot flash.
    pub confirm_store: bool,
}

impl BootParameters {
    pub fn validate(&self) -> Result<(), ParamError> {
        if self.flash_base > 0x00ff_ffff {
            return Err(ParamError::FlashBaseOutOfRange(self.flash_base));
        }
        if self.flash_base % SECTOR_SIZE != 0 {
            return Err(ParamError::UnalignedFlashBase(self.flash_base));
        }
        if self.tick_hz == 0 {
            return Err(ParamError::ZeroTickRate);
        }
        Ok(())
    }

    /// Number of ticks the autoboot countdown lasts.
    pub fn autoboot_ticks(&self) -> u32 {
        self.autoboot_timeout_s.saturating_mul(self.tick_hz)
    }
}

impl Default for BootParameters {
    fn default() -> Self {
        Self {
            flash_base: 0x0008_0000,
            autoboot_timeout_s: 4,
            tick_hz: 4,
            flash_busy_poll_limit: 1_000_000,
            serial_tx_poll_limit: 1_000_000,
            serial_rx_poll_limit: None,
            confirm_store: true,
        }
    }
}
