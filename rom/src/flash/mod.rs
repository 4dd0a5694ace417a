// Licensed under the Apache-2.0 license

//! Boot flash access.

mod spi_flash;

pub use spi_flash::{address_bytes, FlashStatus, Opcode, SpiFlash, SECTOR_SIZE};
