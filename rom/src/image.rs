/*++

Licensed under the Apache-2.0 license.

File Name:

    image.rs

Abstract:

    Moves boot images between execution memory and the serial line or the
    boot flash.

--*/

use crate::flash::{SpiFlash, SECTOR_SIZE};
use crate::{BootError, BootParameters, RomEnv};
use boot_image::{
    word_from_wire, word_to_wire, Checksum, BOOT_SIGNATURE, CHECKSUM_OFFSET, HEADER_SIZE,
    PAYLOAD_OFFSET, SIGNATURE_OFFSET, SIZE_OFFSET,
};
use romtime::{ExecMemory, SerialPort};

/// Where [`get_image`] reads an image from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSource {
    /// Streamed over the console serial line.
    Serial,
    /// Stored in the boot flash at `base`.
    Flash { base: u32 },
}

/// Summary of a completed transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageInfo {
    /// Payload length in bytes.
    pub size: u16,
    pub checksum: u16,
}

/// Sequential reader of 16-bit words, high byte first.
pub trait WordSource {
    fn next_word(&mut self) -> Result<u16, BootError>;
}

pub struct SerialWords<'a> {
    port: &'a mut dyn SerialPort,
    poll_limit: Option<u32>,
}

impl<'a> SerialWords<'a> {
    pub fn new(port: &'a mut dyn SerialPort, poll_limit: Option<u32>) -> Self {
        Self { port, poll_limit }
    }

    fn next_byte(&mut self) -> Result<u8, BootError> {
        let mut polls = 0u32;
        loop {
            if let Some(byte) = self.port.try_read() {
                return Ok(byte);
            }
            if self.port.rx_closed() {
                log::error!("serial line closed while waiting for data");
                return Err(BootError::SerialTimeout);
            }
            if let Some(limit) = self.poll_limit {
                polls += 1;
                if polls >= limit {
                    log::error!("no serial data after {} polls", polls);
                    return Err(BootError::SerialTimeout);
                }
            }
            core::hint::spin_loop();
        }
    }
}

impl WordSource for SerialWords<'_> {
    fn next_word(&mut self) -> Result<u16, BootError> {
        let high = self.next_byte()?;
        let low = self.next_byte()?;
        Ok(word_from_wire(high, low))
    }
}

pub struct FlashWords<'a> {
    flash: SpiFlash<'a>,
    address: u32,
}

impl<'a> FlashWords<'a> {
    pub fn new(flash: SpiFlash<'a>, base: u32) -> Self {
        Self {
            flash,
            address: base,
        }
    }
}

impl WordSource for FlashWords<'_> {
    fn next_word(&mut self) -> Result<u16, BootError> {
        let high = self.flash.read_byte(self.address);
        let low = self.flash.read_byte(self.address + 1);
        self.address += 2;
        Ok(word_from_wire(high, low))
    }
}

/// State of a single image load. Lives for exactly one transfer.
pub struct TransferSession {
    source: ImageSource,
    checksum: Checksum,
    cursor: usize,
    capacity: usize,
}

impl TransferSession {
    /// `capacity` is the execution memory size in bytes.
    pub fn new(source: ImageSource, capacity: usize) -> Self {
        Self {
            source,
            checksum: Checksum::new(),
            cursor: 0,
            capacity,
        }
    }

    /// Words written to execution memory so far.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Checks the header read from `words` and copies the payload into
    /// `imem`, clearing the remainder of the memory.
    ///
    /// Nothing is written before the signature and size are known to be
    /// good. A checksum failure is only detected after the payload has been
    /// written.
    pub fn load<W: WordSource + ?Sized>(
        &mut self,
        words: &mut W,
        imem: &mut dyn ExecMemory,
    ) -> Result<ImageInfo, BootError> {
        let signature = words.next_word()?;
        if signature != BOOT_SIGNATURE {
            log::error!(
                "bad image signature 0x{:04x} from {:?}",
                signature,
                self.source
            );
            return Err(BootError::InvalidExecutable);
        }
        let size = words.next_word()?;
        let stored = words.next_word()?;
        if usize::from(size) > self.capacity {
            log::error!(
                "image of {} bytes exceeds execution memory of {} bytes",
                size,
                self.capacity
            );
            return Err(BootError::ImageTooLarge);
        }

        let payload_words = usize::from(size / 2);
        while self.cursor < payload_words {
            let word = words.next_word()?;
            imem.write_word(self.cursor, word);
            self.checksum.update(word);
            self.cursor += 1;
        }
        for index in payload_words..self.capacity / 2 {
            imem.write_word(index, 0);
        }

        if !self.checksum.matches(stored) {
            log::error!(
                "image checksum 0x{:04x} does not match payload 0x{:04x}",
                stored,
                self.checksum.value()
            );
            return Err(BootError::ChecksumMismatch);
        }
        Ok(ImageInfo {
            size,
            checksum: self.checksum.value(),
        })
    }
}

/// Loads an image from `source` into execution memory.
pub fn get_image(
    env: &mut RomEnv,
    params: &BootParameters,
    source: ImageSource,
) -> Result<ImageInfo, BootError> {
    if !env.info.imem_writable() {
        log::error!("execution memory is true ROM");
        return Err(BootError::ExecMemoryReadOnly);
    }
    log::info!("loading image from {:?}", source);

    let mut session = TransferSession::new(source, env.imem_capacity());
    let info = match source {
        ImageSource::Serial => {
            let mut words = SerialWords::new(&mut *env.serial, params.serial_rx_poll_limit);
            session.load(&mut words, &mut *env.imem)?
        }
        ImageSource::Flash { base } => {
            let flash = SpiFlash::new(&mut *env.spi, params.flash_busy_poll_limit);
            let mut words = FlashWords::new(flash, base);
            session.load(&mut words, &mut *env.imem)?
        }
    };
    log::info!(
        "loaded {} bytes, checksum 0x{:04x}",
        info.size,
        info.checksum
    );
    Ok(info)
}

fn program_word(flash: &mut SpiFlash, address: u32, word: u16) -> Result<(), BootError> {
    let [high, low] = word_to_wire(word);
    flash.write_byte(address, high)?;
    flash.write_byte(address + 1, low)?;
    Ok(())
}

/// Writes the whole execution memory as an image to the boot flash.
pub fn store_image(env: &mut RomEnv, params: &BootParameters) -> Result<ImageInfo, BootError> {
    let capacity = env.imem_capacity();
    if capacity + HEADER_SIZE > SECTOR_SIZE as usize {
        log::error!(
            "execution memory of {} bytes does not fit a flash sector",
            capacity
        );
        return Err(BootError::ImageTooLarge);
    }
    let size = u16::try_from(capacity).map_err(|_| BootError::ImageTooLarge)?;
    let base = params.flash_base;
    log::info!("storing {} bytes to flash at 0x{:06x}", size, base);

    let mut flash = SpiFlash::new(&mut *env.spi, params.flash_busy_poll_limit);
    flash.erase_sector(base)?;
    if flash.read_first_id() == 0 {
        log::error!("boot flash does not answer READ ID");
        return Err(BootError::EepromAccess);
    }

    program_word(&mut flash, base + SIGNATURE_OFFSET, BOOT_SIGNATURE)?;
    program_word(&mut flash, base + SIZE_OFFSET, size)?;
    // Left erased so the final value can still be programmed.
    program_word(&mut flash, base + CHECKSUM_OFFSET, 0xffff)?;

    let mut checksum = Checksum::new();
    let mut address = base + PAYLOAD_OFFSET;
    for index in 0..capacity / 2 {
        let word = env.imem.read_word(index);
        checksum.update(word);
        program_word(&mut flash, address, word)?;
        address += 2;
    }
    program_word(&mut flash, base + CHECKSUM_OFFSET, checksum.value())?;

    log::info!("stored image, checksum 0x{:04x}", checksum.value());
    Ok(ImageInfo {
        size,
        checksum: checksum.value(),
    })
}
