/*++

Licensed under the Apache-2.0 license.

File Name:

    spi_flash.rs

Abstract:

    File contains SPI NOR flash emulation

--*/

use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::collections::VecDeque;
use std::fs;
use std::io;
use std::path::Path;
use std::{cell::RefCell, rc::Rc};

#[derive(Debug)]
pub enum SpiFlashInput {
    CsLow,
    CsHigh,
    BytesSend(Vec<u8>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpiFlashErr {
    CsChangeUnsupported,
    InvalidOpcode,
    InvalidAddress,
    InvalidLength,
    SpiFlashBusy,
    PoweredDown,
    WriteDisabled,
    CrossPageProgram,
    EraseAddressUnaligned,
    BytesReqNothingToSend,
    BytesReqZeroBytes,
    CommandNotSuccessful,
    InvalidTimePassWhileNotIdle,
}

struct FlashPartInfo {
    part_name: &'static str,
    id: &'static [u8],
    chip_size: u32,
    max_page_program_size: u32,
    sector_size: u32,
}

#[derive(Default)]
struct FlashState {
    data: Vec<u8>,
    page_buffer: Vec<u8>,
    id_buffer: VecDeque<u8>,
    idle: bool,
    busy: Option<u64>, // Time that the flash needs to be idle after erase/write
    write_enable: bool,
    powered_down: bool,
    // Set when a frame was rejected; the rest of the frame is ignored.
    failed: bool,
    cmd: SpiFlashCmd,
    bytes_to_receive: u32,
    page_program_get_data: bool,
    address: u32,
}

#[derive(Debug, Default, Clone, Copy, IntoPrimitive, TryFromPrimitive, PartialEq, Eq)]
#[repr(u8)]
enum SpiFlashCmd {
    #[default]
    Noop = 0x00,
    PageProgram = 0x02,
    Read = 0x03,
    WriteDisable = 0x04,
    Rdsr = 0x05,
    WriteEnable = 0x06,
    Rdid = 0x9e,
    Rdid9f = 0x9f,
    ReleasePowerDown = 0xab,
    PowerDown = 0xb9,
    SectorErase = 0xd8,
}

const STATUS_BUSY: u8 = 1 << 0;
const STATUS_WEL: u8 = 1 << 1;

pub struct SpiFlashImpl {
    info: &'static FlashPartInfo,
    state: FlashState,
    stuck_busy: bool,
}

impl SpiFlashImpl {
    const SUPPORTED_FLASH: &'static [FlashPartInfo] = &[
        FlashPartInfo {
            part_name: "n25q128",
            id: &[0x20, 0xba, 0x18],
            chip_size: 16 * 1024 * 1024,
            max_page_program_size: 256,
            sector_size: 64 * 1024,
        },
        FlashPartInfo {
            part_name: "m25p80",
            id: &[0x20, 0x20, 0x14],
            chip_size: 1024 * 1024,
            max_page_program_size: 256,
            sector_size: 64 * 1024,
        },
    ];

    pub const DEFAULT_PART: &'static str = "n25q128";

    // Units are host transactions, see `time_pass`.
    const PAGE_PROGRAM_TIME: u64 = 2;
    const SECTOR_ERASE_TIME: u64 = 150;

    pub fn new(name: &str) -> Option<Self> {
        let info = Self::SUPPORTED_FLASH.iter().find(|f| f.part_name == name)?;

        Some(Self {
            info,
            state: FlashState {
                data: vec![0xff; info.chip_size as usize],
                idle: true,
                ..Default::default()
            },
            stuck_busy: false,
        })
    }

    pub fn part_name(&self) -> &'static str {
        self.info.part_name
    }

    pub fn chip_size(&self) -> u32 {
        self.info.chip_size
    }

    pub fn status(&self) -> u8 {
        let mut status = 0;
        if self.state.busy.is_some() {
            status |= STATUS_BUSY;
        }
        if self.state.write_enable {
            status |= STATUS_WEL;
        }
        status
    }

    // Process the first byte which is always the command
    fn process_cmd(&mut self, byte: u8) -> Result<(), SpiFlashErr> {
        let cmd = SpiFlashCmd::try_from(byte).map_err(|_| SpiFlashErr::InvalidOpcode)?;

        // Only the release command wakes the device up
        if self.state.powered_down && cmd != SpiFlashCmd::ReleasePowerDown {
            return Err(SpiFlashErr::PoweredDown);
        }

        if self.state.busy.is_some() && cmd != SpiFlashCmd::Rdsr {
            return Err(SpiFlashErr::SpiFlashBusy);
        }

        match cmd {
            SpiFlashCmd::Rdsr
            | SpiFlashCmd::WriteEnable
            | SpiFlashCmd::WriteDisable
            | SpiFlashCmd::PowerDown
            | SpiFlashCmd::ReleasePowerDown => {
                self.state.bytes_to_receive = 0;
            }
            SpiFlashCmd::Rdid | SpiFlashCmd::Rdid9f => {
                self.state.bytes_to_receive = 0;
                self.state.id_buffer = self.info.id.iter().copied().collect();
            }
            SpiFlashCmd::Read => {
                self.state.bytes_to_receive = 3;
            }
            SpiFlashCmd::PageProgram => {
                if !self.state.write_enable {
                    return Err(SpiFlashErr::WriteDisabled);
                }
                self.state.bytes_to_receive = 3;
                self.state.page_program_get_data = false;
            }
            SpiFlashCmd::SectorErase => {
                if !self.state.write_enable {
                    return Err(SpiFlashErr::WriteDisabled);
                }
                self.state.bytes_to_receive = 3;
            }
            SpiFlashCmd::Noop => return Err(SpiFlashErr::InvalidOpcode),
        };
        self.state.cmd = cmd;
        Ok(())
    }

    // Shift one address byte in, most significant first
    fn process_address(&mut self, byte: u8) -> Result<(), SpiFlashErr> {
        if self.state.bytes_to_receive == 0 || self.state.bytes_to_receive > 3 {
            return Err(SpiFlashErr::InvalidAddress);
        }
        self.state.address |= (byte as u32) << (8 * (self.state.bytes_to_receive - 1));
        self.state.bytes_to_receive -= 1;
        if self.state.bytes_to_receive == 0 && self.state.address >= self.info.chip_size {
            return Err(SpiFlashErr::InvalidAddress);
        }
        Ok(())
    }

    // Process page programming input. First 3 bytes are the address.
    // The next bytes are the bytes to program. Up to the flash page size
    // can be send in one go, with the limitation that bytes cannot cross pages.
    fn process_page_program_input(&mut self, byte: u8) -> Result<(), SpiFlashErr> {
        if !self.state.page_program_get_data {
            self.process_address(byte)?;

            if self.state.bytes_to_receive == 0 {
                self.state.page_program_get_data = true;
            }
            return Ok(());
        }

        let bytes_gathered = self.state.page_buffer.len() as u32;
        let mask = !(self.info.max_page_program_size - 1);
        let page_begin = self.state.address & mask;
        let new_addr = self.state.address + bytes_gathered;
        if page_begin != (new_addr & mask) {
            self.state.page_buffer.clear();
            return Err(SpiFlashErr::CrossPageProgram);
        }
        self.state.page_buffer.push(byte);
        Ok(())
    }

    // After CS is pulled high page program can begin. Programming can only
    // clear bits.
    fn perform_page_program(&mut self) {
        let address = self.state.address as usize;

        for (index, byte) in self.state.page_buffer.iter().enumerate() {
            self.state.data[address + index] &= *byte;
        }
        self.state.busy = Some(Self::PAGE_PROGRAM_TIME);
        self.state.page_buffer.clear();
    }

    // After CS is pulled high erase can begin
    fn perform_erase(&mut self) -> Result<(), SpiFlashErr> {
        let address = self.state.address;
        let size = self.info.sector_size;

        if address & (size - 1) != 0 {
            return Err(SpiFlashErr::EraseAddressUnaligned);
        }
        let begin = address as usize;
        self.state.data[begin..begin + size as usize].fill(0xff);

        self.state.busy = Some(Self::SECTOR_ERASE_TIME);

        Ok(())
    }

    fn process_input_bytes(&mut self, bytes: &[u8]) -> Result<(), SpiFlashErr> {
        for &byte in bytes {
            if self.state.failed {
                continue;
            }
            let ret = match self.state.cmd {
                SpiFlashCmd::Noop => self.process_cmd(byte),
                SpiFlashCmd::Read | SpiFlashCmd::SectorErase => {
                    if self.state.bytes_to_receive == 0 {
                        Err(SpiFlashErr::InvalidLength)
                    } else {
                        self.process_address(byte)
                    }
                }
                SpiFlashCmd::PageProgram => self.process_page_program_input(byte),
                _ => Err(SpiFlashErr::InvalidLength),
            };
            if let Err(err) = ret {
                self.state.failed = true;
                return Err(err);
            }
        }
        Ok(())
    }

    /// True once a read type command has received everything it needs and
    /// the device drives the data line.
    pub fn output_pending(&self) -> bool {
        if self.state.idle || self.state.failed || self.state.bytes_to_receive != 0 {
            return false;
        }
        match self.state.cmd {
            SpiFlashCmd::Read | SpiFlashCmd::Rdsr => true,
            SpiFlashCmd::Rdid | SpiFlashCmd::Rdid9f => !self.state.id_buffer.is_empty(),
            _ => false,
        }
    }

    /// Process input
    ///
    /// # arguments
    ///
    /// * `input` - SpiFlashInput
    ///
    /// #
    ///
    /// * Err: SpiFlashErr
    /// * Ok(()):
    pub fn input(&mut self, input: &SpiFlashInput) -> Result<(), SpiFlashErr> {
        match input {
            SpiFlashInput::CsLow => {
                if !self.state.idle {
                    return Err(SpiFlashErr::CsChangeUnsupported);
                }
                self.state.idle = false;
                self.state.failed = false;
                self.state.bytes_to_receive = 1;
                Ok(())
            }
            SpiFlashInput::CsHigh => {
                if self.state.idle {
                    return Err(SpiFlashErr::CsChangeUnsupported);
                }

                let state_cleanup = |f: &mut SpiFlashImpl| {
                    f.state.idle = true;
                    f.state.address = 0;
                    f.state.bytes_to_receive = 0;
                    f.state.page_program_get_data = false;
                    f.state.page_buffer.clear();
                    f.state.id_buffer.clear();
                    f.state.cmd = SpiFlashCmd::Noop;
                };

                if self.state.failed {
                    state_cleanup(self);
                    return Err(SpiFlashErr::CommandNotSuccessful);
                }

                let ret = match self.state.cmd {
                    SpiFlashCmd::PageProgram if self.state.page_program_get_data => {
                        self.perform_page_program();
                        self.state.write_enable = false;
                        Ok(())
                    }
                    SpiFlashCmd::SectorErase if self.state.bytes_to_receive == 0 => {
                        let ret = self.perform_erase();
                        self.state.write_enable = false;
                        ret
                    }
                    SpiFlashCmd::WriteEnable => {
                        self.state.write_enable = true;
                        Ok(())
                    }
                    SpiFlashCmd::WriteDisable => {
                        self.state.write_enable = false;
                        Ok(())
                    }
                    SpiFlashCmd::PowerDown => {
                        self.state.powered_down = true;
                        Ok(())
                    }
                    SpiFlashCmd::ReleasePowerDown => {
                        self.state.powered_down = false;
                        Ok(())
                    }
                    SpiFlashCmd::Rdsr
                    | SpiFlashCmd::Rdid
                    | SpiFlashCmd::Rdid9f
                    | SpiFlashCmd::Read
                        if self.state.bytes_to_receive == 0 =>
                    {
                        Ok(())
                    }
                    _ => Err(SpiFlashErr::CommandNotSuccessful),
                };
                state_cleanup(self);
                ret
            }
            SpiFlashInput::BytesSend(bytes) => self.process_input_bytes(bytes),
        }
    }

    /// Process time passing
    ///
    /// # arguments
    ///
    /// * `time` - u64
    ///
    /// * Err: SpiFlashErr
    /// * Ok(()):
    pub fn time_pass(&mut self, time: u64) -> Result<(), SpiFlashErr> {
        if !self.state.idle {
            return Err(SpiFlashErr::InvalidTimePassWhileNotIdle);
        }
        if self.stuck_busy {
            return Ok(());
        }
        if let Some(time_to_wait) = self.state.busy {
            self.state.busy = time_to_wait.checked_sub(time).filter(|t| *t > 0);
        }
        Ok(())
    }

    /// Clocks `n_bytes` out of the device.
    pub fn req_output(&mut self, n_bytes: u32) -> Result<Vec<u8>, SpiFlashErr> {
        if n_bytes == 0 {
            return Err(SpiFlashErr::BytesReqZeroBytes);
        }
        if !self.output_pending() {
            return Err(SpiFlashErr::BytesReqNothingToSend);
        }
        match self.state.cmd {
            // Reads continue into the next address and wrap at the end of the
            // device.
            SpiFlashCmd::Read => {
                let mut out = Vec::with_capacity(n_bytes as usize);
                for _ in 0..n_bytes {
                    out.push(self.state.data[self.state.address as usize]);
                    self.state.address = (self.state.address + 1) % self.info.chip_size;
                }
                Ok(out)
            }
            SpiFlashCmd::Rdsr => Ok(vec![self.status(); n_bytes as usize]),
            _ => (0..n_bytes)
                .map(|_| {
                    self.state
                        .id_buffer
                        .pop_front()
                        .ok_or(SpiFlashErr::BytesReqNothingToSend)
                })
                .collect(),
        }
    }
}

impl Default for SpiFlashImpl {
    fn default() -> Self {
        let info = &Self::SUPPORTED_FLASH[0];
        Self {
            info,
            state: FlashState {
                data: vec![0xff; info.chip_size as usize],
                idle: true,
                ..Default::default()
            },
            stuck_busy: false,
        }
    }
}

/// Shared handle to an emulated flash device.
#[derive(Clone)]
pub struct SpiFlash {
    flash: Rc<RefCell<SpiFlashImpl>>,
}

impl SpiFlash {
    pub fn new(name: &str) -> Option<Self> {
        let flash = SpiFlashImpl::new(name)?;
        Some(Self {
            flash: Rc::new(RefCell::new(flash)),
        })
    }

    pub fn input(&self, input: &SpiFlashInput) -> Result<(), SpiFlashErr> {
        self.flash.borrow_mut().input(input)
    }

    pub fn req_output(&self, n_bytes: u32) -> Result<Vec<u8>, SpiFlashErr> {
        self.flash.borrow_mut().req_output(n_bytes)
    }

    pub fn output_pending(&self) -> bool {
        self.flash.borrow().output_pending()
    }

    pub fn time_pass(&self, time: u64) -> Result<(), SpiFlashErr> {
        self.flash.borrow_mut().time_pass(time)
    }

    pub fn part_name(&self) -> &'static str {
        self.flash.borrow().part_name()
    }

    pub fn chip_size(&self) -> u32 {
        self.flash.borrow().chip_size()
    }

    pub fn is_busy(&self) -> bool {
        self.flash.borrow().state.busy.is_some()
    }

    pub fn is_powered_down(&self) -> bool {
        self.flash.borrow().state.powered_down
    }

    /// Keeps the busy bit set forever once the next program or erase starts.
    pub fn set_stuck_busy(&self, stuck: bool) {
        self.flash.borrow_mut().stuck_busy = stuck;
    }

    /// Raw view of the array, bypassing the SPI protocol.
    pub fn contents(&self, address: u32, len: usize) -> Vec<u8> {
        let flash = self.flash.borrow();
        let begin = address as usize;
        flash.state.data[begin..begin + len].to_vec()
    }

    /// Overwrites the array directly, as a programmer would before assembly.
    pub fn preload(&self, address: u32, bytes: &[u8]) {
        let mut flash = self.flash.borrow_mut();
        let begin = address as usize;
        flash.state.data[begin..begin + bytes.len()].copy_from_slice(bytes);
    }

    /// Loads the array from `path`. A shorter file leaves the rest erased.
    pub fn load_file(&self, path: &Path) -> io::Result<()> {
        let bytes = fs::read(path)?;
        let mut flash = self.flash.borrow_mut();
        if bytes.len() > flash.state.data.len() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "flash image {} is larger than the {} byte device",
                    path.display(),
                    flash.state.data.len()
                ),
            ));
        }
        flash.state.data.fill(0xff);
        flash.state.data[..bytes.len()].copy_from_slice(&bytes);
        Ok(())
    }

    pub fn save_file(&self, path: &Path) -> io::Result<()> {
        fs::write(path, &self.flash.borrow().state.data)
    }
}

impl Default for SpiFlash {
    fn default() -> Self {
        Self {
            flash: Rc::new(RefCell::new(SpiFlashImpl::default())),
        }
    }
}
