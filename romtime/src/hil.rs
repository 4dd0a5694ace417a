// Licensed under the Apache-2.0 license

//! Hardware interfaces consumed by the bootloader.
//!
//! All of them are blocking and single-threaded. Implementations must not
//! call back into the bootloader.

/// Byte-level serial line.
pub trait SerialPort {
    /// Enables the receiver. Nothing is received while it is disabled.
    fn enable(&mut self);

    /// Returns the next received byte if one is available. Never blocks.
    fn try_read(&mut self) -> Option<u8>;

    /// Queues `byte` for transmission.
    fn write(&mut self, byte: u8);

    /// True while the transmitter is still shifting out queued data.
    fn tx_busy(&self) -> bool;

    /// True once the far end has hung up and every byte it sent was read.
    /// Nothing more can arrive, so receivers stop waiting.
    fn rx_closed(&self) -> bool {
        false
    }
}

/// Synchronous byte transactor of the SPI controller the boot flash hangs
/// off. Chip-select is driven explicitly by the caller.
pub trait SpiBus {
    /// Asserts the flash chip-select.
    fn select(&mut self);

    /// Releases the flash chip-select.
    fn deselect(&mut self);

    /// Clocks `byte` out and returns the byte clocked in at the same time.
    fn transfer(&mut self, byte: u8) -> u8;
}

/// Instruction memory the application executes from. Addressed in 16-bit
/// words; word 0 is the entry point.
pub trait ExecMemory {
    fn read_word(&self, index: usize) -> u16;

    /// Writes are silently dropped once [`ExecMemory::lock`] was called or if
    /// the memory is true ROM.
    fn write_word(&mut self, index: usize, value: u16);

    /// Permanently disables writes until the next reset.
    fn lock(&mut self);
}

/// Periodic tick used for the autoboot countdown.
pub trait TickTimer {
    /// Arms the tick with `ticks_per_second` auto-reloading period and resets
    /// the tick count.
    fn start(&mut self, ticks_per_second: u32);

    fn stop(&mut self);

    /// Ticks elapsed since the last [`TickTimer::start`].
    fn ticks(&self) -> u32;
}

/// Processor and board level controls.
pub trait SystemControl {
    fn disable_watchdog(&mut self);

    /// Puts every peripheral the bootloader does not own into its reset
    /// state.
    fn reset_peripherals(&mut self);

    fn enable_interrupts(&mut self);

    fn disable_interrupts(&mut self);

    /// Drives the "system halted" status indicator.
    fn set_status_led(&mut self, on: bool);
}

/// Read-only hardware capability registers.
pub trait SystemInfo {
    fn hw_version(&self) -> u16;

    fn clock_hz(&self) -> u32;

    /// Execution memory size in bytes.
    fn imem_size(&self) -> usize;

    /// Data memory size in bytes.
    fn dmem_size(&self) -> usize;

    /// False if execution memory is implemented as true ROM.
    fn imem_writable(&self) -> bool;

    /// True if a flash resident bootloader is present.
    fn has_bootloader(&self) -> bool;
}
