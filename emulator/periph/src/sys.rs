/*++

Licensed under the Apache-2.0 license.

File Name:

    sys.rs

Abstract:

    File contains the processor control and capability registers.

--*/

use romtime::{SystemControl, SystemInfo, Ticker};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub struct SysCtrl {
    watchdog_enabled: bool,
    irq_enabled: Arc<AtomicBool>,
    status_led: bool,
    peripheral_resets: u32,
    ticker: Arc<Ticker>,
}

impl SysCtrl {
    pub fn new(irq_enabled: Arc<AtomicBool>, ticker: Arc<Ticker>) -> Self {
        Self {
            watchdog_enabled: true,
            irq_enabled,
            status_led: false,
            peripheral_resets: 0,
            ticker,
        }
    }

    pub fn watchdog_enabled(&self) -> bool {
        self.watchdog_enabled
    }

    pub fn interrupts_enabled(&self) -> bool {
        self.irq_enabled.load(Ordering::Relaxed)
    }

    pub fn status_led(&self) -> bool {
        self.status_led
    }

    /// LED toggled by the tick interrupt.
    pub fn heartbeat_led(&self) -> bool {
        self.ticker.heartbeat()
    }

    pub fn peripheral_resets(&self) -> u32 {
        self.peripheral_resets
    }
}

impl SystemControl for SysCtrl {
    fn disable_watchdog(&mut self) {
        self.watchdog_enabled = false;
    }

    fn reset_peripherals(&mut self) {
        self.peripheral_resets += 1;
    }

    fn enable_interrupts(&mut self) {
        self.irq_enabled.store(true, Ordering::Relaxed);
    }

    fn disable_interrupts(&mut self) {
        self.irq_enabled.store(false, Ordering::Relaxed);
    }

    fn set_status_led(&mut self, on: bool) {
        self.status_led = on;
    }
}

/// Synthesis time configuration visible to software.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HwInfo {
    pub hw_version: u16,
    pub clock_hz: u32,
    pub imem_size: usize,
    pub dmem_size: usize,
    pub imem_writable: bool,
    pub has_bootloader: bool,
}

impl Default for HwInfo {
    fn default() -> Self {
        Self {
            hw_version: 0x0100,
            clock_hz: 50_000_000,
            imem_size: 16 * 1024,
            dmem_size: 8 * 1024,
            imem_writable: true,
            has_bootloader: true,
        }
    }
}

impl SystemInfo for HwInfo {
    fn hw_version(&self) -> u16 {
        self.hw_version
    }

    fn clock_hz(&self) -> u32 {
        self.clock_hz
    }

    fn imem_size(&self) -> usize {
        self.imem_size
    }

    fn dmem_size(&self) -> usize {
        self.dmem_size
    }

    fn imem_writable(&self) -> bool {
        self.imem_writable
    }

    fn has_bootloader(&self) -> bool {
        self.has_bootloader
    }
}
