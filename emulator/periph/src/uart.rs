/*++

Licensed under the Apache-2.0 license.

File Name:

    uart.rs

Abstract:

    File contains UART device implementation.

--*/

use romtime::SerialPort;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::io::Write;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Receive queue shared with whatever feeds the UART, usually a console
/// thread.
pub type UartInput = Arc<Mutex<VecDeque<u8>>>;

/// Set by the feeder once it will not queue anything more.
pub type UartHangup = Arc<AtomicBool>;

pub struct Uart {
    output: Option<Rc<RefCell<Vec<u8>>>>,
    input: UartInput,
    hangup: UartHangup,
    rx_enabled: bool,
    // Bytes still in the transmit shift register.
    tx_pending: Cell<u32>,
    bytes_read: u64,
}

impl Uart {
    /// Polls of `tx_busy` it takes to shift one byte out.
    const TX_POLLS_PER_BYTE: u32 = 1;

    /// With `output` set transmitted bytes are captured, otherwise they go to
    /// stdout.
    pub fn new(
        output: Option<Rc<RefCell<Vec<u8>>>>,
        input: UartInput,
        hangup: UartHangup,
    ) -> Self {
        Self {
            output,
            input,
            hangup,
            rx_enabled: false,
            tx_pending: Cell::new(0),
            bytes_read: 0,
        }
    }

    pub fn input(&self) -> UartInput {
        self.input.clone()
    }

    /// Queues bytes as if they had been received on the line.
    pub fn push_input(&self, bytes: &[u8]) {
        if let Ok(mut input) = self.input.lock() {
            input.extend(bytes);
        }
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }
}

impl SerialPort for Uart {
    fn enable(&mut self) {
        self.rx_enabled = true;
    }

    fn try_read(&mut self) -> Option<u8> {
        if !self.rx_enabled {
            return None;
        }
        let byte = self.input.lock().ok()?.pop_front();
        match byte {
            Some(_) => self.bytes_read += 1,
            None => std::thread::yield_now(),
        }
        byte
    }

    fn write(&mut self, byte: u8) {
        match &self.output {
            Some(output) => output.borrow_mut().push(byte),
            None => {
                let mut stdout = std::io::stdout();
                let _ = stdout.write_all(&[byte]);
                let _ = stdout.flush();
            }
        }
        self.tx_pending
            .set(self.tx_pending.get() + Self::TX_POLLS_PER_BYTE);
    }

    fn tx_busy(&self) -> bool {
        let pending = self.tx_pending.get();
        if pending == 0 {
            return false;
        }
        self.tx_pending.set(pending - 1);
        true
    }

    fn rx_closed(&self) -> bool {
        self.hangup.load(Ordering::Relaxed)
            && self.input.lock().map(|input| input.is_empty()).unwrap_or(true)
    }
}
