// Licensed under the Apache-2.0 license

use crate::SerialPort;
use core::fmt::Write;

/// `core::fmt::Write` adapter over a [`SerialPort`].
pub struct SerialWriter<'a>(pub &'a mut dyn SerialPort);

impl SerialWriter<'_> {
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.0.write(b);
        }
    }
}

impl Write for SerialWriter<'_> {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        self.write_bytes(s.as_bytes());
        Ok(())
    }
}
