/*++

Licensed under the Apache-2.0 license.

File Name:

    error.rs

Abstract:

    Error codes reported by the bootloader.

--*/

/// Errors of the bootloader. The discriminant is the code shown in the halt
/// message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[repr(u16)]
pub enum BootError {
    #[error("boot flash not responding")]
    EepromAccess = 0,
    #[error("execution memory is read-only")]
    ExecMemoryReadOnly = 1,
    #[error("invalid executable signature")]
    InvalidExecutable = 2,
    #[error("image too large for execution memory")]
    ImageTooLarge = 3,
    #[error("checksum mismatch")]
    ChecksumMismatch = 4,
    #[error("boot flash busy timeout")]
    FlashTimeout = 5,
    #[error("serial receive timeout")]
    SerialTimeout = 6,
}

impl BootError {
    pub fn code(self) -> u16 {
        self as u16
    }

    /// Errors which leave the system in a state the console cannot recover
    /// from.
    pub fn is_fatal_in_console(self) -> bool {
        matches!(self, BootError::ExecMemoryReadOnly)
    }
}

/// Low level boot flash failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FlashError {
    #[error("flash still busy after opcode 0x{opcode:02x}")]
    Timeout { opcode: u8 },
}

impl From<FlashError> for BootError {
    fn from(err: FlashError) -> Self {
        match err {
            FlashError::Timeout { .. } => BootError::FlashTimeout,
        }
    }
}
