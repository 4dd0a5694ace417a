// Licensed under the Apache-2.0 license

//! On-media layout of a bootable executable.
//!
//! The same layout is used for images stored in the boot flash and for images
//! streamed over the serial console:
//!
//! | Offset | Size   | Field     |
//! |--------|--------|-----------|
//! | 0      | 2      | signature |
//! | 2      | 2      | size      |
//! | 4      | 2      | checksum  |
//! | 6      | `size` | payload   |
//!
//! Every field and every payload word is stored high byte first.

#![cfg_attr(not(any(test, feature = "std")), no_std)]

use core::mem::{offset_of, size_of};

use zerocopy::byteorder::{BigEndian, U16};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

#[cfg(any(test, feature = "std"))]
mod builder;
#[cfg(any(test, feature = "std"))]
pub use builder::{BootImage, ImageBuilder, ImageFormatError};

/// Magic value at offset 0 of every valid image.
pub const BOOT_SIGNATURE: u16 = 0xCAFE;

pub const HEADER_SIZE: usize = size_of::<ImageHeader>();
pub const SIGNATURE_OFFSET: u32 = offset_of!(ImageHeader, signature) as u32;
pub const SIZE_OFFSET: u32 = offset_of!(ImageHeader, size) as u32;
pub const CHECKSUM_OFFSET: u32 = offset_of!(ImageHeader, checksum) as u32;
pub const PAYLOAD_OFFSET: u32 = HEADER_SIZE as u32;

#[repr(C)]
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned,
)]
pub struct ImageHeader {
    pub signature: U16<BigEndian>,
    /// Payload length in bytes.
    pub size: U16<BigEndian>,
    /// XOR of all payload words.
    pub checksum: U16<BigEndian>,
}

impl ImageHeader {
    pub fn new(size: u16, checksum: u16) -> Self {
        Self {
            signature: BOOT_SIGNATURE.into(),
            size: size.into(),
            checksum: checksum.into(),
        }
    }

    pub fn has_valid_signature(&self) -> bool {
        self.signature.get() == BOOT_SIGNATURE
    }

    /// Number of payload words described by `size`. A trailing odd byte is
    /// not part of any word and is ignored.
    pub fn word_count(&self) -> usize {
        usize::from(self.size.get() / 2)
    }

    /// Whether the payload fits into an execution memory of `capacity` bytes.
    pub fn fits(&self, capacity: usize) -> bool {
        usize::from(self.size.get()) <= capacity
    }
}

/// Running XOR over 16-bit payload words.
///
/// Must stay bit-compatible with images produced by the existing image
/// generator.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Checksum(u16);

impl Checksum {
    pub const fn new() -> Self {
        Self(0)
    }

    pub fn update(&mut self, word: u16) {
        self.0 ^= word;
    }

    pub fn value(&self) -> u16 {
        self.0
    }

    pub fn matches(&self, stored: u16) -> bool {
        self.0 ^ stored == 0
    }
}

/// Computes the image checksum of `words`.
pub fn checksum<I: IntoIterator<Item = u16>>(words: I) -> u16 {
    words
        .into_iter()
        .fold(Checksum::new(), |mut acc, word| {
            acc.update(word);
            acc
        })
        .value()
}

/// Combines two bytes received in wire order into a word.
pub const fn word_from_wire(high: u8, low: u8) -> u16 {
    u16::from_be_bytes([high, low])
}

/// Splits a word into its wire order, high byte first.
pub const fn word_to_wire(word: u16) -> [u8; 2] {
    word.to_be_bytes()
}
