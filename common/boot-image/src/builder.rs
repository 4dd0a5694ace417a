// Licensed under the Apache-2.0 license

//! Host-side helpers to assemble and inspect boot images.

use crate::{checksum, word_from_wire, ImageHeader, HEADER_SIZE};
use zerocopy::{FromBytes, IntoBytes};

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ImageFormatError {
    #[error("payload of {0} bytes does not fit the 16-bit size field")]
    PayloadTooLarge(usize),
    #[error("image too small to contain the header")]
    Truncated,
    #[error("invalid signature 0x{0:04x}")]
    InvalidSignature(u16),
    #[error("image declares {declared} payload bytes but only {available} follow the header")]
    SizeMismatch { declared: usize, available: usize },
    #[error("checksum mismatch: header 0x{expected:04x}, payload 0x{actual:04x}")]
    ChecksumMismatch { expected: u16, actual: u16 },
}

/// Builds the byte stream of a boot image from a payload.
///
/// The signature, size and checksum are derived from the payload unless
/// explicitly overridden, which is useful to produce deliberately broken
/// images.
#[derive(Debug, Clone, Default)]
pub struct ImageBuilder {
    payload: Vec<u16>,
    signature: Option<u16>,
    size: Option<u16>,
    checksum: Option<u16>,
}

impl ImageBuilder {
    pub fn from_words(words: &[u16]) -> Self {
        Self {
            payload: words.to_vec(),
            ..Default::default()
        }
    }

    /// Raw program bytes, high byte of each word first. An odd trailing byte
    /// is padded with zero.
    pub fn from_bytes(raw: &[u8]) -> Self {
        let payload = raw
            .chunks(2)
            .map(|pair| word_from_wire(pair[0], pair.get(1).copied().unwrap_or(0)))
            .collect();
        Self {
            payload,
            ..Default::default()
        }
    }

    pub fn signature(mut self, signature: u16) -> Self {
        self.signature = Some(signature);
        self
    }

    pub fn size(mut self, size: u16) -> Self {
        self.size = Some(size);
        self
    }

    pub fn checksum(mut self, checksum: u16) -> Self {
        self.checksum = Some(checksum);
        self
    }

    pub fn header(&self) -> Result<ImageHeader, ImageFormatError> {
        let payload_size = self.payload.len() * 2;
        let size = match self.size {
            Some(size) => size,
            None => u16::try_from(payload_size)
                .map_err(|_| ImageFormatError::PayloadTooLarge(payload_size))?,
        };
        let mut header = ImageHeader::new(
            size,
            self.checksum
                .unwrap_or_else(|| checksum(self.payload.iter().copied())),
        );
        if let Some(signature) = self.signature {
            header.signature = signature.into();
        }
        Ok(header)
    }

    pub fn build(&self) -> Result<Vec<u8>, ImageFormatError> {
        let header = self.header()?;
        let mut image = Vec::with_capacity(HEADER_SIZE + self.payload.len() * 2);
        image.extend_from_slice(header.as_bytes());
        for word in &self.payload {
            image.extend_from_slice(&word.to_be_bytes());
        }
        Ok(image)
    }
}

/// A parsed and verified boot image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootImage {
    pub header: ImageHeader,
    pub payload: Vec<u16>,
}

impl BootImage {
    /// Parses `bytes` and applies the same structural checks as the
    /// bootloader, except for the capacity limit which depends on the target.
    pub fn parse(bytes: &[u8]) -> Result<Self, ImageFormatError> {
        let (header, rest) =
            ImageHeader::read_from_prefix(bytes).map_err(|_| ImageFormatError::Truncated)?;
        if !header.has_valid_signature() {
            return Err(ImageFormatError::InvalidSignature(header.signature.get()));
        }
        let declared = header.word_count() * 2;
        if rest.len() < declared {
            return Err(ImageFormatError::SizeMismatch {
                declared,
                available: rest.len(),
            });
        }
        let payload: Vec<u16> = rest[..declared]
            .chunks_exact(2)
            .map(|pair| word_from_wire(pair[0], pair[1]))
            .collect();
        let actual = checksum(payload.iter().copied());
        if actual != header.checksum.get() {
            return Err(ImageFormatError::ChecksumMismatch {
                expected: header.checksum.get(),
                actual,
            });
        }
        Ok(Self { header, payload })
    }
}
