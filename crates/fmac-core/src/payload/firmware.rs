//! Firmware image container.
//!
//! An image file starts with an 80-byte security block: an 8-byte keyset
//! descriptor, a 64-byte signature and an 8-byte hash. Everything after that
//! is the encrypted payload streamed into the download ring. The security
//! block itself never enters the ring; the keyset goes through a
//! compatibility check and the signature and hash are planted in the
//! download control area for the bootloader to verify.

use std::path::Path;
use std::{fs, io, str};

use thiserror::Error;

use crate::protocol::constants::{
    DOWNLOAD_BLOCK_SIZE, FW_HASH_SIZE, FW_KEYSET_SIZE, FW_SECURITY_BLOCK_SIZE, FW_SIGNATURE_SIZE,
};

/// Errors produced while loading or probing a firmware image.
#[derive(Debug, Error)]
pub enum FirmwareImageError {
    #[error("image is {actual} bytes, too short for the {FW_SECURITY_BLOCK_SIZE}-byte security block")]
    TooShort { actual: usize },

    #[error("keyset descriptor is not ASCII hex: {0:02X?}")]
    MalformedKeyset([u8; 2]),

    #[error("failed to read firmware image: {0}")]
    Io(#[from] io::Error),
}

/// A parsed firmware image, ready to stream.
#[derive(Debug, Clone)]
pub struct FirmwareImage {
    data: Vec<u8>,
}

impl FirmwareImage {
    /// Parses an in-memory image.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self, FirmwareImageError> {
        if data.len() <= FW_SECURITY_BLOCK_SIZE {
            return Err(FirmwareImageError::TooShort { actual: data.len() });
        }
        Ok(FirmwareImage { data })
    }

    /// Reads and parses an image file.
    pub fn from_file(path: &Path) -> Result<Self, FirmwareImageError> {
        Self::from_bytes(fs::read(path)?)
    }

    /// Assembles an image from its parts. Tests and the bus simulator build
    /// throwaway images with this.
    pub fn from_parts(
        keyset: [u8; FW_KEYSET_SIZE],
        signature: [u8; FW_SIGNATURE_SIZE],
        hash: [u8; FW_HASH_SIZE],
        payload: &[u8],
    ) -> Result<Self, FirmwareImageError> {
        let mut data = Vec::with_capacity(FW_SECURITY_BLOCK_SIZE + payload.len());
        data.extend_from_slice(&keyset);
        data.extend_from_slice(&signature);
        data.extend_from_slice(&hash);
        data.extend_from_slice(payload);
        Self::from_bytes(data)
    }

    /// The 8-byte keyset descriptor.
    pub fn keyset(&self) -> &[u8] {
        &self.data[..FW_KEYSET_SIZE]
    }

    /// The keyset as a number: the descriptor's last two characters are the
    /// hex spelling of the keyset the image was signed for.
    pub fn keyset_value(&self) -> Result<u8, FirmwareImageError> {
        let chars = [self.data[FW_KEYSET_SIZE - 2], self.data[FW_KEYSET_SIZE - 1]];
        str::from_utf8(&chars)
            .ok()
            .and_then(|s| u8::from_str_radix(s, 16).ok())
            .ok_or(FirmwareImageError::MalformedKeyset(chars))
    }

    /// The 64-byte image signature.
    pub fn signature(&self) -> &[u8] {
        &self.data[FW_KEYSET_SIZE..FW_KEYSET_SIZE + FW_SIGNATURE_SIZE]
    }

    /// The 8-byte image hash.
    pub fn hash(&self) -> &[u8] {
        let start = FW_KEYSET_SIZE + FW_SIGNATURE_SIZE;
        &self.data[start..start + FW_HASH_SIZE]
    }

    /// The payload streamed into the download ring.
    pub fn payload(&self) -> &[u8] {
        &self.data[FW_SECURITY_BLOCK_SIZE..]
    }

    /// Number of ring blocks the payload occupies.
    pub fn num_blocks(&self) -> usize {
        self.payload().len().div_ceil(DOWNLOAD_BLOCK_SIZE as usize)
    }

    /// Payload split into ring-sized blocks; the last one may be short.
    pub fn blocks(&self) -> impl Iterator<Item = &[u8]> {
        self.payload().chunks(DOWNLOAD_BLOCK_SIZE as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(payload_len: usize) -> FirmwareImage {
        FirmwareImage::from_parts(
            *b"WFM_KS90",
            [0xAA; FW_SIGNATURE_SIZE],
            [0xBB; FW_HASH_SIZE],
            &vec![0x5A; payload_len],
        )
        .unwrap()
    }

    #[test]
    fn sections_are_sliced_from_the_front() {
        let fw = image(100);
        assert_eq!(fw.keyset(), b"WFM_KS90");
        assert_eq!(fw.signature(), &[0xAA; FW_SIGNATURE_SIZE][..]);
        assert_eq!(fw.hash(), &[0xBB; FW_HASH_SIZE][..]);
        assert_eq!(fw.payload().len(), 100);
    }

    #[test]
    fn keyset_value_parses_trailing_hex() {
        assert_eq!(image(10).keyset_value().unwrap(), 0x90);

        let fw = FirmwareImage::from_parts(
            *b"WFM_KSc1",
            [0; FW_SIGNATURE_SIZE],
            [0; FW_HASH_SIZE],
            &[0; 4],
        )
        .unwrap();
        assert_eq!(fw.keyset_value().unwrap(), 0xC1);
    }

    #[test]
    fn keyset_value_rejects_non_hex() {
        let fw = FirmwareImage::from_parts(
            *b"WFM_KSzz",
            [0; FW_SIGNATURE_SIZE],
            [0; FW_HASH_SIZE],
            &[0; 4],
        )
        .unwrap();
        assert!(matches!(
            fw.keyset_value(),
            Err(FirmwareImageError::MalformedKeyset(_))
        ));
    }

    #[test]
    fn block_count_rounds_up() {
        assert_eq!(image(1024).num_blocks(), 1);
        assert_eq!(image(1025).num_blocks(), 2);
        assert_eq!(image(10 * 1024).num_blocks(), 10);
        assert_eq!(image(1).num_blocks(), 1);
    }

    #[test]
    fn last_block_may_be_short() {
        let fw = image(2500);
        let blocks: Vec<_> = fw.blocks().collect();
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[0].len(), 1024);
        assert_eq!(blocks[1].len(), 1024);
        assert_eq!(blocks[2].len(), 452);
    }

    #[test]
    fn security_block_alone_is_too_short() {
        let err = FirmwareImage::from_bytes(vec![0; FW_SECURITY_BLOCK_SIZE]).unwrap_err();
        assert!(matches!(err, FirmwareImageError::TooShort { actual: 80 }));
    }
}
