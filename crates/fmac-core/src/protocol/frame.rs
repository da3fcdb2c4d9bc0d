//! Wire frame codec: 4-byte header, even-padded body, trailing piggyback.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;
use thiserror::Error;

use super::constants::{HEADER_SIZE, MSG_TYPE_IND};

#[derive(Error, Debug)]
pub enum FrameError {
    #[error("Buffer too small: expected {expected}, got {actual}")]
    BufferTooSmall { expected: usize, actual: usize },

    #[error("Frame too large: {len} bytes exceeds negotiated maximum {max}")]
    BufferTooLarge { len: usize, max: usize },

    #[error("Malformed frame: declared length {declared}, {available} bytes available")]
    MalformedFrame { declared: usize, available: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Round up to the next even value; the bus rejects odd transfer sizes.
#[inline]
pub const fn round_up_even(len: usize) -> usize {
    len + (len & 1)
}

/// True for chip-to-host indications (top bit of the id byte).
#[inline]
pub const fn is_indication(id: u8) -> bool {
    id & MSG_TYPE_IND != 0
}

/// Message header preceding every frame in both directions.
///
/// `length` covers the header itself plus the body, after even padding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameHeader {
    pub length: u16,
    pub id: u8,
    pub info: u8,
}

impl FrameHeader {
    pub const SIZE: usize = HEADER_SIZE;

    pub fn new(length: u16, id: u8, info: u8) -> Self {
        Self { length, id, info }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::SIZE);
        buf.write_u16::<LittleEndian>(self.length).unwrap();
        buf.push(self.id);
        buf.push(self.info);
        buf
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, FrameError> {
        if data.len() < Self::SIZE {
            return Err(FrameError::BufferTooSmall {
                expected: Self::SIZE,
                actual: data.len(),
            });
        }
        let mut cursor = Cursor::new(data);
        Ok(Self {
            length: cursor.read_u16::<LittleEndian>()?,
            id: cursor.read_u8()?,
            info: cursor.read_u8()?,
        })
    }

    pub fn is_indication(&self) -> bool {
        is_indication(self.id)
    }
}

/// A received frame split into its parts.
#[derive(Debug)]
pub struct DecodedFrame<'a> {
    pub header: FrameHeader,
    pub body: &'a [u8],
    /// Control-register snapshot trailing the payload; describes the next
    /// pending frame so the receiver can skip a register read.
    pub piggyback: u16,
}

/// Encode a request frame: header, body, zero pad byte when the body
/// length is odd. `max_len` is the chip-advertised buffer bound.
pub fn encode_frame(id: u8, info: u8, body: &[u8], max_len: usize) -> Result<Vec<u8>, FrameError> {
    let frame_len = round_up_even(FrameHeader::SIZE + body.len());
    if frame_len > max_len {
        return Err(FrameError::BufferTooLarge {
            len: frame_len,
            max: max_len,
        });
    }

    let header = FrameHeader::new(frame_len as u16, id, info);
    let mut buf = Vec::with_capacity(frame_len);
    buf.extend_from_slice(&header.to_bytes());
    buf.extend_from_slice(body);
    if buf.len() < frame_len {
        buf.push(0);
    }
    Ok(buf)
}

/// Decode one received transfer: the frame area as sized by the control
/// register, followed by the 16-bit piggyback word.
///
/// The declared header length may be shorter than the transfer (the chip
/// pads reads to even word counts) but never longer.
pub fn decode_frame(buf: &[u8]) -> Result<DecodedFrame<'_>, FrameError> {
    if buf.len() < FrameHeader::SIZE + 2 {
        return Err(FrameError::BufferTooSmall {
            expected: FrameHeader::SIZE + 2,
            actual: buf.len(),
        });
    }

    let frame_area = buf.len() - 2;
    let header = FrameHeader::from_bytes(buf)?;
    let declared = header.length as usize;
    if declared < FrameHeader::SIZE || declared > frame_area {
        return Err(FrameError::MalformedFrame {
            declared,
            available: frame_area,
        });
    }

    let mut tail = Cursor::new(&buf[frame_area..]);
    let piggyback = tail.read_u16::<LittleEndian>()?;

    Ok(DecodedFrame {
        header,
        body: &buf[FrameHeader::SIZE..declared],
        piggyback,
    })
}

/// Extract the 32-bit status word opening every confirmation body.
pub fn decode_confirmation_status(body: &[u8]) -> Result<u32, FrameError> {
    if body.len() < 4 {
        return Err(FrameError::BufferTooSmall {
            expected: 4,
            actual: body.len(),
        });
    }
    let mut cursor = Cursor::new(body);
    Ok(cursor.read_u32::<LittleEndian>()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::constants::{CONNECT_REQ_ID, STA_INTERFACE, STARTUP_IND_ID};

    #[test]
    fn header_roundtrip() {
        let header = FrameHeader::new(0x0102, CONNECT_REQ_ID, STA_INTERFACE);
        let bytes = header.to_bytes();
        assert_eq!(bytes.len(), FrameHeader::SIZE);

        let parsed = FrameHeader::from_bytes(&bytes).unwrap();
        assert_eq!(parsed, header);
    }

    #[test]
    fn encode_pads_odd_bodies() {
        let frame = encode_frame(CONNECT_REQ_ID, STA_INTERFACE, &[0xAA, 0xBB, 0xCC], 512).unwrap();
        // 4 + 3 rounds to 8.
        assert_eq!(frame.len(), 8);
        let header = FrameHeader::from_bytes(&frame).unwrap();
        assert_eq!(header.length, 8);
        assert_eq!(frame[7], 0);
    }

    #[test]
    fn encode_decode_roundtrip() {
        let body = [0u8; 10];
        let mut frame = encode_frame(CONNECT_REQ_ID, STA_INTERFACE, &body, 512).unwrap();
        assert!(frame.len() % 2 == 0);
        assert!(frame.len() >= FrameHeader::SIZE);

        // Simulate the bus read: frame area plus the trailing control word.
        frame.extend_from_slice(&0x3001u16.to_le_bytes());
        let decoded = decode_frame(&frame).unwrap();
        assert_eq!(decoded.header.id, CONNECT_REQ_ID);
        assert_eq!(decoded.header.info, STA_INTERFACE);
        assert_eq!(decoded.body, &body);
        assert_eq!(decoded.piggyback, 0x3001);
    }

    #[test]
    fn encode_rejects_oversized() {
        let body = vec![0u8; 600];
        let err = encode_frame(CONNECT_REQ_ID, STA_INTERFACE, &body, 512).unwrap_err();
        assert!(matches!(err, FrameError::BufferTooLarge { .. }));
    }

    #[test]
    fn decode_rejects_inconsistent_length() {
        // Header claims 32 bytes but only 8 + piggyback were read.
        let mut buf = FrameHeader::new(32, STARTUP_IND_ID, 0).to_bytes();
        buf.extend_from_slice(&[0u8; 6]);
        let err = decode_frame(&buf).unwrap_err();
        assert!(matches!(err, FrameError::MalformedFrame { declared: 32, .. }));
    }

    #[test]
    fn decode_accepts_padded_reads() {
        // Chip rounds the transfer up: 6 declared, 8 read, plus piggyback.
        let mut buf = FrameHeader::new(6, STARTUP_IND_ID, 0).to_bytes();
        buf.extend_from_slice(&[0x11, 0x22, 0x00, 0x00]);
        buf.extend_from_slice(&0x0000u16.to_le_bytes());
        let decoded = decode_frame(&buf).unwrap();
        assert_eq!(decoded.body, &[0x11, 0x22]);
    }

    #[test]
    fn indication_bit() {
        assert!(is_indication(STARTUP_IND_ID));
        assert!(!is_indication(CONNECT_REQ_ID));
    }

    #[test]
    fn confirmation_status_word() {
        let body = [0x02, 0x00, 0x00, 0x00, 0xFF];
        assert_eq!(decode_confirmation_status(&body).unwrap(), 2);
        assert!(decode_confirmation_status(&[0x00]).is_err());
    }
}
