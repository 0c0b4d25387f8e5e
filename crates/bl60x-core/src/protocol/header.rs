//! Packet header shared by every request record.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;
use thiserror::Error;

use super::constants::{HEADER_SIZE, MAX_PAYLOAD_LEN};

#[derive(Error, Debug)]
pub enum HeaderError {
    #[error("Invalid payload length: {len} exceeds {max}")]
    InvalidLength { len: usize, max: usize },
    #[error("Buffer too small: expected {expected}, got {actual}")]
    BufferTooSmall { expected: usize, actual: usize },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Packet Header (4 bytes)
///
/// `length` counts the payload that follows the header in this record only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PacketHeader {
    pub command: u8,
    /// Additive checksum for the commands that carry one, zero otherwise.
    pub checksum: u8,
    pub length: u16,
}

impl PacketHeader {
    pub const SIZE: usize = HEADER_SIZE;

    pub fn new(command: u8, payload_len: usize) -> Result<Self, HeaderError> {
        if payload_len > MAX_PAYLOAD_LEN {
            return Err(HeaderError::InvalidLength {
                len: payload_len,
                max: MAX_PAYLOAD_LEN,
            });
        }
        Ok(Self {
            command,
            checksum: 0,
            length: payload_len as u16,
        })
    }

    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0] = self.command;
        buf[1] = self.checksum;
        buf[2..4].copy_from_slice(&self.length.to_le_bytes());
        buf
    }

    pub fn write_to(&self, out: &mut Vec<u8>) -> Result<(), HeaderError> {
        out.write_u8(self.command)?;
        out.write_u8(self.checksum)?;
        out.write_u16::<LittleEndian>(self.length)?;
        Ok(())
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, HeaderError> {
        if data.len() < Self::SIZE {
            return Err(HeaderError::BufferTooSmall {
                expected: Self::SIZE,
                actual: data.len(),
            });
        }
        let mut cursor = Cursor::new(data);
        Ok(Self {
            command: cursor.read_u8()?,
            checksum: cursor.read_u8()?,
            length: cursor.read_u16::<LittleEndian>()?,
        })
    }
}

/// Build the 4-byte header for `command_id` with a `payload_len`-byte payload.
pub fn build_header(command_id: u8, payload_len: usize) -> Result<[u8; HEADER_SIZE], HeaderError> {
    Ok(PacketHeader::new(command_id, payload_len)?.to_bytes())
}

/// Inverse of [`build_header`].
pub fn parse_header(bytes: &[u8]) -> Result<PacketHeader, HeaderError> {
    PacketHeader::from_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_roundtrip() {
        for &id in &[0x10u8, 0x18, 0x2D, 0x31, 0xFF] {
            for &len in &[0usize, 1, 0xFF, 0x100, 2048, 8196, MAX_PAYLOAD_LEN] {
                let bytes = build_header(id, len).unwrap();
                let parsed = parse_header(&bytes).unwrap();
                assert_eq!(parsed.command, id);
                assert_eq!(parsed.checksum, 0);
                assert_eq!(parsed.length as usize, len);
            }
        }
    }

    #[test]
    fn test_length_is_little_endian() {
        let bytes = build_header(0x31, 0x0804).unwrap();
        assert_eq!(bytes, [0x31, 0x00, 0x04, 0x08]);
    }

    #[test]
    fn test_invalid_length() {
        let err = build_header(0x31, MAX_PAYLOAD_LEN + 1).unwrap_err();
        assert!(matches!(err, HeaderError::InvalidLength { len: 65536, .. }));
    }

    #[test]
    fn test_write_to_matches_to_bytes() {
        let header = PacketHeader {
            command: 0x30,
            checksum: 0x5A,
            length: 8,
        };
        let mut out = Vec::new();
        header.write_to(&mut out).unwrap();
        assert_eq!(out, header.to_bytes());
    }

    #[test]
    fn test_parse_short_buffer() {
        assert!(matches!(
            parse_header(&[0x10, 0x00]),
            Err(HeaderError::BufferTooSmall { expected: 4, actual: 2 })
        ));
    }
}
