//! Command identifiers and request records.

use std::fmt;

use super::constants::{CHECKSUM_OFFSET, CHECKSUM_START, HEADER_SIZE};
use super::header::{HeaderError, PacketHeader};
use crate::integrity::additive_checksum;

/// ISP command identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    BootInfo = 0x10,
    BootHeader = 0x11,
    PubKey = 0x12,
    Signature = 0x14,
    AesIv = 0x16,
    SegHeader = 0x17,
    SegData = 0x18,
    ImgCheck = 0x19,
    ImgRun = 0x1A,
    Sha256 = 0x2D,
    EraseFlash = 0x30,
    FlashData = 0x31,
    ProgramOk = 0x3A,
}

impl Command {
    pub fn id(self) -> u8 {
        self as u8
    }

    pub fn from_id(id: u8) -> Option<Self> {
        Some(match id {
            0x10 => Command::BootInfo,
            0x11 => Command::BootHeader,
            0x12 => Command::PubKey,
            0x14 => Command::Signature,
            0x16 => Command::AesIv,
            0x17 => Command::SegHeader,
            0x18 => Command::SegData,
            0x19 => Command::ImgCheck,
            0x1A => Command::ImgRun,
            0x2D => Command::Sha256,
            0x30 => Command::EraseFlash,
            0x31 => Command::FlashData,
            0x3A => Command::ProgramOk,
            _ => return None,
        })
    }

    /// Whether the reserved header byte carries the additive checksum.
    pub fn is_checksummed(self) -> bool {
        matches!(
            self,
            Command::EraseFlash | Command::FlashData | Command::Sha256
        )
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Command::BootInfo => "BOOT_INFO",
            Command::BootHeader => "BOOT_HDR",
            Command::PubKey => "PUB_KEY",
            Command::Signature => "SIGNATURE",
            Command::AesIv => "AES_IV",
            Command::SegHeader => "SEG_HDR",
            Command::SegData => "SEG_DATA",
            Command::ImgCheck => "IMG_CHECK",
            Command::ImgRun => "IMG_RUN",
            Command::Sha256 => "SHA_256",
            Command::EraseFlash => "ERASE_FLASH",
            Command::FlashData => "FLASH_DATA",
            Command::ProgramOk => "PROG_OK",
        };
        write!(f, "{} (0x{:02X})", name, self.id())
    }
}

/// A request record: header plus command-specific payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    command: Command,
    payload: Vec<u8>,
}

impl Packet {
    pub fn new(command: Command, payload: Vec<u8>) -> Self {
        Self { command, payload }
    }

    /// Header-only request (boot info, image check/run, program ok).
    pub fn empty(command: Command) -> Self {
        Self::new(command, Vec::new())
    }

    /// Boot header record, sent verbatim.
    pub fn boot_header(record: &[u8]) -> Self {
        Self::new(Command::BootHeader, record.to_vec())
    }

    /// Segment header record, sent verbatim.
    pub fn segment_header(record: &[u8]) -> Self {
        Self::new(Command::SegHeader, record.to_vec())
    }

    /// One frame of loader segment data. The destination is implied by the
    /// segment header, so no address goes on the wire.
    pub fn segment_data(data: &[u8]) -> Self {
        Self::new(Command::SegData, data.to_vec())
    }

    /// Erase `[start, end)`.
    pub fn erase(start: u32, end: u32) -> Self {
        let mut payload = Vec::with_capacity(8);
        payload.extend_from_slice(&start.to_le_bytes());
        payload.extend_from_slice(&end.to_le_bytes());
        Self::new(Command::EraseFlash, payload)
    }

    /// One frame of flash data destined for `address`.
    pub fn flash_data(address: u32, data: &[u8]) -> Self {
        let mut payload = Vec::with_capacity(4 + data.len());
        payload.extend_from_slice(&address.to_le_bytes());
        payload.extend_from_slice(data);
        Self::new(Command::FlashData, payload)
    }

    /// Ask the loader for the SHA-256 of `size` bytes at `start`.
    pub fn sha256(start: u32, size: u32) -> Self {
        let mut payload = Vec::with_capacity(8);
        payload.extend_from_slice(&start.to_le_bytes());
        payload.extend_from_slice(&size.to_le_bytes());
        Self::new(Command::Sha256, payload)
    }

    pub fn command(&self) -> Command {
        self.command
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Serialize header + payload, filling in the checksum where the command
    /// carries one.
    pub fn encode(&self) -> Result<Vec<u8>, HeaderError> {
        let header = PacketHeader::new(self.command.id(), self.payload.len())?;

        let mut record = Vec::with_capacity(HEADER_SIZE + self.payload.len());
        header.write_to(&mut record)?;
        record.extend_from_slice(&self.payload);

        if self.command.is_checksummed() {
            record[CHECKSUM_OFFSET] = additive_checksum(&record[CHECKSUM_START..]);
        }
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::header::parse_header;

    #[test]
    fn test_command_ids() {
        for cmd in [
            Command::BootInfo,
            Command::BootHeader,
            Command::PubKey,
            Command::Signature,
            Command::AesIv,
            Command::SegHeader,
            Command::SegData,
            Command::ImgCheck,
            Command::ImgRun,
            Command::Sha256,
            Command::EraseFlash,
            Command::FlashData,
            Command::ProgramOk,
        ] {
            assert_eq!(Command::from_id(cmd.id()), Some(cmd));
        }
        assert_eq!(Command::from_id(0x13), None);
    }

    #[test]
    fn test_empty_packet() {
        let bytes = Packet::empty(Command::BootInfo).encode().unwrap();
        assert_eq!(bytes, vec![0x10, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn test_erase_packet_checksum() {
        let bytes = Packet::erase(0x2000, 0x3388).encode().unwrap();
        assert_eq!(bytes.len(), 12);
        assert_eq!(bytes[0], 0x30);
        assert_eq!(&bytes[2..4], &[0x08, 0x00]);
        assert_eq!(&bytes[4..8], &0x2000u32.to_le_bytes());
        assert_eq!(&bytes[8..12], &0x3388u32.to_le_bytes());
        // 0x08 + 0x20 + 0x88 + 0x33
        assert_eq!(bytes[1], 0x08u8.wrapping_add(0x20).wrapping_add(0x88).wrapping_add(0x33));
    }

    #[test]
    fn test_flash_data_length_includes_address() {
        let data = [0xAAu8; 10];
        let bytes = Packet::flash_data(0x1_0000, &data).encode().unwrap();
        let header = parse_header(&bytes).unwrap();
        assert_eq!(header.length, 14);
        assert_eq!(bytes.len(), 4 + 14);
        assert_eq!(header.checksum, additive_checksum(&bytes[2..]));
    }

    #[test]
    fn test_unchecksummed_commands_leave_reserved_zero() {
        let bytes = Packet::segment_data(&[1, 2, 3]).encode().unwrap();
        assert_eq!(bytes, vec![0x18, 0x00, 0x03, 0x00, 1, 2, 3]);

        let record = [0x5Au8; 16];
        let bytes = Packet::segment_header(&record).encode().unwrap();
        assert_eq!(bytes[1], 0);
        assert_eq!(&bytes[2..4], &[16, 0]);
    }

    #[test]
    fn test_sha256_request() {
        let bytes = Packet::sha256(0x10000, 5000).encode().unwrap();
        assert_eq!(bytes[0], 0x2D);
        assert_eq!(&bytes[4..8], &0x10000u32.to_le_bytes());
        assert_eq!(&bytes[8..12], &5000u32.to_le_bytes());
        assert_eq!(bytes[1], additive_checksum(&bytes[2..]));
    }

    #[test]
    fn test_oversized_payload() {
        let data = vec![0u8; 70_000];
        assert!(matches!(
            Packet::segment_data(&data).encode(),
            Err(HeaderError::InvalidLength { .. })
        ));
    }
}
