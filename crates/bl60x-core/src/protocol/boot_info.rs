//! Boot-info record reported by the boot ROM.

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{Cursor, Read};

use super::constants::BOOT_INFO_SIZE;
use super::header::HeaderError;

/// Security options decoded from the low byte of the option blob.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SecurityFlags {
    /// bits [1:0]
    pub sign: u8,
    /// bits [3:2]
    pub encrypted: u8,
    /// bits [5:4]
    pub encrypt_type: u8,
    /// bits [7:6]
    pub key_sel: u8,
}

impl SecurityFlags {
    pub fn from_byte(b: u8) -> Self {
        Self {
            sign: b & 0x03,
            encrypted: (b >> 2) & 0x03,
            encrypt_type: (b >> 4) & 0x03,
            key_sel: (b >> 6) & 0x03,
        }
    }

    pub fn is_signed(&self) -> bool {
        self.sign != 0
    }

    pub fn is_encrypted(&self) -> bool {
        self.encrypted != 0
    }
}

/// Boot Info (20 bytes)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BootInfo {
    pub boot_rom_version: u32,
    pub opt_info: [u8; 16],
}

impl BootInfo {
    pub const SIZE: usize = BOOT_INFO_SIZE;

    pub fn from_bytes(data: &[u8]) -> Result<Self, HeaderError> {
        if data.len() < Self::SIZE {
            return Err(HeaderError::BufferTooSmall {
                expected: Self::SIZE,
                actual: data.len(),
            });
        }
        let mut cursor = Cursor::new(data);
        let boot_rom_version = cursor.read_u32::<LittleEndian>()?;
        let mut opt_info = [0u8; 16];
        cursor.read_exact(&mut opt_info)?;
        Ok(Self {
            boot_rom_version,
            opt_info,
        })
    }

    pub fn to_bytes(&self) -> [u8; BOOT_INFO_SIZE] {
        let mut buf = [0u8; BOOT_INFO_SIZE];
        buf[..4].copy_from_slice(&self.boot_rom_version.to_le_bytes());
        buf[4..].copy_from_slice(&self.opt_info);
        buf
    }

    /// Decode the sign/encrypt bits. The layout is not published by the
    /// vendor, so callers may opt out of trusting it.
    pub fn security_flags(&self) -> SecurityFlags {
        SecurityFlags::from_byte(self.opt_info[0])
    }
}
