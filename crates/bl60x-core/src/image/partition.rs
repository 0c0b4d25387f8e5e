//! Partition table record (596 bytes).
//!
//! A 16-byte config block, sixteen 36-byte entries, then a CRC-32 over all
//! entries. The table itself is flashed verbatim to both table slots; the
//! entries are also used to look up where a named image belongs.

use std::io::{Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt};
use tracing::warn;

use super::ImageError;
use crate::integrity::crc32;

pub const PARTITION_MAGIC: u32 = 0x5450_4642; // "BFPT"
pub const MAX_ENTRIES: usize = 16;
pub const CONFIG_SIZE: usize = 16;
pub const ENTRY_SIZE: usize = 36;
pub const TABLE_SIZE: usize = CONFIG_SIZE + MAX_ENTRIES * ENTRY_SIZE + 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionEntry {
    pub entry_type: u8,
    pub device: u8,
    pub active_index: u8,
    pub name: String,
    pub address: [u32; 2],
    pub max_len: [u32; 2],
    pub len: u32,
    pub age: u32,
}

impl PartitionEntry {
    fn read(cursor: &mut Cursor<&[u8]>) -> Result<Self, ImageError> {
        let entry_type = cursor.read_u8()?;
        let device = cursor.read_u8()?;
        let active_index = cursor.read_u8()?;
        let mut raw_name = [0u8; 9];
        cursor.read_exact(&mut raw_name)?;
        let name_len = raw_name.iter().position(|&b| b == 0).unwrap_or(raw_name.len());
        let name = String::from_utf8_lossy(&raw_name[..name_len]).into_owned();
        Ok(Self {
            entry_type,
            device,
            active_index,
            name,
            address: [
                cursor.read_u32::<LittleEndian>()?,
                cursor.read_u32::<LittleEndian>()?,
            ],
            max_len: [
                cursor.read_u32::<LittleEndian>()?,
                cursor.read_u32::<LittleEndian>()?,
            ],
            len: cursor.read_u32::<LittleEndian>()?,
            age: cursor.read_u32::<LittleEndian>()?,
        })
    }

    /// Flash address of the active copy.
    pub fn active_address(&self) -> u32 {
        self.address[(self.active_index & 1) as usize]
    }

    /// Unused slots are all zero.
    pub fn is_used(&self) -> bool {
        !self.name.is_empty() || self.address != [0, 0]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionTable {
    pub version: u16,
    pub entry_cnt: u16,
    pub age: u32,
    pub config_crc32: u32,
    pub entries: Vec<PartitionEntry>,
    pub entries_crc32: u32,
    computed_entries_crc: u32,
    raw: Vec<u8>,
}

impl PartitionTable {
    pub const SIZE: usize = TABLE_SIZE;

    pub fn from_bytes(data: &[u8]) -> Result<Self, ImageError> {
        if data.len() < Self::SIZE {
            return Err(ImageError::Truncated {
                record: "partition table",
                offset: 0,
                needed: Self::SIZE,
                actual: data.len(),
            });
        }
        let data = &data[..Self::SIZE];
        let mut cursor = Cursor::new(data);

        let magic = cursor.read_u32::<LittleEndian>()?;
        if magic != PARTITION_MAGIC {
            return Err(ImageError::InvalidMagic {
                record: "partition table",
                found: magic.to_le_bytes(),
            });
        }
        let version = cursor.read_u16::<LittleEndian>()?;
        let entry_cnt = cursor.read_u16::<LittleEndian>()?;
        let age = cursor.read_u32::<LittleEndian>()?;
        let config_crc32 = cursor.read_u32::<LittleEndian>()?;

        let mut entries = Vec::with_capacity(MAX_ENTRIES);
        for _ in 0..MAX_ENTRIES {
            entries.push(PartitionEntry::read(&mut cursor)?);
        }
        let entries_crc32 = cursor.read_u32::<LittleEndian>()?;
        let entries_end = CONFIG_SIZE + MAX_ENTRIES * ENTRY_SIZE;

        let table = Self {
            version,
            entry_cnt,
            age,
            config_crc32,
            entries,
            entries_crc32,
            computed_entries_crc: crc32(&data[CONFIG_SIZE..entries_end]),
            raw: data.to_vec(),
        };
        if !table.is_crc_valid() {
            warn!(
                "Partition table entry CRC mismatch: stored 0x{:08X}, computed 0x{:08X}",
                table.entries_crc32, table.computed_entries_crc
            );
        }
        Ok(table)
    }

    pub fn is_crc_valid(&self) -> bool {
        self.entries_crc32 == self.computed_entries_crc
    }

    /// The table exactly as it will be written to flash.
    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    /// Entries in use, capped at the declared count.
    pub fn active_entries(&self) -> impl Iterator<Item = &PartitionEntry> {
        self.entries
            .iter()
            .take(self.entry_cnt as usize)
            .filter(|e| e.is_used())
    }

    pub fn find(&self, name: &str) -> Result<&PartitionEntry, ImageError> {
        self.active_entries()
            .find(|e| e.name == name)
            .ok_or_else(|| ImageError::EntryNotFound(name.to_string()))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    fn put_entry(buf: &mut [u8], index: usize, name: &str, addr: [u32; 2], max_len: u32) {
        let base = CONFIG_SIZE + index * ENTRY_SIZE;
        let e = &mut buf[base..base + ENTRY_SIZE];
        e[0] = index as u8;
        e[3..3 + name.len()].copy_from_slice(name.as_bytes());
        e[12..16].copy_from_slice(&addr[0].to_le_bytes());
        e[16..20].copy_from_slice(&addr[1].to_le_bytes());
        e[20..24].copy_from_slice(&max_len.to_le_bytes());
        e[24..28].copy_from_slice(&max_len.to_le_bytes());
    }

    /// A two-entry table with a valid entry CRC.
    pub(crate) fn sample_table() -> Vec<u8> {
        let mut buf = vec![0u8; TABLE_SIZE];
        buf[..4].copy_from_slice(&PARTITION_MAGIC.to_le_bytes());
        buf[4..6].copy_from_slice(&1u16.to_le_bytes());
        buf[6..8].copy_from_slice(&2u16.to_le_bytes());
        put_entry(&mut buf, 0, "FW", [0x10000, 0xE8000], 0xC8000);
        put_entry(&mut buf, 1, "mfg", [0x1B0000, 0], 0x32000);
        let end = CONFIG_SIZE + MAX_ENTRIES * ENTRY_SIZE;
        let crc = crc32(&buf[CONFIG_SIZE..end]);
        buf[end..].copy_from_slice(&crc.to_le_bytes());
        buf
    }

    #[test]
    fn test_table_size() {
        assert_eq!(TABLE_SIZE, 596);
    }

    #[test]
    fn test_parse_and_find() {
        let table = PartitionTable::from_bytes(&sample_table()).unwrap();
        assert_eq!(table.version, 1);
        assert_eq!(table.entry_cnt, 2);
        assert!(table.is_crc_valid());
        assert_eq!(table.active_entries().count(), 2);

        let fw = table.find("FW").unwrap();
        assert_eq!(fw.active_address(), 0x10000);
        assert_eq!(fw.max_len, [0xC8000, 0xC8000]);
        assert_eq!(table.find("mfg").unwrap().active_address(), 0x1B0000);
        assert!(matches!(
            table.find("media"),
            Err(ImageError::EntryNotFound(_))
        ));
        assert_eq!(table.as_bytes().len(), TABLE_SIZE);
    }

    #[test]
    fn test_active_index_selects_copy() {
        let mut buf = sample_table();
        buf[CONFIG_SIZE + 2] = 1;
        let table = PartitionTable::from_bytes(&buf).unwrap();
        assert_eq!(table.find("FW").unwrap().active_address(), 0xE8000);
        // CRC now stale, but parsing still succeeds
        assert!(!table.is_crc_valid());
    }

    #[test]
    fn test_bad_magic_and_short() {
        let mut buf = sample_table();
        buf[0] = 0;
        assert!(matches!(
            PartitionTable::from_bytes(&buf),
            Err(ImageError::InvalidMagic { .. })
        ));
        assert!(matches!(
            PartitionTable::from_bytes(&[0u8; 100]),
            Err(ImageError::Truncated { .. })
        ));
    }
}
