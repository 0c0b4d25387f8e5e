//! Boot header record (176 bytes).
//!
//! Layout:
//!
//! | Offset | Field                                 |
//! |--------|---------------------------------------|
//! | 0      | magic `BFNP`                          |
//! | 4      | revision                              |
//! | 8      | flash config: `FCFG`, 84 bytes, CRC   |
//! | 100    | clock config: `PCFG`, 8 bytes, CRC    |
//! | 116    | boot config word                      |
//! | 120    | segment count / image length          |
//! | 124    | boot entry                            |
//! | 128    | image start (RAM addr / flash offset) |
//! | 132    | SHA-256 of the image                  |
//! | 164    | two reserved words                    |
//! | 172    | CRC-32 over bytes `[0, 172)`          |

use std::io::{Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt};

use super::ImageError;
use crate::integrity::crc32;
use crate::protocol::BOOT_HEADER_SIZE;

pub const BOOT_HEADER_MAGIC: [u8; 4] = *b"BFNP";
pub const FLASH_CFG_MAGIC: [u8; 4] = *b"FCFG";
pub const CLOCK_CFG_MAGIC: [u8; 4] = *b"PCFG";

const FLASH_CFG_LEN: usize = 84;
const CLOCK_CFG_LEN: usize = 8;
const CRC_OFFSET: usize = 172;

/// Decoded boot configuration word.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BootConfig(pub u32);

impl BootConfig {
    fn bits(&self, shift: u32, width: u32) -> u32 {
        (self.0 >> shift) & ((1 << width) - 1)
    }

    pub fn sign(&self) -> u8 {
        self.bits(0, 2) as u8
    }
    pub fn encrypt_type(&self) -> u8 {
        self.bits(2, 2) as u8
    }
    pub fn key_sel(&self) -> u8 {
        self.bits(4, 2) as u8
    }
    pub fn no_segment(&self) -> bool {
        self.bits(8, 1) != 0
    }
    pub fn cache_enable(&self) -> bool {
        self.bits(9, 1) != 0
    }
    pub fn not_load_in_boot(&self) -> bool {
        self.bits(10, 1) != 0
    }
    pub fn aes_region_lock(&self) -> bool {
        self.bits(11, 1) != 0
    }
    pub fn cache_way_disable(&self) -> u8 {
        self.bits(12, 4) as u8
    }
    pub fn crc_ignore(&self) -> bool {
        self.bits(16, 1) != 0
    }
    pub fn hash_ignore(&self) -> bool {
        self.bits(17, 1) != 0
    }
    pub fn halt_cpu1(&self) -> bool {
        self.bits(18, 1) != 0
    }
}

/// Magic + config + CRC block inside the boot header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigBlock {
    pub magic: [u8; 4],
    pub cfg: Vec<u8>,
    pub crc32: u32,
}

impl ConfigBlock {
    fn read(cursor: &mut Cursor<&[u8]>, len: usize) -> Result<Self, ImageError> {
        let mut magic = [0u8; 4];
        cursor.read_exact(&mut magic)?;
        let mut cfg = vec![0u8; len];
        cursor.read_exact(&mut cfg)?;
        let crc32 = cursor.read_u32::<LittleEndian>()?;
        Ok(Self { magic, cfg, crc32 })
    }

    pub fn is_crc_valid(&self) -> bool {
        crc32(&self.cfg) == self.crc32
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootHeader {
    pub magic: [u8; 4],
    pub revision: u32,
    pub flash_cfg: ConfigBlock,
    pub clock_cfg: ConfigBlock,
    pub boot_cfg: BootConfig,
    /// Segment count, or image length when `no_segment` is set.
    pub segment_info: u32,
    pub boot_entry: u32,
    pub img_start: u32,
    pub hash: [u8; 32],
    pub rsvd: [u32; 2],
    pub crc32: u32,
    computed_crc: u32,
}

impl BootHeader {
    pub const SIZE: usize = BOOT_HEADER_SIZE;

    pub fn from_bytes(data: &[u8]) -> Result<Self, ImageError> {
        if data.len() < Self::SIZE {
            return Err(ImageError::Truncated {
                record: "boot header",
                offset: 0,
                needed: Self::SIZE,
                actual: data.len(),
            });
        }

        let mut cursor = Cursor::new(&data[..Self::SIZE]);
        let mut magic = [0u8; 4];
        cursor.read_exact(&mut magic)?;
        if magic != BOOT_HEADER_MAGIC {
            return Err(ImageError::InvalidMagic {
                record: "boot header",
                found: magic,
            });
        }
        let revision = cursor.read_u32::<LittleEndian>()?;
        let flash_cfg = ConfigBlock::read(&mut cursor, FLASH_CFG_LEN)?;
        let clock_cfg = ConfigBlock::read(&mut cursor, CLOCK_CFG_LEN)?;
        let boot_cfg = BootConfig(cursor.read_u32::<LittleEndian>()?);
        let segment_info = cursor.read_u32::<LittleEndian>()?;
        let boot_entry = cursor.read_u32::<LittleEndian>()?;
        let img_start = cursor.read_u32::<LittleEndian>()?;
        let mut hash = [0u8; 32];
        cursor.read_exact(&mut hash)?;
        let rsvd = [
            cursor.read_u32::<LittleEndian>()?,
            cursor.read_u32::<LittleEndian>()?,
        ];
        let crc32_stored = cursor.read_u32::<LittleEndian>()?;

        Ok(Self {
            magic,
            revision,
            flash_cfg,
            clock_cfg,
            boot_cfg,
            segment_info,
            boot_entry,
            img_start,
            hash,
            rsvd,
            crc32: crc32_stored,
            computed_crc: crc32(&data[..CRC_OFFSET]),
        })
    }

    pub fn is_crc_valid(&self) -> bool {
        self.computed_crc == self.crc32
    }

    /// Human-readable list of inconsistencies. Empty when the header is sound.
    pub fn problems(&self) -> Vec<String> {
        let mut out = Vec::new();
        if self.flash_cfg.magic != FLASH_CFG_MAGIC {
            out.push(format!("flash config magic {:02X?}", self.flash_cfg.magic));
        }
        if !self.flash_cfg.is_crc_valid() {
            out.push("flash config CRC mismatch".to_string());
        }
        if self.clock_cfg.magic != CLOCK_CFG_MAGIC {
            out.push(format!("clock config magic {:02X?}", self.clock_cfg.magic));
        }
        if !self.clock_cfg.is_crc_valid() {
            out.push("clock config CRC mismatch".to_string());
        }
        if !self.is_crc_valid() && !self.boot_cfg.crc_ignore() {
            out.push(format!(
                "header CRC mismatch: stored 0x{:08X}, computed 0x{:08X}",
                self.crc32, self.computed_crc
            ));
        }
        out
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Build a consistent boot header with the given config word.
    pub(crate) fn sample_header(boot_cfg: u32) -> Vec<u8> {
        let mut data = vec![0u8; BOOT_HEADER_SIZE];
        data[..4].copy_from_slice(&BOOT_HEADER_MAGIC);
        data[4..8].copy_from_slice(&1u32.to_le_bytes());

        data[8..12].copy_from_slice(&FLASH_CFG_MAGIC);
        for (i, b) in data[12..96].iter_mut().enumerate() {
            *b = i as u8;
        }
        let fcrc = crc32(&data[12..96]);
        data[96..100].copy_from_slice(&fcrc.to_le_bytes());

        data[100..104].copy_from_slice(&CLOCK_CFG_MAGIC);
        data[104..112].copy_from_slice(&[4, 4, 0, 1, 1, 0, 0, 0]);
        let ccrc = crc32(&data[104..112]);
        data[112..116].copy_from_slice(&ccrc.to_le_bytes());

        data[116..120].copy_from_slice(&boot_cfg.to_le_bytes());
        data[120..124].copy_from_slice(&1u32.to_le_bytes());
        data[124..128].copy_from_slice(&0x2201_0000u32.to_le_bytes());
        data[128..132].copy_from_slice(&0x2000u32.to_le_bytes());
        data[132..164].fill(0xEF);

        let crc = crc32(&data[..CRC_OFFSET]);
        data[CRC_OFFSET..].copy_from_slice(&crc.to_le_bytes());
        data
    }

    #[test]
    fn test_parse_sample() {
        let hdr = BootHeader::from_bytes(&sample_header(0)).unwrap();
        assert_eq!(hdr.revision, 1);
        assert_eq!(hdr.boot_entry, 0x2201_0000);
        assert_eq!(hdr.img_start, 0x2000);
        assert_eq!(hdr.hash, [0xEF; 32]);
        assert!(hdr.is_crc_valid());
        assert!(hdr.problems().is_empty());
    }

    #[test]
    fn test_boot_cfg_bits() {
        let word = 0b01 | (0b10 << 2) | (0b11 << 4) | (1 << 9) | (0xA << 12) | (1 << 17) | (1 << 18);
        let cfg = BootConfig(word);
        assert_eq!(cfg.sign(), 1);
        assert_eq!(cfg.encrypt_type(), 2);
        assert_eq!(cfg.key_sel(), 3);
        assert!(!cfg.no_segment());
        assert!(cfg.cache_enable());
        assert!(!cfg.not_load_in_boot());
        assert!(!cfg.aes_region_lock());
        assert_eq!(cfg.cache_way_disable(), 0xA);
        assert!(!cfg.crc_ignore());
        assert!(cfg.hash_ignore());
        assert!(cfg.halt_cpu1());
    }

    #[test]
    fn test_corrupt_crc_reported() {
        let mut data = sample_header(0);
        data[124] ^= 0xFF;
        let hdr = BootHeader::from_bytes(&data).unwrap();
        assert!(!hdr.is_crc_valid());
        assert_eq!(hdr.problems().len(), 1);

        // crcIgnore silences the whole-header check
        let mut data = sample_header(1 << 16);
        data[124] ^= 0xFF;
        let hdr = BootHeader::from_bytes(&data).unwrap();
        assert!(hdr.problems().is_empty());
    }

    #[test]
    fn test_bad_magic() {
        let mut data = sample_header(0);
        data[0] = b'X';
        assert!(matches!(
            BootHeader::from_bytes(&data),
            Err(ImageError::InvalidMagic { .. })
        ));
    }
}
