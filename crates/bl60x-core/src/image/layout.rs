//! Loader layout descriptors and the records they locate.

use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use tracing::{debug, warn};

use super::ImageError;
use super::boot_header::BootHeader;
use crate::integrity::crc32_parts;
use crate::protocol::{BOOT_HEADER_SIZE, SEGMENT_HEADER_SIZE};

/// A fixed region within a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordLayout {
    pub name: &'static str,
    pub offset: usize,
    pub size: usize,
}

impl RecordLayout {
    pub const fn new(name: &'static str, offset: usize, size: usize) -> Self {
        Self { name, offset, size }
    }

    pub fn end(&self) -> usize {
        self.offset + self.size
    }

    /// Borrow this region of `data`.
    pub fn extract<'a>(&self, data: &'a [u8]) -> Result<&'a [u8], ImageError> {
        data.get(self.offset..self.end())
            .ok_or(ImageError::Truncated {
                record: self.name,
                offset: self.offset,
                needed: self.size,
                actual: data.len(),
            })
    }
}

/// Where the records of a loader image live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoaderLayout {
    pub version: u32,
    pub boot_header: RecordLayout,
    pub segment_header: RecordLayout,
    /// Segment data runs from here to the end of the file.
    pub segment_data_offset: usize,
}

impl LoaderLayout {
    pub const V1: LoaderLayout = LoaderLayout {
        version: 1,
        boot_header: RecordLayout::new("boot header", 0, BOOT_HEADER_SIZE),
        segment_header: RecordLayout::new("segment header", BOOT_HEADER_SIZE, SEGMENT_HEADER_SIZE),
        segment_data_offset: BOOT_HEADER_SIZE + SEGMENT_HEADER_SIZE,
    };
}

impl Default for LoaderLayout {
    fn default() -> Self {
        Self::V1
    }
}

/// Segment header (16 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentHeader {
    pub dest_addr: u32,
    pub len: u32,
    pub rsvd: u32,
    /// CRC-32 over the first 12 bytes.
    pub crc32: u32,
}

impl SegmentHeader {
    pub const SIZE: usize = SEGMENT_HEADER_SIZE;

    pub fn new(dest_addr: u32, len: u32) -> Self {
        let mut hdr = Self {
            dest_addr,
            len,
            rsvd: 0,
            crc32: 0,
        };
        hdr.crc32 = hdr.computed_crc();
        hdr
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, ImageError> {
        if data.len() < Self::SIZE {
            return Err(ImageError::Truncated {
                record: "segment header",
                offset: 0,
                needed: Self::SIZE,
                actual: data.len(),
            });
        }
        let mut cursor = Cursor::new(data);
        Ok(Self {
            dest_addr: cursor.read_u32::<LittleEndian>()?,
            len: cursor.read_u32::<LittleEndian>()?,
            rsvd: cursor.read_u32::<LittleEndian>()?,
            crc32: cursor.read_u32::<LittleEndian>()?,
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ImageError> {
        let mut buf = Vec::with_capacity(Self::SIZE);
        buf.write_u32::<LittleEndian>(self.dest_addr)?;
        buf.write_u32::<LittleEndian>(self.len)?;
        buf.write_u32::<LittleEndian>(self.rsvd)?;
        buf.write_u32::<LittleEndian>(self.crc32)?;
        Ok(buf)
    }

    pub fn computed_crc(&self) -> u32 {
        crc32_parts([
            &self.dest_addr.to_le_bytes()[..],
            &self.len.to_le_bytes()[..],
            &self.rsvd.to_le_bytes()[..],
        ])
    }

    pub fn is_crc_valid(&self) -> bool {
        self.computed_crc() == self.crc32
    }
}

/// A secondary-stage loader file split into its records.
#[derive(Debug, Clone)]
pub struct LoaderImage {
    data: Vec<u8>,
    layout: LoaderLayout,
}

impl LoaderImage {
    /// Split `data` according to `layout`. The file must extend past the
    /// segment header.
    pub fn from_bytes(data: Vec<u8>, layout: LoaderLayout) -> Result<Self, ImageError> {
        if data.len() <= layout.segment_data_offset {
            return Err(ImageError::LoaderTooSmall {
                actual: data.len(),
                minimum: layout.segment_data_offset,
            });
        }
        layout.boot_header.extract(&data)?;
        layout.segment_header.extract(&data)?;
        Ok(Self { data, layout })
    }

    pub fn layout(&self) -> &LoaderLayout {
        &self.layout
    }

    pub fn boot_header_bytes(&self) -> &[u8] {
        &self.data[self.layout.boot_header.offset..self.layout.boot_header.end()]
    }

    pub fn segment_header_bytes(&self) -> &[u8] {
        &self.data[self.layout.segment_header.offset..self.layout.segment_header.end()]
    }

    pub fn segment_data(&self) -> &[u8] {
        &self.data[self.layout.segment_data_offset..]
    }

    pub fn boot_header(&self) -> Result<BootHeader, ImageError> {
        BootHeader::from_bytes(self.boot_header_bytes())
    }

    pub fn segment_header(&self) -> Result<SegmentHeader, ImageError> {
        SegmentHeader::from_bytes(self.segment_header_bytes())
    }

    /// Cross-check the records before they go on the wire. Problems are
    /// logged; the boot ROM does the authoritative check.
    pub fn inspect(&self) {
        match self.boot_header() {
            Ok(bh) => {
                debug!(
                    revision = bh.revision,
                    entry = %format!("0x{:08X}", bh.boot_entry),
                    "Loader boot header"
                );
                for problem in bh.problems() {
                    warn!("Loader boot header: {}", problem);
                }
            }
            Err(e) => warn!("Loader boot header unreadable: {}", e),
        }

        match self.segment_header() {
            Ok(sh) => {
                debug!(
                    dest = %format!("0x{:08X}", sh.dest_addr),
                    len = sh.len,
                    "Loader segment header"
                );
                if !sh.is_crc_valid() {
                    warn!(
                        "Segment header CRC mismatch: stored 0x{:08X}, computed 0x{:08X}",
                        sh.crc32,
                        sh.computed_crc()
                    );
                }
                if sh.len as usize != self.segment_data().len() {
                    warn!(
                        "Segment header declares {} bytes, file carries {}",
                        sh.len,
                        self.segment_data().len()
                    );
                }
            }
            Err(e) => warn!("Loader segment header unreadable: {}", e),
        }
    }
}

/// One firmware image to program, resolved from a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    pub address: u32,
    pub data: Vec<u8>,
    /// Where the bytes came from, for logging.
    pub label: String,
}

impl Asset {
    pub fn new(address: u32, data: Vec<u8>, label: impl Into<String>) -> Result<Self, ImageError> {
        if data.is_empty() {
            return Err(ImageError::EmptyAsset { address });
        }
        if u32::try_from(data.len()).is_err() {
            return Err(ImageError::AssetTooLarge {
                address,
                len: data.len(),
            });
        }
        let asset = Self {
            address,
            data,
            label: label.into(),
        };
        asset.end()?;
        Ok(asset)
    }

    pub fn len(&self) -> u32 {
        self.data.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// One past the last byte written. Fails if that lies beyond the 32-bit
    /// address space.
    pub fn end(&self) -> Result<u32, ImageError> {
        u32::try_from(self.data.len())
            .ok()
            .and_then(|len| self.address.checked_add(len))
            .ok_or(ImageError::AddressOverflow {
                address: self.address,
                len: self.data.len(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loader_bytes(payload: &[u8]) -> Vec<u8> {
        let mut data = vec![0u8; BOOT_HEADER_SIZE];
        data[..4].copy_from_slice(b"BFNP");
        let seg = SegmentHeader::new(0x2201_0000, payload.len() as u32);
        data.extend_from_slice(&seg.to_bytes().unwrap());
        data.extend_from_slice(payload);
        data
    }

    #[test]
    fn test_v1_offsets() {
        let v1 = LoaderLayout::V1;
        assert_eq!(v1.boot_header.offset, 0);
        assert_eq!(v1.boot_header.size, 176);
        assert_eq!(v1.segment_header.offset, 176);
        assert_eq!(v1.segment_header.size, 16);
        assert_eq!(v1.segment_data_offset, 192);
    }

    #[test]
    fn test_loader_too_small() {
        let err = LoaderImage::from_bytes(vec![0u8; 192], LoaderLayout::V1).unwrap_err();
        assert!(matches!(err, ImageError::LoaderTooSmall { actual: 192, .. }));
        assert!(LoaderImage::from_bytes(vec![0u8; 193], LoaderLayout::V1).is_ok());
    }

    #[test]
    fn test_loader_regions() {
        let payload: Vec<u8> = (0..300u32).map(|i| i as u8).collect();
        let image = LoaderImage::from_bytes(loader_bytes(&payload), LoaderLayout::V1).unwrap();
        assert_eq!(image.boot_header_bytes().len(), 176);
        assert_eq!(&image.boot_header_bytes()[..4], b"BFNP");
        assert_eq!(image.segment_header_bytes().len(), 16);
        assert_eq!(image.segment_data(), &payload[..]);

        let seg = image.segment_header().unwrap();
        assert_eq!(seg.dest_addr, 0x2201_0000);
        assert_eq!(seg.len, 300);
        assert!(seg.is_crc_valid());
    }

    #[test]
    fn test_segment_header_crc() {
        let mut seg = SegmentHeader::new(0x4200_0000, 0x1234);
        assert!(seg.is_crc_valid());
        seg.len += 1;
        assert!(!seg.is_crc_valid());
    }

    #[test]
    fn test_record_extract_truncated() {
        let rec = RecordLayout::new("thing", 8, 16);
        assert!(rec.extract(&[0u8; 24]).is_ok());
        assert!(matches!(
            rec.extract(&[0u8; 20]),
            Err(ImageError::Truncated { needed: 16, .. })
        ));
    }

    #[test]
    fn test_asset() {
        let asset = Asset::new(0x1000, vec![1, 2, 3], "a.bin").unwrap();
        assert_eq!(asset.len(), 3);
        assert_eq!(asset.end().unwrap(), 0x1003);
        assert!(matches!(
            Asset::new(0x1000, Vec::new(), "empty.bin"),
            Err(ImageError::EmptyAsset { address: 0x1000 })
        ));
    }

    #[test]
    fn test_asset_end_past_address_space() {
        assert!(matches!(
            Asset::new(0xFFFF_FFF0, vec![0; 0x20], "tail.bin"),
            Err(ImageError::AddressOverflow {
                address: 0xFFFF_FFF0,
                len: 0x20
            })
        ));
        assert_eq!(
            Asset::new(0xFFFF_FFF0, vec![0; 0x0F], "fits.bin")
                .unwrap()
                .end()
                .unwrap(),
            0xFFFF_FFFF
        );

        let mut moved = Asset::new(0x1000, vec![0; 0x20], "moved.bin").unwrap();
        moved.address = u32::MAX;
        assert!(moved.end().is_err());
    }
}
