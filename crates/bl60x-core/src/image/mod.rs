//! Image records: loader layout, boot header, segment header, partition table.
//!
//! Everything here is read-only inspection of files produced by the vendor
//! image builders. Records are extracted at fixed offsets described by a
//! versioned [`LoaderLayout`].

pub mod boot_header;
pub mod layout;
pub mod partition;

use thiserror::Error;

pub use boot_header::{BootConfig, BootHeader};
pub use layout::{Asset, LoaderImage, LoaderLayout, RecordLayout, SegmentHeader};
pub use partition::{PartitionEntry, PartitionTable};

#[derive(Error, Debug)]
pub enum ImageError {
    #[error("Loader image too small: {actual} bytes, need more than {minimum}")]
    LoaderTooSmall { actual: usize, minimum: usize },

    #[error("Truncated {record}: need {needed} bytes at offset {offset}, file has {actual}")]
    Truncated {
        record: &'static str,
        offset: usize,
        needed: usize,
        actual: usize,
    },

    #[error("Invalid {record} magic: {found:02X?}")]
    InvalidMagic { record: &'static str, found: [u8; 4] },

    #[error("Partition entry not found: {0}")]
    EntryNotFound(String),

    #[error("Asset at 0x{address:08X} is empty")]
    EmptyAsset { address: u32 },

    #[error("Asset at 0x{address:08X} is too large: {len} bytes")]
    AssetTooLarge { address: u32, len: usize },

    #[error("Asset at 0x{address:08X} ({len} bytes) runs past the end of the address space")]
    AddressOverflow { address: u32, len: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
