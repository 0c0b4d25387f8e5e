//! Integrity primitives: whole-image SHA-256, additive packet checksum and
//! the CRC-32 used by the loader and partition records.

pub mod checksum;
pub mod crc32;
pub mod sha256;

pub use checksum::additive_checksum;
pub use crc32::{crc32, crc32_parts};
pub use sha256::{Digest, Sha256, digest};
