//! Additive packet checksum.
//!
//! A mod-256 running sum stored in the reserved header byte of the commands
//! that carry one. It only catches gross transport corruption.

/// Sum every byte of `data`, wrapping at 256.
pub fn additive_checksum(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}
