//! CRC-32 (IEEE, reflected 0xEDB88320) as sealed into boot, segment and
//! partition records by the vendor image builders.

/// CRC-32 of `data`.
pub fn crc32(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

/// CRC-32 over several pieces, as if they were one buffer.
pub fn crc32_parts<'a>(parts: impl IntoIterator<Item = &'a [u8]>) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Bit-at-a-time reference, the way the record builders compute it.
    fn crc32_bitwise(data: &[u8]) -> u32 {
        let mut crc = !0u32;
        for &byte in data {
            let mut ch = byte;
            for _ in 0..8 {
                let b = (ch as u32 ^ crc) & 1;
                crc >>= 1;
                if b != 0 {
                    crc ^= 0xEDB8_8320;
                }
                ch >>= 1;
            }
        }
        !crc
    }

    #[test]
    fn test_check_value() {
        assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn test_empty() {
        assert_eq!(crc32(&[]), 0);
    }

    #[test]
    fn test_matches_record_builders() {
        let data: Vec<u8> = (0..512u32).map(|i| (i.wrapping_mul(31) ^ 0x5A) as u8).collect();
        assert_eq!(crc32(&data), crc32_bitwise(&data));
    }

    #[test]
    fn test_parts_match_whole() {
        let data = b"segment header bytes";
        assert_eq!(crc32_parts([&data[..7], &data[7..]]), crc32(data));
    }
}
