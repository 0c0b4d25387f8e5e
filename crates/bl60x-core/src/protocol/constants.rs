//! Protocol constants for the BL60x boot-ROM / eflash-loader ISP protocol.

// ============================================================================
// Serial Link
// ============================================================================

/// Baud rates the serial backend accepts.
pub const SUPPORTED_BAUD_RATES: &[u32] = &[9_600, 19_200, 38_400, 57_600, 115_200, 230_400];

/// Default link speed.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Idle byte streamed so the autobaud detector can lock on.
pub const SYNC_BYTE: u8 = 0x55;

/// Number of sync bytes to send at `baud_rate` under 8-N-1.
///
/// `7 * baud / 10000` bytes, which is 5-7 ms of line time across the
/// supported rates.
pub const fn sync_burst_len(baud_rate: u32) -> usize {
    (7 * baud_rate as u64 / 10_000) as usize
}

// ============================================================================
// Framing
// ============================================================================

/// Packet header: command id, reserved/checksum byte, LE u16 length.
pub const HEADER_SIZE: usize = 4;

/// Largest payload the 16-bit length field can describe.
pub const MAX_PAYLOAD_LEN: usize = u16::MAX as usize;

/// Response buffer size: tag (2) + length (2) + digest (32).
pub const RESPONSE_SIZE: usize = 36;

/// Read buffer used while waiting for the handshake tag.
pub const HANDSHAKE_READ_SIZE: usize = 256;

/// Status tag of a successful response.
pub const STATUS_OK: [u8; 2] = *b"OK";
/// Status tag of a failed response.
pub const STATUS_FAIL: [u8; 2] = *b"FL";

/// Offset of the reserved byte holding the additive checksum.
pub const CHECKSUM_OFFSET: usize = 1;
/// The additive checksum runs from the length field to the end of the record.
pub const CHECKSUM_START: usize = 2;

// ============================================================================
// Frame Ceilings
// ============================================================================

/// Maximum data bytes in one loader segment-data frame.
pub const SEG_DATA_MAX_FRAME: usize = 2 * 1024;

/// Maximum data bytes in one flash-data frame (address not included).
pub const FLASH_DATA_MAX_FRAME: usize = 8 * 1024;

// ============================================================================
// Record Sizes
// ============================================================================

/// Boot-info record: ROM version (4) + option blob (16).
pub const BOOT_INFO_SIZE: usize = 20;

/// Boot header record carried by the loader image.
pub const BOOT_HEADER_SIZE: usize = 176;

/// Segment header record: dest, len, rsvd, crc32.
pub const SEGMENT_HEADER_SIZE: usize = 16;

// ============================================================================
// Timing (milliseconds)
// ============================================================================

/// Delay between a write and the read of its response.
pub const SETTLE_DELAY_MS: u64 = 100;

/// Backoff after a zero-length read.
pub const RETRY_BACKOFF_MS: u64 = 20;

/// Pause after a successful handshake before the first command.
pub const POST_HANDSHAKE_DELAY_MS: u64 = 10;

/// Zero-length reads tolerated before giving up on a response.
pub const MAX_POLLS: u32 = 100;

// ============================================================================
// Partition Table
// ============================================================================

/// Flash address of the primary partition table copy.
pub const PT_TABLE0_ADDRESS: u32 = 0xE000;
/// Flash address of the backup partition table copy.
pub const PT_TABLE1_ADDRESS: u32 = 0xF000;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_burst_len() {
        assert_eq!(sync_burst_len(115_200), 80);
        assert_eq!(sync_burst_len(9_600), 6);
        assert_eq!(sync_burst_len(230_400), 161);
    }
}
