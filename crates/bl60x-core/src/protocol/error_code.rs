//! Device error codes reported in `FL` responses.
//!
//! The boot ROM and the eflash loader number their errors the same way but
//! keep separate tables, so lookups are keyed by the session [`Stage`].

use std::fmt;

/// Which program on the device is answering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Stage {
    /// Mask ROM, before the secondary loader runs.
    #[default]
    BootRom,
    /// The eflash loader, after `IMG_RUN` succeeded.
    FlashLoader,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::BootRom => write!(f, "boot-rom"),
            Stage::FlashLoader => write!(f, "flash-loader"),
        }
    }
}

/// Generic failure code, also used when an `FL` record carries no code.
pub const GENERIC_FAIL: u16 = 0xFFFF;

const UNKNOWN: &str = "unknown error code";

const BOOTROM_ERRORS: &[(u16, &str)] = &[
    (0x0000, "BOOTROM_SUCCESS"),
    // flash
    (0x0001, "BOOTROM_FLASH_INIT_ERROR"),
    (0x0002, "BOOTROM_FLASH_ERASE_PARA_ERROR"),
    (0x0003, "BOOTROM_FLASH_ERASE_ERROR"),
    (0x0004, "BOOTROM_FLASH_WRITE_PARA_ERROR"),
    (0x0005, "BOOTROM_FLASH_WRITE_ADDR_ERROR"),
    (0x0006, "BOOTROM_FLASH_WRITE_ERROR"),
    (0x0007, "BOOTROM_FLASH_BOOT_PARA"),
    // cmd
    (0x0101, "BOOTROM_CMD_ID_ERROR"),
    (0x0102, "BOOTROM_CMD_LEN_ERROR"),
    (0x0103, "BOOTROM_CMD_CRC_ERROR"),
    (0x0104, "BOOTROM_CMD_SEQ_ERROR"),
    // image
    (0x0201, "BOOTROM_IMG_BOOTHEADER_LEN_ERROR"),
    (0x0202, "BOOTROM_IMG_BOOTHEADER_NOT_LOAD_ERROR"),
    (0x0203, "BOOTROM_IMG_BOOTHEADER_MAGIC_ERROR"),
    (0x0204, "BOOTROM_IMG_BOOTHEADER_CRC_ERROR"),
    (0x0205, "BOOTROM_IMG_BOOTHEADER_ENCRYPT_NOTFIT"),
    (0x0206, "BOOTROM_IMG_BOOTHEADER_SIGN_NOTFIT"),
    (0x0207, "BOOTROM_IMG_SEGMENT_CNT_ERROR"),
    (0x0208, "BOOTROM_IMG_AES_IV_LEN_ERROR"),
    (0x0209, "BOOTROM_IMG_AES_IV_CRC_ERROR"),
    (0x020A, "BOOTROM_IMG_PK_LEN_ERROR"),
    (0x020B, "BOOTROM_IMG_PK_CRC_ERROR"),
    (0x020C, "BOOTROM_IMG_PK_HASH_ERROR"),
    (0x020D, "BOOTROM_IMG_SIGNATURE_LEN_ERROR"),
    (0x020E, "BOOTROM_IMG_SIGNATURE_CRC_ERROR"),
    (0x020F, "BOOTROM_IMG_SECTIONHEADER_LEN_ERROR"),
    (0x0210, "BOOTROM_IMG_SECTIONHEADER_CRC_ERROR"),
    (0x0211, "BOOTROM_IMG_SECTIONHEADER_DST_ERROR"),
    (0x0212, "BOOTROM_IMG_SECTIONDATA_LEN_ERROR"),
    (0x0213, "BOOTROM_IMG_SECTIONDATA_DEC_ERROR"),
    (0x0214, "BOOTROM_IMG_SECTIONDATA_TLEN_ERROR"),
    (0x0215, "BOOTROM_IMG_SECTIONDATA_CRC_ERROR"),
    (0x0216, "BOOTROM_IMG_HALFBAKED_ERROR"),
    (0x0217, "BOOTROM_IMG_HASH_ERROR"),
    (0x0218, "BOOTROM_IMG_SIGN_PARSE_ERROR"),
    (0x0219, "BOOTROM_IMG_SIGN_ERROR"),
    (0x021A, "BOOTROM_IMG_DEC_ERROR"),
    (0x021B, "BOOTROM_IMG_ALL_INVALID_ERROR"),
    // interface
    (0x0301, "BOOTROM_IF_RATE_LEN_ERROR"),
    (0x0302, "BOOTROM_IF_RATE_PARA_ERROR"),
    (0x0303, "BOOTROM_IF_PASSWORDERROR"),
    (0x0304, "BOOTROM_IF_PASSWORDCLOSE"),
    // misc
    (0xFFFC, "BOOTROM_PLL_ERROR"),
    (0xFFFD, "BOOTROM_INVASION_ERROR"),
    (0xFFFE, "BOOTROM_POLLING"),
    (0xFFFF, "BOOTROM_FAIL"),
];

const FLASH_LOADER_ERRORS: &[(u16, &str)] = &[
    (0x0000, "EFLASH_LOADER_SUCCESS"),
    // flash
    (0x0001, "EFLASH_LOADER_FLASH_INIT_ERROR"),
    (0x0002, "EFLASH_LOADER_FLASH_ERASE_PARA_ERROR"),
    (0x0003, "EFLASH_LOADER_FLASH_ERASE_ERROR"),
    (0x0004, "EFLASH_LOADER_FLASH_WRITE_PARA_ERROR"),
    (0x0005, "EFLASH_LOADER_FLASH_WRITE_ADDR_ERROR"),
    (0x0006, "EFLASH_LOADER_FLASH_WRITE_ERROR"),
    (0x0007, "EFLASH_LOADER_FLASH_BOOT_PARA_ERROR"),
    (0x0008, "EFLASH_LOADER_FLASH_SET_PARA_ERROR"),
    (0x0009, "EFLASH_LOADER_FLASH_READ_STATUS_REG_ERROR"),
    (0x000A, "EFLASH_LOADER_FLASH_WRITE_STATUS_REG_ERROR"),
    // cmd
    (0x0101, "EFLASH_LOADER_CMD_ID_ERROR"),
    (0x0102, "EFLASH_LOADER_CMD_LEN_ERROR"),
    (0x0103, "EFLASH_LOADER_CMD_CRC_ERROR"),
    (0x0104, "EFLASH_LOADER_CMD_SEQ_ERROR"),
    // image
    (0x0201, "EFLASH_LOADER_IMG_BOOTHEADER_LEN_ERROR"),
    (0x0202, "EFLASH_LOADER_IMG_BOOTHEADER_NOT_LOAD_ERROR"),
    (0x0203, "EFLASH_LOADER_IMG_BOOTHEADER_MAGIC_ERROR"),
    (0x0204, "EFLASH_LOADER_IMG_BOOTHEADER_CRC_ERROR"),
    (0x0205, "EFLASH_LOADER_IMG_BOOTHEADER_ENCRYPT_NOTFIT"),
    (0x0206, "EFLASH_LOADER_IMG_BOOTHEADER_SIGN_NOTFIT"),
    (0x0207, "EFLASH_LOADER_IMG_SEGMENT_CNT_ERROR"),
    (0x0208, "EFLASH_LOADER_IMG_AES_IV_LEN_ERROR"),
    (0x0209, "EFLASH_LOADER_IMG_AES_IV_CRC_ERROR"),
    (0x020A, "EFLASH_LOADER_IMG_PK_LEN_ERROR"),
    (0x020B, "EFLASH_LOADER_IMG_PK_CRC_ERROR"),
    (0x020C, "EFLASH_LOADER_IMG_PK_HASH_ERROR"),
    (0x020D, "EFLASH_LOADER_IMG_SIGNATURE_LEN_ERROR"),
    (0x020E, "EFLASH_LOADER_IMG_SIGNATURE_CRC_ERROR"),
    (0x020F, "EFLASH_LOADER_IMG_SECTIONHEADER_LEN_ERROR"),
    (0x0210, "EFLASH_LOADER_IMG_SECTIONHEADER_CRC_ERROR"),
    (0x0211, "EFLASH_LOADER_IMG_SECTIONHEADER_DST_ERROR"),
    (0x0212, "EFLASH_LOADER_IMG_SECTIONDATA_LEN_ERROR"),
    (0x0213, "EFLASH_LOADER_IMG_SECTIONDATA_DEC_ERROR"),
    (0x0214, "EFLASH_LOADER_IMG_SECTIONDATA_TLEN_ERROR"),
    (0x0215, "EFLASH_LOADER_IMG_SECTIONDATA_CRC_ERROR"),
    (0x0216, "EFLASH_LOADER_IMG_HALFBAKED_ERROR"),
    (0x0217, "EFLASH_LOADER_IMG_HASH_ERROR"),
    (0x0218, "EFLASH_LOADER_IMG_SIGN_PARSE_ERROR"),
    (0x0219, "EFLASH_LOADER_IMG_SIGN_ERROR"),
    (0x021A, "EFLASH_LOADER_IMG_DEC_ERROR"),
    (0x021B, "EFLASH_LOADER_IMG_ALL_INVALID_ERROR"),
    // interface
    (0x0301, "EFLASH_LOADER_IF_RATE_LEN_ERROR"),
    (0x0302, "EFLASH_LOADER_IF_RATE_PARA_ERROR"),
    (0x0303, "EFLASH_LOADER_IF_PASSWORDERROR"),
    (0x0304, "EFLASH_LOADER_IF_PASSWORDCLOSE"),
    // misc
    (0xFFFC, "EFLASH_LOADER_PLL_ERROR"),
    (0xFFFD, "EFLASH_LOADER_INVASION_ERROR"),
    (0xFFFE, "EFLASH_LOADER_POLLING"),
    (0xFFFF, "EFLASH_LOADER_FAIL"),
];

/// Human-readable name of `code` in the table for `stage`.
///
/// Unmapped codes yield a generic string rather than an error.
pub fn describe(stage: Stage, code: u16) -> &'static str {
    let table = match stage {
        Stage::BootRom => BOOTROM_ERRORS,
        Stage::FlashLoader => FLASH_LOADER_ERRORS,
    };
    table
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, name)| *name)
        .unwrap_or(UNKNOWN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_selects_table() {
        assert_eq!(describe(Stage::BootRom, 0x0103), "BOOTROM_CMD_CRC_ERROR");
        assert_eq!(
            describe(Stage::FlashLoader, 0x0103),
            "EFLASH_LOADER_CMD_CRC_ERROR"
        );
    }

    #[test]
    fn test_loader_only_codes() {
        assert_eq!(
            describe(Stage::FlashLoader, 0x0009),
            "EFLASH_LOADER_FLASH_READ_STATUS_REG_ERROR"
        );
        assert_eq!(describe(Stage::BootRom, 0x0009), UNKNOWN);
    }

    #[test]
    fn test_unknown_code() {
        assert_eq!(describe(Stage::BootRom, 0x0BAD), "unknown error code");
    }

    #[test]
    fn test_generic_fail() {
        assert_eq!(describe(Stage::BootRom, GENERIC_FAIL), "BOOTROM_FAIL");
    }
}
