//! Response classification and per-command decoding.
//!
//! Every response starts with a two-byte status tag. What follows depends on
//! the command that was sent, so decoding is keyed by [`Command`] and only
//! happens once the tag says `OK`.

use thiserror::Error;

use super::boot_info::BootInfo;
use super::command::Command;
use super::constants::{BOOT_INFO_SIZE, STATUS_FAIL, STATUS_OK};
use super::error_code::{GENERIC_FAIL, Stage, describe};
use crate::integrity::Digest;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Malformed response to {command}: {bytes:02X?}")]
    Malformed { command: Command, bytes: Vec<u8> },

    #[error("{command} failed on {stage}: [0x{code:04X}] {message}")]
    DeviceReported {
        command: Command,
        stage: Stage,
        code: u16,
        message: &'static str,
    },

    #[error("Payload length mismatch in {command} response: expected {expected}, got {actual}")]
    PayloadLengthMismatch {
        command: Command,
        expected: usize,
        actual: usize,
    },

    #[error("Handshake rejected by device: [0x{code:04X}] {message}")]
    HandshakeRejected { code: u16, message: &'static str },

    #[error("Unrecognized handshake reply: {bytes:02X?}")]
    HandshakeMalformed { bytes: Vec<u8> },

    #[error("Truncated {command} response: expected {expected} bytes, got {actual}")]
    Truncated {
        command: Command,
        expected: usize,
        actual: usize,
    },
}

/// Outcome of inspecting the status tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    Fail(u16),
    Malformed,
}

/// Classify a response by its first two bytes.
pub fn classify_response(record: &[u8]) -> Status {
    if record.len() < 2 {
        return Status::Malformed;
    }
    let tag = [record[0], record[1]];
    if tag == STATUS_OK {
        Status::Ok
    } else if tag == STATUS_FAIL {
        let code = if record.len() >= 4 {
            u16::from_le_bytes([record[2], record[3]])
        } else {
            GENERIC_FAIL
        };
        Status::Fail(code)
    } else {
        Status::Malformed
    }
}

/// Payload of a successful response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Plain acknowledgement.
    Ack,
    BootInfo(BootInfo),
    /// Digest computed by the loader over the requested range.
    Digest(Digest),
}

/// Check the tag, then decode the payload the way `command` defines it.
pub fn decode_response(
    command: Command,
    stage: Stage,
    record: &[u8],
) -> Result<Response, ProtocolError> {
    match classify_response(record) {
        Status::Ok => {}
        Status::Fail(code) => {
            return Err(ProtocolError::DeviceReported {
                command,
                stage,
                code,
                message: describe(stage, code),
            });
        }
        Status::Malformed => {
            return Err(ProtocolError::Malformed {
                command,
                bytes: record.iter().take(8).copied().collect(),
            });
        }
    }

    match command {
        Command::BootInfo => {
            let declared = declared_len(command, record)?;
            if declared != BOOT_INFO_SIZE {
                return Err(ProtocolError::PayloadLengthMismatch {
                    command,
                    expected: BOOT_INFO_SIZE,
                    actual: declared,
                });
            }
            let body = payload(command, record, BOOT_INFO_SIZE)?;
            let info = BootInfo::from_bytes(body).map_err(|_| ProtocolError::Truncated {
                command,
                expected: 4 + BOOT_INFO_SIZE,
                actual: record.len(),
            })?;
            Ok(Response::BootInfo(info))
        }
        Command::Sha256 => {
            let body = payload(command, record, Digest::LEN)?;
            let mut bytes = [0u8; Digest::LEN];
            bytes.copy_from_slice(body);
            Ok(Response::Digest(Digest::from_device_bytes(&bytes)))
        }
        _ => Ok(Response::Ack),
    }
}

fn declared_len(command: Command, record: &[u8]) -> Result<usize, ProtocolError> {
    if record.len() < 4 {
        return Err(ProtocolError::Truncated {
            command,
            expected: 4,
            actual: record.len(),
        });
    }
    Ok(u16::from_le_bytes([record[2], record[3]]) as usize)
}

fn payload(command: Command, record: &[u8], len: usize) -> Result<&[u8], ProtocolError> {
    record.get(4..4 + len).ok_or(ProtocolError::Truncated {
        command,
        expected: 4 + len,
        actual: record.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrity::digest;

    fn boot_info_record(declared: u16, opt0: u8) -> Vec<u8> {
        let mut record = b"OK".to_vec();
        record.extend_from_slice(&declared.to_le_bytes());
        record.extend_from_slice(&1u32.to_le_bytes());
        let mut opt = [0u8; 16];
        opt[0] = opt0;
        record.extend_from_slice(&opt);
        record
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify_response(b"OK"), Status::Ok);
        assert_eq!(classify_response(b"OK\x00\x00"), Status::Ok);
        assert_eq!(classify_response(b"FL\x03\x01"), Status::Fail(0x0103));
        assert_eq!(classify_response(b"FL"), Status::Fail(GENERIC_FAIL));
        assert_eq!(classify_response(b"OX"), Status::Malformed);
        assert_eq!(classify_response(b"O"), Status::Malformed);
        assert_eq!(classify_response(b""), Status::Malformed);
    }

    #[test]
    fn test_device_reported_uses_stage_table() {
        let err = decode_response(Command::FlashData, Stage::FlashLoader, b"FL\x06\x00")
            .unwrap_err();
        match err {
            ProtocolError::DeviceReported { code, message, .. } => {
                assert_eq!(code, 0x0006);
                assert_eq!(message, "EFLASH_LOADER_FLASH_WRITE_ERROR");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_boot_info_decoding() {
        let record = boot_info_record(20, 0x01);
        let resp = decode_response(Command::BootInfo, Stage::BootRom, &record).unwrap();
        match resp {
            Response::BootInfo(info) => {
                assert_eq!(info.boot_rom_version, 1);
                assert!(info.security_flags().is_signed());
            }
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[test]
    fn test_boot_info_length_mismatch() {
        let record = boot_info_record(24, 0);
        let err = decode_response(Command::BootInfo, Stage::BootRom, &record).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::PayloadLengthMismatch {
                expected: 20,
                actual: 24,
                ..
            }
        ));
    }

    #[test]
    fn test_digest_decoding() {
        let d = digest(b"abc");
        let mut record = b"OK".to_vec();
        record.extend_from_slice(&32u16.to_le_bytes());
        record.extend_from_slice(&d.to_bytes());
        let resp = decode_response(Command::Sha256, Stage::FlashLoader, &record).unwrap();
        assert_eq!(resp, Response::Digest(d));
    }

    #[test]
    fn test_truncated_digest() {
        let err = decode_response(Command::Sha256, Stage::FlashLoader, b"OK\x20\x00\x01")
            .unwrap_err();
        assert!(matches!(err, ProtocolError::Truncated { .. }));
    }

    #[test]
    fn test_plain_ack() {
        assert_eq!(
            decode_response(Command::ImgRun, Stage::BootRom, b"OK").unwrap(),
            Response::Ack
        );
    }
}
