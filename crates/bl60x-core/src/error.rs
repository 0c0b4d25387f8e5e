//! Session-level error type.
//!
//! Each layer keeps its own `thiserror` enum; `FlashError` gathers them so
//! the state machine can propagate with `?`. At the orchestration boundary
//! these travel inside `anyhow::Error` and can be recovered with
//! `downcast_ref::<FlashError>()`.

use std::path::PathBuf;

use thiserror::Error;

use crate::image::ImageError;
use crate::integrity::Digest;
use crate::protocol::{Command, HeaderError, ProtocolError, Response};
use crate::transport::TransportError;

#[derive(Error, Debug)]
pub enum FlashError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Header error: {0}")]
    Header(#[from] HeaderError),

    #[error("Image error: {0}")]
    Image(#[from] ImageError),

    #[error("Failed to read {}: {source}", path.display())]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(
        "Digest mismatch for {len} bytes at 0x{address:08X}: expected {expected}, device reported {actual}"
    )]
    IntegrityMismatch {
        address: u32,
        len: u32,
        expected: Digest,
        actual: Digest,
    },

    #[error("Unexpected response to {command}: {response:?}")]
    UnexpectedResponse { command: Command, response: Response },

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl FlashError {
    pub fn file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::File {
            path: path.into(),
            source,
        }
    }

    /// Device-reported error code, if this error carries one.
    pub fn device_code(&self) -> Option<u16> {
        match self {
            FlashError::Protocol(ProtocolError::DeviceReported { code, .. })
            | FlashError::Protocol(ProtocolError::HandshakeRejected { code, .. }) => Some(*code),
            _ => None,
        }
    }
}

/// Read a whole input file, tagging failures with its path.
pub(crate) fn read_file(path: &std::path::Path) -> Result<Vec<u8>, FlashError> {
    std::fs::read(path).map_err(|e| FlashError::file(path, e))
}
