//! Serial transport abstraction.
//!
//! Defines the `SerialTransport` trait for byte-stream communication,
//! allowing different implementations (serialport, mock, etc.).

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Unsupported baud rate: {0}")]
    UnsupportedBaudRate(u32),

    #[error("Failed to open {path}: {message}")]
    OpenFailed { path: String, message: String },

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Short write: {written} of {expected} bytes")]
    ShortWrite { written: usize, expected: usize },

    #[error("Port is closed")]
    Closed,

    #[error("No response after {polls} polls")]
    Timeout { polls: u32 },
}

/// Abstract byte transport.
///
/// The link has no message boundaries: a read returns whatever bytes have
/// arrived, and zero bytes when nothing arrived before the port timeout.
pub trait SerialTransport: Send + Sync {
    /// Write raw bytes, returning how many were accepted.
    fn write(&self, data: &[u8]) -> Result<usize, TransportError>;

    /// Read into `buf`. A read timeout is reported as `Ok(0)`.
    fn read(&self, buf: &mut [u8]) -> Result<usize, TransportError>;

    /// Release the underlying port. Further I/O fails with `Closed`.
    fn close(&self) -> Result<(), TransportError>;

    /// Port path or a descriptive name.
    fn name(&self) -> &str;

    fn baud_rate(&self) -> u32;

    /// Write the whole buffer or fail.
    fn write_all(&self, data: &[u8]) -> Result<(), TransportError> {
        let written = self.write(data)?;
        if written != data.len() {
            return Err(TransportError::ShortWrite {
                written,
                expected: data.len(),
            });
        }
        Ok(())
    }
}
