//! `serialport`-backed transport.

use std::io::{ErrorKind, Read, Write};
use std::sync::Mutex;
use std::time::Duration;

use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use tracing::{debug, info};

use super::traits::{SerialTransport, TransportError};
use crate::protocol::SUPPORTED_BAUD_RATES;

/// Port read timeout. Reads that hit it come back as zero bytes.
const READ_TIMEOUT: Duration = Duration::from_millis(50);

/// Production transport over an OS serial port, 8-N-1, no flow control.
pub struct SerialPortTransport {
    port: Mutex<Option<Box<dyn SerialPort>>>,
    path: String,
    baud_rate: u32,
}

impl SerialPortTransport {
    /// Open `path` at `baud_rate`.
    ///
    /// Only the rates in [`SUPPORTED_BAUD_RATES`] are accepted; anything else
    /// fails before the port is touched.
    pub fn open(path: &str, baud_rate: u32) -> Result<Self, TransportError> {
        if !SUPPORTED_BAUD_RATES.contains(&baud_rate) {
            return Err(TransportError::UnsupportedBaudRate(baud_rate));
        }

        info!(path, baud_rate, "Opening serial port");
        let port = serialport::new(path, baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(READ_TIMEOUT)
            .open()
            .map_err(|e| TransportError::OpenFailed {
                path: path.to_string(),
                message: e.to_string(),
            })?;

        Ok(Self {
            port: Mutex::new(Some(port)),
            path: path.to_string(),
            baud_rate,
        })
    }

    fn with_port<T>(
        &self,
        f: impl FnOnce(&mut Box<dyn SerialPort>) -> Result<T, TransportError>,
    ) -> Result<T, TransportError> {
        let mut guard = self
            .port
            .lock()
            .map_err(|_| TransportError::ReadFailed("port lock poisoned".into()))?;
        match guard.as_mut() {
            Some(port) => f(port),
            None => Err(TransportError::Closed),
        }
    }
}

impl SerialTransport for SerialPortTransport {
    fn write(&self, data: &[u8]) -> Result<usize, TransportError> {
        self.with_port(|port| {
            port.write_all(data)
                .map_err(|e| TransportError::WriteFailed(e.to_string()))?;
            port.flush()
                .map_err(|e| TransportError::WriteFailed(e.to_string()))?;
            Ok(data.len())
        })
    }

    fn read(&self, buf: &mut [u8]) -> Result<usize, TransportError> {
        self.with_port(|port| match port.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(TransportError::ReadFailed(e.to_string())),
        })
    }

    fn close(&self) -> Result<(), TransportError> {
        let mut guard = self
            .port
            .lock()
            .map_err(|_| TransportError::WriteFailed("port lock poisoned".into()))?;
        if guard.take().is_some() {
            debug!(path = %self.path, "Serial port closed");
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.path
    }

    fn baud_rate(&self) -> u32 {
        self.baud_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_unsupported_baud() {
        for baud in [0, 1_200, 2_000_000] {
            match SerialPortTransport::open("/dev/null-port", baud) {
                Err(TransportError::UnsupportedBaudRate(b)) => assert_eq!(b, baud),
                Err(other) => panic!("unexpected error: {other}"),
                Ok(_) => panic!("baud {baud} should be rejected"),
            }
        }
    }
}
