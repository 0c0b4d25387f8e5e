//! Mock serial transport for testing.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use super::traits::{SerialTransport, TransportError};
use crate::integrity::Digest;
use crate::protocol::BOOT_INFO_SIZE;

/// Mock transport for unit testing the session logic.
///
/// Clones share state, so a test can keep one handle while the session owns
/// another.
#[derive(Clone)]
pub struct MockTransport {
    /// Scripted chunks returned on read. An empty chunk reads as zero bytes.
    read_queue: Arc<Mutex<VecDeque<Vec<u8>>>>,
    /// Captured writes.
    write_log: Arc<Mutex<Vec<Vec<u8>>>>,
    close_count: Arc<Mutex<usize>>,
    baud_rate: u32,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::with_baud(crate::protocol::DEFAULT_BAUD_RATE)
    }

    pub fn with_baud(baud_rate: u32) -> Self {
        Self {
            read_queue: Arc::new(Mutex::new(VecDeque::new())),
            write_log: Arc::new(Mutex::new(Vec::new())),
            close_count: Arc::new(Mutex::new(0)),
            baud_rate,
        }
    }

    /// Queue raw bytes to be returned on a later read.
    pub fn queue_bytes(&self, bytes: &[u8]) {
        self.read_queue.lock().unwrap().push_back(bytes.to_vec());
    }

    /// Queue a read that returns nothing.
    pub fn queue_silence(&self) {
        self.queue_bytes(&[]);
    }

    pub fn queue_ok(&self) {
        self.queue_bytes(b"OK");
    }

    /// Queue an `FL` response carrying `code`.
    pub fn queue_fail(&self, code: u16) {
        let mut bytes = b"FL".to_vec();
        bytes.extend_from_slice(&code.to_le_bytes());
        self.queue_bytes(&bytes);
    }

    /// Queue a boot-info response with the given ROM version and first
    /// option byte.
    pub fn queue_boot_info(&self, boot_rom_version: u32, opt0: u8) {
        self.queue_boot_info_with_len(BOOT_INFO_SIZE as u16, boot_rom_version, opt0);
    }

    /// Boot-info response with an arbitrary declared length.
    pub fn queue_boot_info_with_len(&self, declared: u16, boot_rom_version: u32, opt0: u8) {
        let mut bytes = b"OK".to_vec();
        bytes.extend_from_slice(&declared.to_le_bytes());
        bytes.extend_from_slice(&boot_rom_version.to_le_bytes());
        let mut opt_info = [0u8; 16];
        opt_info[0] = opt0;
        bytes.extend_from_slice(&opt_info);
        self.queue_bytes(&bytes);
    }

    /// Queue a SHA-256 response reporting `digest`.
    pub fn queue_digest(&self, digest: &Digest) {
        let mut bytes = b"OK".to_vec();
        bytes.extend_from_slice(&(Digest::LEN as u16).to_le_bytes());
        bytes.extend_from_slice(&digest.to_bytes());
        self.queue_bytes(&bytes);
    }

    /// Number of scripted reads still pending.
    pub fn pending_reads(&self) -> usize {
        self.read_queue.lock().unwrap().len()
    }

    /// Get all captured writes.
    pub fn get_writes(&self) -> Vec<Vec<u8>> {
        self.write_log.lock().unwrap().clone()
    }

    pub fn close_count(&self) -> usize {
        *self.close_count.lock().unwrap()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl SerialTransport for MockTransport {
    fn write(&self, data: &[u8]) -> Result<usize, TransportError> {
        if self.close_count() > 0 {
            return Err(TransportError::Closed);
        }
        self.write_log.lock().unwrap().push(data.to_vec());
        Ok(data.len())
    }

    fn read(&self, buf: &mut [u8]) -> Result<usize, TransportError> {
        if self.close_count() > 0 {
            return Err(TransportError::Closed);
        }
        let mut queue = self.read_queue.lock().unwrap();
        let Some(mut chunk) = queue.pop_front() else {
            return Ok(0);
        };
        let n = chunk.len().min(buf.len());
        buf[..n].copy_from_slice(&chunk[..n]);
        if n < chunk.len() {
            queue.push_front(chunk.split_off(n));
        }
        Ok(n)
    }

    fn close(&self) -> Result<(), TransportError> {
        *self.close_count.lock().unwrap() += 1;
        Ok(())
    }

    fn name(&self) -> &str {
        "mock"
    }

    fn baud_rate(&self) -> u32 {
        self.baud_rate
    }
}
