//! Transition handlers - the work done to enter each state.
//!
//! This module is split into submodules by functionality:
//! - `handshake`: synchronization bursts
//! - `boot_rom`: boot-info and loader bring-up against the boot ROM
//! - `flash`: erase/program/verify against the eflash loader

mod boot_rom;
mod flash;
mod handshake;

use tracing::{debug, trace};

use crate::error::FlashError;
use crate::events::{FlashEvent, FlashObserver, LogLevel};
use crate::protocol::{
    BOOT_INFO_SIZE, Command, Packet, RESPONSE_SIZE, STATUS_FAIL, Response, decode_response,
};
use crate::session::{SessionConfig, SessionInputs};
use crate::state::machine::{SessionState, StateMachineContext};
use crate::transfer::{Exchange, Frame, FrameKind};
use crate::transport::{SerialTransport, TransportError};
use crate::integrity::Digest;

use handshake::synchronize;

/// Length of the `OK` / `FL` tag that opens every response.
pub(crate) const STATUS_LEN: usize = STATUS_FAIL.len();

/// Handler context containing all resources.
pub struct HandlerContext<'a, T: SerialTransport + ?Sized, O: FlashObserver + ?Sized> {
    pub transport: &'a T,
    pub observer: &'a O,
    pub state: &'a mut StateMachineContext,
    pub config: &'a SessionConfig,
    pub inputs: &'a SessionInputs,
}

impl<'a, T: SerialTransport + ?Sized, O: FlashObserver + ?Sized> HandlerContext<'a, T, O> {
    pub(crate) fn emit(&self, event: FlashEvent) {
        self.observer.on_event(&event);
    }

    pub(crate) fn log(&self, level: LogLevel, message: impl Into<String>) {
        self.emit(FlashEvent::Log {
            level,
            message: message.into(),
        });
    }

    /// Send a request that must be answered with a plain `OK`.
    pub(crate) fn request_ack(&mut self, packet: &Packet) -> Result<(), FlashError> {
        match self.exchange(packet)? {
            Response::Ack => Ok(()),
            other => Err(FlashError::UnexpectedResponse {
                command: packet.command(),
                response: other,
            }),
        }
    }

    /// Send a request that must be answered with a digest.
    pub(crate) fn request_digest(&mut self, packet: &Packet) -> Result<Digest, FlashError> {
        match self.exchange(packet)? {
            Response::Digest(d) => Ok(d),
            other => Err(FlashError::UnexpectedResponse {
                command: packet.command(),
                response: other,
            }),
        }
    }

    /// Poll until at least `want` bytes sit in `buf` (which already holds
    /// `got`). Zero reads back off; the whole wait is bounded by `max_polls`.
    /// Running out of polls with a partial record hands back what arrived.
    pub(crate) fn poll_for(
        &self,
        buf: &mut [u8],
        mut got: usize,
        want: usize,
    ) -> Result<usize, FlashError> {
        let timing = &self.config.timing;
        let mut polls = 0;

        while got < want {
            if polls >= timing.max_polls {
                if got == 0 {
                    return Err(TransportError::Timeout { polls }.into());
                }
                debug!(got, want, "Gave up waiting for the rest of a record");
                break;
            }
            polls += 1;
            timing.settle();
            let n = self.transport.read(&mut buf[got..])?;
            if n == 0 {
                trace!(polls, got, "No response yet");
                timing.backoff();
            }
            got += n;
        }
        Ok(got)
    }

    /// Wait for the status tag, then collect the rest of the record the
    /// command is known to produce.
    fn read_response(&self, command: Command) -> Result<Vec<u8>, FlashError> {
        let mut buf = [0u8; RESPONSE_SIZE];
        let mut got = self.poll_for(&mut buf, 0, STATUS_LEN)?;

        let expected = expected_response_len(command, &buf[..got]);
        while got < expected {
            let n = self.transport.read(&mut buf[got..expected])?;
            if n == 0 {
                break;
            }
            got += n;
        }
        Ok(buf[..got].to_vec())
    }
}

/// Bytes a complete response to `command` occupies, judged from its head.
fn expected_response_len(command: Command, head: &[u8]) -> usize {
    if head.starts_with(&STATUS_FAIL) {
        return 4;
    }
    match command {
        Command::BootInfo => 4 + BOOT_INFO_SIZE,
        Command::Sha256 => 4 + Digest::LEN,
        _ => 2,
    }
}

impl<T: SerialTransport + ?Sized, O: FlashObserver + ?Sized> Exchange for HandlerContext<'_, T, O> {
    fn exchange(&mut self, packet: &Packet) -> Result<Response, FlashError> {
        let command = packet.command();
        let record = packet.encode()?;
        debug!(%command, len = record.len(), "Sending request");
        self.transport.write_all(&record)?;

        let raw = self.read_response(command)?;
        Ok(decode_response(command, self.state.stage, &raw)?)
    }

    fn frame_sent(&mut self, kind: FrameKind, frame: &Frame, total: usize) {
        let (phase, operation) = match kind {
            FrameKind::SegmentData => (crate::events::FlashPhase::LoaderBringUp, "Loader segment"),
            FrameKind::FlashData => (crate::events::FlashPhase::Flashing, "Flash data"),
        };
        self.emit(FlashEvent::Progress {
            phase,
            operation: format!("{} @ 0x{:08X}", operation, frame.address),
            current: (frame.offset + frame.len) as u64,
            total: total as u64,
        });
    }
}

/// Perform the work needed to enter `target`.
pub fn handle_transition<T: SerialTransport + ?Sized, O: FlashObserver + ?Sized>(
    target: SessionState,
    ctx: &mut HandlerContext<'_, T, O>,
) -> Result<(), FlashError> {
    use SessionState::*;
    match target {
        Disconnected => Ok(()),
        Synchronized => synchronize(ctx),
        InfoFetched => boot_rom::fetch_boot_info(ctx),
        LoaderHeaderLoaded => boot_rom::load_boot_header(ctx),
        PubKeyLoaded => boot_rom::load_public_key(ctx),
        SignatureLoaded => boot_rom::load_signature(ctx),
        AesIvLoaded => boot_rom::load_aes_iv(ctx),
        SegmentHeaderLoaded => boot_rom::load_segment_header(ctx),
        SegmentDataLoaded => boot_rom::load_segment_data(ctx),
        ImageChecked => boot_rom::check_image(ctx),
        ImageRunning => boot_rom::run_image(ctx),
        PostRunHandshake => synchronize(ctx),
        FlashingLoop => flash::flash_assets(ctx),
        SessionFinished => {
            ctx.emit(FlashEvent::Complete);
            Ok(())
        }
    }
}
