//! Synchronization burst.

use tracing::{debug, info};

use crate::error::FlashError;
use crate::events::FlashObserver;
use crate::protocol::{
    GENERIC_FAIL, HANDSHAKE_READ_SIZE, ProtocolError, Status, SYNC_BYTE, classify_response,
    describe, sync_burst_len,
};
use crate::transport::SerialTransport;

use super::{HandlerContext, STATUS_LEN};

/// Send a burst of `0x55` so the device can lock onto the baud rate, then
/// poll until a whole status tag has arrived.
pub(crate) fn synchronize<T: SerialTransport + ?Sized, O: FlashObserver + ?Sized>(
    ctx: &mut HandlerContext<'_, T, O>,
) -> Result<(), FlashError> {
    let timing = ctx.config.timing;
    let burst = vec![SYNC_BYTE; sync_burst_len(ctx.transport.baud_rate())];
    debug!(len = burst.len(), "Sending sync burst");
    ctx.transport.write_all(&burst)?;

    let mut buf = [0u8; HANDSHAKE_READ_SIZE];
    let mut got = ctx.poll_for(&mut buf, 0, STATUS_LEN)?;

    match classify_response(&buf[..got]) {
        Status::Ok => {
            info!(stage = %ctx.state.stage, "Handshake succeeded");
            timing.post_handshake();
            Ok(())
        }
        Status::Fail(_) => {
            // The code may trail the tag in a later read.
            if got < STATUS_LEN + 2 {
                let n = ctx.transport.read(&mut buf[got..STATUS_LEN + 2])?;
                got += n;
            }
            let code = match classify_response(&buf[..got]) {
                Status::Fail(code) => code,
                _ => GENERIC_FAIL,
            };
            Err(ProtocolError::HandshakeRejected {
                code,
                message: describe(ctx.state.stage, code),
            }
            .into())
        }
        Status::Malformed => Err(ProtocolError::HandshakeMalformed {
            bytes: buf[..got.min(16)].to_vec(),
        }
        .into()),
    }
}
