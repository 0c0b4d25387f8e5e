//! Flash loader stage: erase, program and verify each asset.

use tracing::{info, warn};

use crate::error::FlashError;
use crate::events::{FlashEvent, FlashObserver, FlashPhase, LogLevel};
use crate::image::Asset;
use crate::integrity::digest;
use crate::protocol::{Command, Packet};
use crate::session::DigestPolicy;
use crate::state::machine::AssetOutcome;
use crate::transfer::{self, FrameKind};
use crate::transport::SerialTransport;

use super::HandlerContext;

pub fn flash_assets<T: SerialTransport + ?Sized, O: FlashObserver + ?Sized>(
    ctx: &mut HandlerContext<'_, T, O>,
) -> Result<(), FlashError> {
    let inputs = ctx.inputs;
    for (i, asset) in inputs.assets.iter().enumerate() {
        info!(
            index = i + 1,
            total = inputs.assets.len(),
            asset = %asset.label,
            "Flashing asset"
        );
        flash_asset(ctx, asset)?;
    }
    Ok(())
}

fn flash_asset<T: SerialTransport + ?Sized, O: FlashObserver + ?Sized>(
    ctx: &mut HandlerContext<'_, T, O>,
    asset: &Asset,
) -> Result<(), FlashError> {
    let expected = digest(&asset.data);
    info!(
        address = %format!("0x{:08X}", asset.address),
        len = asset.len(),
        sha256 = %expected,
        "Programming"
    );

    let end = asset.end()?;
    ctx.request_ack(&Packet::erase(asset.address, end))?;
    ctx.log(
        LogLevel::Info,
        format!("Erased 0x{:08X}..0x{:08X}", asset.address, end),
    );

    let frame_size = ctx.config.flash_frame_size;
    transfer::send(ctx, FrameKind::FlashData, &asset.data, asset.address, frame_size)?;
    ctx.request_ack(&Packet::empty(Command::ProgramOk))?;

    let actual = ctx.request_digest(&Packet::sha256(asset.address, asset.len()))?;
    let outcome = AssetOutcome {
        address: asset.address,
        len: asset.len(),
        expected,
        actual,
    };

    if outcome.verified() {
        info!(address = %format!("0x{:08X}", asset.address), "Digest verified");
        ctx.emit(FlashEvent::Progress {
            phase: FlashPhase::Flashing,
            operation: format!("{} verified", asset.label),
            current: asset.len() as u64,
            total: asset.len() as u64,
        });
        ctx.state.outcomes.push(outcome);
        return Ok(());
    }

    ctx.emit(FlashEvent::DigestMismatch {
        address: asset.address,
        expected,
        actual,
    });
    ctx.state.outcomes.push(outcome);
    match ctx.config.digest_policy {
        DigestPolicy::Strict => Err(FlashError::IntegrityMismatch {
            address: asset.address,
            len: asset.len(),
            expected,
            actual,
        }),
        DigestPolicy::Lenient => {
            warn!(
                words = ?expected.mismatched_words(&actual),
                "Digest mismatch ignored"
            );
            Ok(())
        }
    }
}
