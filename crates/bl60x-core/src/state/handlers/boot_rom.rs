//! Boot ROM stage: boot info and eflash loader bring-up.

use tracing::{debug, info, warn};

use crate::error::FlashError;
use crate::events::{FlashObserver, LogLevel};
use crate::protocol::{Command, Packet, Response, SEG_DATA_MAX_FRAME, Stage};
use crate::state::machine::BranchFlags;
use crate::transfer::{self, Exchange, FrameKind};
use crate::transport::SerialTransport;

use super::HandlerContext;

/// BOOT_INFO - read ROM version and security options.
pub fn fetch_boot_info<T: SerialTransport + ?Sized, O: FlashObserver + ?Sized>(
    ctx: &mut HandlerContext<'_, T, O>,
) -> Result<(), FlashError> {
    let command = Command::BootInfo;
    let info = match ctx.exchange(&Packet::empty(command))? {
        Response::BootInfo(info) => info,
        other => {
            return Err(FlashError::UnexpectedResponse {
                command,
                response: other,
            });
        }
    };

    let security = info.security_flags();
    info!(
        rom_version = %format!("0x{:08X}", info.boot_rom_version),
        opt_info = ?info.opt_info,
        "Boot info"
    );

    ctx.state.flags = if ctx.config.decode_security_flags {
        BranchFlags::from(security)
    } else {
        debug!("Security flag decoding disabled, treating device as plain");
        BranchFlags::default()
    };
    ctx.state.boot_info = Some(info);

    ctx.log(
        LogLevel::Info,
        format!(
            "Boot ROM 0x{:08X}: signed={} encrypted={}",
            info.boot_rom_version, ctx.state.flags.signed, ctx.state.flags.encrypted
        ),
    );
    Ok(())
}

/// BOOT_HDR - send the loader's boot header verbatim.
pub fn load_boot_header<T: SerialTransport + ?Sized, O: FlashObserver + ?Sized>(
    ctx: &mut HandlerContext<'_, T, O>,
) -> Result<(), FlashError> {
    let inputs = ctx.inputs;
    let record = inputs.loader.boot_header_bytes();
    ctx.request_ack(&Packet::boot_header(record))
}

/// PUB_KEY - no key material is supplied, so nothing goes on the wire.
pub fn load_public_key<T: SerialTransport + ?Sized, O: FlashObserver + ?Sized>(
    ctx: &mut HandlerContext<'_, T, O>,
) -> Result<(), FlashError> {
    warn!("Device expects a signed loader; no public key supplied");
    ctx.log(LogLevel::Warn, "Skipping public key upload");
    Ok(())
}

/// SIGNATURE - placeholder, see [`load_public_key`].
pub fn load_signature<T: SerialTransport + ?Sized, O: FlashObserver + ?Sized>(
    ctx: &mut HandlerContext<'_, T, O>,
) -> Result<(), FlashError> {
    ctx.log(LogLevel::Warn, "Skipping signature upload");
    Ok(())
}

/// AES_IV - placeholder, no IV is supplied.
pub fn load_aes_iv<T: SerialTransport + ?Sized, O: FlashObserver + ?Sized>(
    ctx: &mut HandlerContext<'_, T, O>,
) -> Result<(), FlashError> {
    warn!("Device expects an encrypted loader; no AES IV supplied");
    ctx.log(LogLevel::Warn, "Skipping AES IV upload");
    Ok(())
}

/// SEG_HDR
pub fn load_segment_header<T: SerialTransport + ?Sized, O: FlashObserver + ?Sized>(
    ctx: &mut HandlerContext<'_, T, O>,
) -> Result<(), FlashError> {
    let inputs = ctx.inputs;
    let record = inputs.loader.segment_header_bytes();
    ctx.request_ack(&Packet::segment_header(record))
}

/// SEG_DATA - stream the loader body into RAM.
pub fn load_segment_data<T: SerialTransport + ?Sized, O: FlashObserver + ?Sized>(
    ctx: &mut HandlerContext<'_, T, O>,
) -> Result<(), FlashError> {
    let inputs = ctx.inputs;
    let loader = &inputs.loader;
    let data = loader.segment_data();
    let base = loader
        .segment_header()
        .map(|h| h.dest_addr)
        .unwrap_or_default();

    info!(bytes = data.len(), dest = %format!("0x{:08X}", base), "Loading loader segment");
    let frames = transfer::send(ctx, FrameKind::SegmentData, data, base, SEG_DATA_MAX_FRAME)?;
    debug!(frames, "Loader segment loaded");
    Ok(())
}

/// IMG_CHECK
pub fn check_image<T: SerialTransport + ?Sized, O: FlashObserver + ?Sized>(
    ctx: &mut HandlerContext<'_, T, O>,
) -> Result<(), FlashError> {
    ctx.request_ack(&Packet::empty(Command::ImgCheck))
}

/// IMG_RUN - once acknowledged, the eflash loader owns the link.
pub fn run_image<T: SerialTransport + ?Sized, O: FlashObserver + ?Sized>(
    ctx: &mut HandlerContext<'_, T, O>,
) -> Result<(), FlashError> {
    ctx.request_ack(&Packet::empty(Command::ImgRun))?;
    ctx.state.stage = Stage::FlashLoader;
    info!("Eflash loader running");
    Ok(())
}
