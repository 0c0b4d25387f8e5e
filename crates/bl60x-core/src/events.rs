//! Event system for UI decoupling.
//!
//! Allows the CLI (or any other front end) to subscribe to session events
//! without tight coupling to the core logic.

use std::fmt;

use crate::integrity::Digest;
use crate::state::SessionState;

/// Log level for events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// Coarse session phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashPhase {
    /// Opening the port and synchronizing with the boot ROM.
    Handshake,
    /// Pushing the eflash loader into RAM and starting it.
    LoaderBringUp,
    /// Erasing, programming and verifying assets.
    Flashing,
    Complete,
    Error,
}

impl fmt::Display for FlashPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlashPhase::Handshake => write!(f, "Handshake"),
            FlashPhase::LoaderBringUp => write!(f, "Loader Bring-up"),
            FlashPhase::Flashing => write!(f, "Flashing"),
            FlashPhase::Complete => write!(f, "Complete"),
            FlashPhase::Error => write!(f, "Error"),
        }
    }
}

/// Events emitted by the flash session.
#[derive(Debug, Clone)]
pub enum FlashEvent {
    /// Port opened.
    PortOpened { name: String, baud_rate: u32 },
    /// Phase changed.
    PhaseChanged { from: FlashPhase, to: FlashPhase },
    /// A transition finished and the machine entered `state`.
    StateEntered { state: SessionState },
    /// Progress update for current operation.
    Progress {
        phase: FlashPhase,
        operation: String,
        current: u64,
        total: u64,
    },
    /// Log message.
    Log { level: LogLevel, message: String },
    /// Device digest did not match the local one.
    DigestMismatch {
        address: u32,
        expected: Digest,
        actual: Digest,
    },
    /// Error occurred.
    Error { code: Option<u16>, message: String },
    /// Raw bytes sent/received.
    Packet {
        direction: PacketDirection,
        length: usize,
        data: Option<Vec<u8>>,
    },
    /// All operations completed successfully.
    Complete,
}

/// Packet direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketDirection {
    Tx, // Host -> Device
    Rx, // Device -> Host
}

impl fmt::Display for PacketDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacketDirection::Tx => write!(f, "TX"),
            PacketDirection::Rx => write!(f, "RX"),
        }
    }
}

/// Observer trait for receiving flash events.
///
/// Implement this trait in your UI layer to receive updates.
pub trait FlashObserver: Send + Sync {
    /// Called when an event occurs.
    fn on_event(&self, event: &FlashEvent);
}

/// No-op observer that discards all events.
pub struct NullObserver;

impl FlashObserver for NullObserver {
    fn on_event(&self, _event: &FlashEvent) {}
}

/// Observer that logs events using tracing.
pub struct TracingObserver;

impl FlashObserver for TracingObserver {
    fn on_event(&self, event: &FlashEvent) {
        match event {
            FlashEvent::PortOpened { name, baud_rate } => {
                tracing::info!(port = %name, baud = baud_rate, "Port opened");
            }
            FlashEvent::PhaseChanged { from, to } => {
                tracing::info!(from = %from, to = %to, "Phase changed");
            }
            FlashEvent::StateEntered { state } => {
                tracing::debug!(state = %state, "State entered");
            }
            FlashEvent::Progress {
                phase,
                operation,
                current,
                total,
            } => {
                let pct = if *total > 0 {
                    (*current * 100) / *total
                } else {
                    0
                };
                tracing::debug!(phase = %phase, operation = %operation, progress = %format!("{}%", pct), "Progress");
            }
            FlashEvent::Log { level, message } => match level {
                LogLevel::Trace => tracing::trace!("{}", message),
                LogLevel::Debug => tracing::debug!("{}", message),
                LogLevel::Info => tracing::info!("{}", message),
                LogLevel::Warn => tracing::warn!("{}", message),
                LogLevel::Error => tracing::error!("{}", message),
            },
            FlashEvent::DigestMismatch {
                address,
                expected,
                actual,
            } => {
                tracing::warn!(
                    address = %format!("0x{:08X}", address),
                    expected = %expected,
                    actual = %actual,
                    "Digest mismatch"
                );
            }
            FlashEvent::Error { code, message } => match code {
                Some(code) => tracing::error!(code = %format!("0x{:04X}", code), "Error: {}", message),
                None => tracing::error!("Error: {}", message),
            },
            FlashEvent::Packet {
                direction, length, ..
            } => {
                tracing::trace!(dir = %direction, len = length, "Serial packet");
            }
            FlashEvent::Complete => {
                tracing::info!("Operation complete");
            }
        }
    }
}
