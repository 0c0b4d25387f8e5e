//! BL60x-Core: Bouffalo Lab BL60x serial ISP protocol implementation in Rust.
//!
//! This crate drives the boot ROM's UART in-system-programming protocol:
//! it synchronizes with a freshly reset device, brings up the eflash loader
//! in RAM, then erases, programs and verifies firmware images in flash.
//!
//! # Architecture
//!
//! The crate is organized into layers:
//!
//! - **Integrity**: SHA-256, additive checksum, CRC-32
//! - **Protocol**: Command ids, packet header, response decoding, error tables
//! - **Image**: Loader layout, boot header, segment header, partition table
//! - **Transport**: Serial communication abstraction (serialport, mock)
//! - **Transfer**: Splitting buffers into acknowledged frames
//! - **State**: Session state machine and transition handlers
//! - **Events**: Observer pattern for UI decoupling
//! - **Session**: High-level orchestrator
//!
//! # Example
//!
//! ```no_run
//! use bl60x_core::session::{AssetSpec, FlashSession, SessionConfig};
//!
//! let config = SessionConfig {
//!     port: "/dev/ttyUSB0".to_string(),
//!     loader_path: Some("eflash_loader_40m.bin".into()),
//!     assets: vec![AssetSpec {
//!         address: 0x10000,
//!         path: "firmware.bin".into(),
//!     }],
//!     ..Default::default()
//! };
//!
//! let session = FlashSession::new(config);
//! session.run().expect("flashing failed");
//! ```

pub mod error;
pub mod events;
pub mod image;
pub mod integrity;
pub mod protocol;
pub mod session;
pub mod state;
pub mod transfer;
pub mod transport;

// Re-exports for convenience
pub use error::FlashError;
pub use events::{FlashEvent, FlashObserver, FlashPhase, LogLevel, NullObserver, TracingObserver};
pub use image::{Asset, LoaderImage, LoaderLayout, PartitionTable};
pub use integrity::{Digest, additive_checksum, crc32, digest};
pub use protocol::{Command, Packet, Response, Stage};
pub use session::{
    AssetSpec, DigestPolicy, FlashSession, NamedImage, SessionConfig, SessionInputs,
    SessionReport, Timing,
};
pub use state::{SessionState, StateMachineContext};
pub use transfer::{FrameKind, plan_frames};
pub use transport::{MockTransport, SerialPortTransport, SerialTransport, TransportError};
