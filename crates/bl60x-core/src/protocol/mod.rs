//! Protocol module - ISP packet codec and response decoding.

pub mod boot_info;
pub mod command;
pub mod constants;
pub mod error_code;
pub mod header;
pub mod response;

pub use boot_info::{BootInfo, SecurityFlags};
pub use command::{Command, Packet};
pub use constants::*;
pub use error_code::{GENERIC_FAIL, Stage, describe};
pub use header::{HeaderError, PacketHeader, build_header, parse_header};
pub use response::{ProtocolError, Response, Status, classify_response, decode_response};
