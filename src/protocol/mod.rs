//! Wire-framing protocol
//!
//! Stateless encoding and decoding of the frames that multiplex RPC
//! control messages and bulk binary payloads over one byte stream.

mod error;
mod frame;
mod header;
mod types;

pub use error::{FormatError, Result};
pub use frame::{Frame, FramePayload};
pub use header::FrameHeader;
pub use types::{FrameType, FunctionId, RpcType, ServiceType};

/// Protocol version encoded in the header's version nibble
pub const PROTOCOL_VERSION: u8 = 5;

/// Fixed header size in bytes
pub const FRAME_HEADER_SIZE: usize = 12;

/// RPC binary sub-header size (function ID + JSON size)
pub const BINARY_HEADER_SIZE: usize = 8;

/// Maximum payload a single frame may declare (128 KiB)
pub const MAX_DATA_SIZE: usize = 128 * 1024;
