//! Fixed-layout frame header
//!
//! Every frame on the wire starts with this 12-byte header. All
//! multi-byte fields are big-endian.
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |Version|E|FrTyp|RpT|  FrameInfo|  Service Type |   Session ID  |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                          Data Size (4)                        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                 Message ID / Correlation ID (4)               |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```

use super::error::FormatError;
use super::types::{FrameType, RpcType, ServiceType};
use super::{FRAME_HEADER_SIZE, MAX_DATA_SIZE, PROTOCOL_VERSION};

/// Decoded frame header.
///
/// Constructed immediately before send, parsed immediately on receive,
/// never mutated after construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    version: u8,
    encrypted: bool,
    frame_type: FrameType,
    rpc_type: RpcType,
    frame_info: u8,
    service_type: ServiceType,
    session_id: u8,
    data_size: u32,
    message_id: u32,
}

impl FrameHeader {
    /// Create a header at the current protocol version.
    ///
    /// `frame_info` is truncated to its six wire bits and `message_id`
    /// to the 31 bits head units treat as a signed correlation field.
    #[must_use]
    pub fn new(
        frame_type: FrameType,
        rpc_type: RpcType,
        service_type: ServiceType,
        session_id: u8,
        data_size: u32,
        message_id: u32,
    ) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            encrypted: false,
            frame_type,
            rpc_type,
            frame_info: 0,
            service_type,
            session_id,
            data_size,
            message_id: message_id & 0x7FFF_FFFF,
        }
    }

    /// Set the frame-info bits (six bits, consecutive-frame sequencing)
    #[must_use]
    pub const fn with_frame_info(mut self, frame_info: u8) -> Self {
        self.frame_info = frame_info & 0x3F;
        self
    }

    /// Mark the frame as encrypted
    #[must_use]
    pub const fn with_encryption(mut self, encrypted: bool) -> Self {
        self.encrypted = encrypted;
        self
    }

    /// Protocol version nibble
    #[must_use]
    pub const fn version(&self) -> u8 {
        self.version
    }

    /// Whether the payload is encrypted
    #[must_use]
    pub const fn is_encrypted(&self) -> bool {
        self.encrypted
    }

    /// Frame type
    #[must_use]
    pub const fn frame_type(&self) -> FrameType {
        self.frame_type
    }

    /// RPC type
    #[must_use]
    pub const fn rpc_type(&self) -> RpcType {
        self.rpc_type
    }

    /// Frame info bits
    #[must_use]
    pub const fn frame_info(&self) -> u8 {
        self.frame_info
    }

    /// Service type
    #[must_use]
    pub const fn service_type(&self) -> ServiceType {
        self.service_type
    }

    /// Session ID
    #[must_use]
    pub const fn session_id(&self) -> u8 {
        self.session_id
    }

    /// Exact byte length of the payload that follows the header
    #[must_use]
    pub const fn data_size(&self) -> u32 {
        self.data_size
    }

    /// Message ID; the correlation ID for RPC frames
    #[must_use]
    pub const fn message_id(&self) -> u32 {
        self.message_id
    }

    /// Serialize to the fixed 12-byte wire layout
    #[must_use]
    pub fn to_bytes(&self) -> [u8; FRAME_HEADER_SIZE] {
        let mut bytes = [0u8; FRAME_HEADER_SIZE];

        bytes[0] = (self.version << 4)
            | (u8::from(self.encrypted) << 3)
            | self.frame_type.as_bits();
        bytes[1] = (self.rpc_type.as_bits() << 6) | self.frame_info;
        bytes[2] = self.service_type.as_byte();
        bytes[3] = self.session_id;
        bytes[4..8].copy_from_slice(&self.data_size.to_be_bytes());
        bytes[8..12].copy_from_slice(&self.message_id.to_be_bytes());

        bytes
    }

    /// Parse the fixed header from the front of `bytes`.
    ///
    /// Fails without panicking on short input or out-of-range enum bits;
    /// a header is only returned fully populated.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FormatError> {
        if bytes.len() < FRAME_HEADER_SIZE {
            return Err(FormatError::Truncated {
                needed: FRAME_HEADER_SIZE,
                got: bytes.len(),
            });
        }

        let frame_type = FrameType::from_bits(bytes[0] & 0x07)?;
        let rpc_type = RpcType::from_bits(bytes[1] >> 6)?;
        let service_type = ServiceType::from_byte(bytes[2])?;

        let data_size = u32::from_be_bytes(bytes[4..8].try_into().expect("slice is 4 bytes"));
        if data_size as usize > MAX_DATA_SIZE {
            return Err(FormatError::PayloadTooLarge {
                size: data_size as usize,
                max: MAX_DATA_SIZE,
            });
        }

        Ok(Self {
            version: bytes[0] >> 4,
            encrypted: bytes[0] & 0x08 != 0,
            frame_type,
            rpc_type,
            frame_info: bytes[1] & 0x3F,
            service_type,
            session_id: bytes[3],
            data_size,
            message_id: u32::from_be_bytes(bytes[8..12].try_into().expect("slice is 4 bytes")),
        })
    }
}
