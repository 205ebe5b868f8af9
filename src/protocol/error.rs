//! Frame codec error types

use thiserror::Error;

/// Errors produced while encoding or decoding wire frames.
///
/// Every variant is fatal to the frame that produced it and harmless to
/// the session: the receive path drops the frame and keeps reading.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    /// Fewer bytes were available than the header or declared frame size requires
    #[error("truncated frame: need {needed} bytes, got {got}")]
    Truncated {
        /// Bytes required to finish decoding
        needed: usize,
        /// Bytes actually available
        got: usize,
    },

    /// RPC type bits were outside the known range
    #[error("invalid rpc type: {bits:#04b}")]
    InvalidRpcType {
        /// Raw two-bit value
        bits: u8,
    },

    /// Frame type bits were outside the known range
    #[error("invalid frame type: {bits:#05b}")]
    InvalidFrameType {
        /// Raw three-bit value
        bits: u8,
    },

    /// Service type byte did not name a known service
    #[error("invalid service type: {byte:#04x}")]
    InvalidServiceType {
        /// Raw service byte
        byte: u8,
    },

    /// Declared `data_size` disagrees with the bytes that followed the header
    #[error("payload size mismatch: header declares {declared} bytes, {actual} present")]
    SizeMismatch {
        /// `data_size` from the header
        declared: usize,
        /// Trailing bytes actually present
        actual: usize,
    },

    /// Declared `json_size` exceeds the payload that carries it
    #[error("json size overflow: json_size {json_size} exceeds remaining payload {payload}")]
    JsonOverflow {
        /// `json_size` from the binary sub-header
        json_size: usize,
        /// Payload bytes remaining after the sub-header
        payload: usize,
    },

    /// Payload larger than the protocol allows
    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge {
        /// Payload size requested
        size: usize,
        /// Maximum allowed
        max: usize,
    },
}

/// Result type alias for codec operations
pub type Result<T> = std::result::Result<T, FormatError>;
