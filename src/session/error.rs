//! Session-level error types

use thiserror::Error;

use crate::protocol::FormatError;

/// Errors surfaced by the RPC session.
#[derive(Error, Debug)]
pub enum SessionError {
    /// The transport dropped while a request was outstanding
    #[error("session disconnected")]
    Disconnected,

    /// A correlation ID was registered twice.
    ///
    /// The monotonic allocator makes this impossible in correct use, so
    /// hitting it means another component forged an ID.
    #[error("duplicate in-flight correlation id {id}")]
    DuplicateCorrelation {
        /// The offending correlation ID
        id: u32,
    },

    /// The underlying transport failed to accept bytes
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// An RPC body failed to serialize or deserialize
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A frame failed to encode or decode
    #[error("format error: {0}")]
    Format(#[from] FormatError),
}

/// Result type alias for session operations
pub type Result<T> = std::result::Result<T, SessionError>;
