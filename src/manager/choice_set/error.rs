//! Choice-set manager error types

use thiserror::Error;

use crate::manager::ManagerState;
use crate::rpc::ResultCode;
use crate::session::SessionError;

/// Why a choice set failed validation. Checked atomically before any
/// wire traffic; an invalid set enqueues nothing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChoiceValidationError {
    /// The set has no cells
    #[error("choice set has no choices")]
    Empty,

    /// Timeout outside the permitted range
    #[error("timeout of {secs} s is outside the valid 5-100 s range")]
    TimeoutOutOfRange {
        /// Requested timeout in seconds
        secs: u64,
    },

    /// Two cells share a primary text
    #[error("duplicate cell text {text:?}; cell text must be unique within a set")]
    DuplicateText {
        /// The repeated text
        text: String,
    },

    /// Voice commands present on some cells but not all
    #[error("{with} of {total} cells have voice commands; all or none must")]
    PartialVoiceCommands {
        /// Cells carrying voice commands
        with: usize,
        /// Cells in the set
        total: usize,
    },

    /// Two cells share a voice phrase
    #[error("duplicate voice command {phrase:?}; phrases must be unique across the set")]
    DuplicateVoiceCommand {
        /// The repeated phrase
        phrase: String,
    },
}

/// Errors surfaced by the choice-set manager.
#[derive(Error, Debug)]
pub enum ChoiceSetError {
    /// The manager is in a state that accepts no operations
    #[error("choice set manager unusable in state {state:?}")]
    ManagerUnusable {
        /// Manager state at call time
        state: ManagerState,
    },

    /// The input choice set failed validation; nothing was enqueued
    #[error("invalid choice set: {0}")]
    Invalid(#[from] ChoiceValidationError),

    /// `present_keyboard` requires non-empty initial text
    #[error("initial keyboard text must not be empty")]
    EmptyInitialText,

    /// The operation was cancelled, typically superseded by a newer
    /// presentation or invalidated by a delete
    #[error("operation canceled")]
    Canceled,

    /// Artwork upload failed; the dependent operation was not sent
    #[error("artwork upload failed for {failed} file(s)")]
    UploadFailed {
        /// Files that failed to upload
        failed: usize,
    },

    /// The head unit rejected a request
    #[error("head unit returned {code:?}{}", info.as_deref().map(|i| format!(": {i}")).unwrap_or_default())]
    Request {
        /// Result code from the response
        code: ResultCode,
        /// Optional detail from the response
        info: Option<String>,
    },

    /// Session-level failure underneath the operation
    #[error("session error: {0}")]
    Session(#[from] SessionError),
}

/// Result type alias for choice-set manager operations
pub type Result<T> = std::result::Result<T, ChoiceSetError>;
