//! hulink - Client SDK for RPC sessions with vehicle head units
//!
//! This library speaks the head unit's framed, multiplexed wire format
//! and layers typed RPC exchange and high-level interaction managers on
//! top. The transport itself (TCP, Bluetooth, USB AOA) stays outside
//! the crate behind the [`Transport`](session::Transport) trait.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use hulink::manager::choice_set::{ChoiceCell, ChoiceSetManager};
//! use hulink::session::RpcSession;
//!
//! # async fn demo(
//! #     transport: Arc<dyn hulink::session::Transport>,
//! #     uploader: Arc<dyn hulink::file::ArtworkUploader>,
//! # ) -> Result<(), Box<dyn std::error::Error>> {
//! let session = RpcSession::new(transport, 1);
//! let (_capability_tx, capability) = hulink::capability::capability_channel();
//!
//! let manager = ChoiceSetManager::new(session, uploader, capability);
//! manager.start().await?;
//! manager
//!     .preload_choices(vec![ChoiceCell::new("Coffee"), ChoiceCell::new("Tea")])
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Layers
//!
//! - **Frame codec** - 12-byte headers, RPC sub-headers, bulk payloads
//! - **RPC session** - correlation IDs, response matching, notifications
//! - **Managers** - ordered operation queues with lifecycle state
//! - **Choice sets** - preload, present, delete, keyboard interactions

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod capability;
pub mod file;
pub mod manager;
pub mod protocol;
pub mod rpc;
pub mod session;

pub use protocol::{
    BINARY_HEADER_SIZE, FRAME_HEADER_SIZE, FormatError, Frame, FrameHeader, FramePayload,
    FrameType, FunctionId, MAX_DATA_SIZE, PROTOCOL_VERSION, RpcType, ServiceType,
};
pub use session::{RpcSession, SessionError, Transport};
