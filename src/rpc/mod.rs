//! RPC message envelopes
//!
//! A thin typed layer over [`Frame`](crate::protocol::Frame): requests
//! the SDK sends, plus the response and notification shapes it receives.
//! The full head-unit catalogue is schema data, not logic; only the
//! messages this crate issues are modeled in [`messages`].

pub mod messages;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::protocol::{Frame, FramePayload, FunctionId, RpcType};

/// Head-unit result code attached to every response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResultCode {
    /// Request executed
    Success,
    /// Request superseded or dismissed before completing
    Aborted,
    /// Head unit refused the request
    Rejected,
    /// Request payload failed head-unit validation
    InvalidData,
    /// Policy or permission failure
    Disallowed,
    /// A referenced ID does not exist on the head unit
    InvalidId,
    /// An uploaded ID already exists on the head unit
    DuplicateName,
    /// The interaction timed out before the user acted
    TimedOut,
    /// Head unit cannot take the request in its current state
    IgnoredThisRequest,
    /// Unspecified head-unit failure
    GenericError,
    /// Any code this crate does not model
    #[serde(other)]
    Unrecognized,
}

/// Outgoing request envelope.
#[derive(Debug, Clone)]
pub struct RpcRequest {
    /// Operation being invoked
    pub function_id: FunctionId,
    /// Correlation ID assigned by the session
    pub correlation_id: u32,
    /// JSON parameters
    pub params: Value,
    /// Bulk binary payload (file data), empty for most requests
    pub bulk: Bytes,
}

impl RpcRequest {
    /// Serialize into a single RPC frame.
    pub fn into_frame(self, session_id: u8) -> serde_json::Result<Frame> {
        let json = serde_json::to_vec(&self.params)?;
        Ok(Frame::rpc(
            RpcType::Request,
            session_id,
            self.correlation_id,
            self.function_id,
            Bytes::from(json),
            self.bulk,
        ))
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponseBody {
    success: bool,
    result_code: ResultCode,
    #[serde(default)]
    info: Option<String>,
    #[serde(flatten)]
    params: Value,
}

/// Incoming response envelope, matched to a request by correlation ID.
#[derive(Debug, Clone)]
pub struct RpcResponse {
    /// Operation this responds to
    pub function_id: FunctionId,
    /// Correlation ID of the originating request
    pub correlation_id: u32,
    /// Whether the head unit reports success
    pub success: bool,
    /// Result code
    pub result_code: ResultCode,
    /// Optional human-readable detail
    pub info: Option<String>,
    /// Remaining response parameters
    pub params: Value,
    /// Bulk binary payload, if any
    pub bulk: Bytes,
}

impl RpcResponse {
    /// Parse a decoded response frame.
    pub fn from_frame(frame: &Frame) -> serde_json::Result<Self> {
        let (function_id, json, bulk) = match frame.payload() {
            FramePayload::Rpc {
                function_id,
                json,
                bulk,
            } => (*function_id, json, bulk.clone()),
            FramePayload::Raw(_) => {
                return Err(serde::de::Error::custom("raw frame has no rpc body"));
            }
        };

        let body: ResponseBody = serde_json::from_slice(json)?;
        Ok(Self {
            function_id,
            correlation_id: frame.header().message_id(),
            success: body.success,
            result_code: body.result_code,
            info: body.info,
            params: body.params,
            bulk,
        })
    }

    /// Deserialize the response parameters into a typed body.
    pub fn typed_params<T: serde::de::DeserializeOwned>(&self) -> serde_json::Result<T> {
        T::deserialize(self.params.clone())
    }
}

/// Incoming notification envelope.
#[derive(Debug, Clone)]
pub struct RpcNotification {
    /// Notification kind
    pub function_id: FunctionId,
    /// Notification parameters
    pub params: Value,
}

impl RpcNotification {
    /// Parse a decoded notification frame.
    pub fn from_frame(frame: &Frame) -> serde_json::Result<Self> {
        match frame.payload() {
            FramePayload::Rpc {
                function_id, json, ..
            } => Ok(Self {
                function_id: *function_id,
                params: if json.is_empty() {
                    Value::Null
                } else {
                    serde_json::from_slice(json)?
                },
            }),
            FramePayload::Raw(_) => Err(serde::de::Error::custom("raw frame has no rpc body")),
        }
    }

    /// Deserialize the notification parameters into a typed body.
    pub fn typed_params<T: serde::de::DeserializeOwned>(&self) -> serde_json::Result<T> {
        T::deserialize(self.params.clone())
    }
}
