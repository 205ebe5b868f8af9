//! RPC session over an abstract framed transport
//!
//! The session owns the correlation registry and the ID allocator. All
//! managers multiplex their requests through one session; the transport
//! itself (TCP, Bluetooth, USB AOA) is an external collaborator behind
//! the [`Transport`] trait.

mod correlation;
mod error;

pub use correlation::{CorrelationIds, CorrelationRegistry, PendingResponse};
pub use error::{Result, SessionError};

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, trace, warn};

use crate::protocol::{Frame, FormatError, FunctionId, RpcType};
use crate::rpc::{RpcNotification, RpcRequest, RpcResponse};

/// Byte-oriented transport collaborator.
///
/// Implementations deliver complete frames to
/// [`RpcSession::handle_frame`] and call [`RpcSession::close`] on
/// disconnect.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one encoded frame.
    async fn send(&self, frame: Bytes) -> std::io::Result<()>;
}

/// Notification fan-out capacity; slow subscribers lose oldest first.
const NOTIFICATION_CAPACITY: usize = 64;

/// One multiplexed RPC session with a head unit.
pub struct RpcSession {
    transport: Arc<dyn Transport>,
    registry: CorrelationRegistry,
    ids: CorrelationIds,
    session_id: u8,
    notifications: broadcast::Sender<RpcNotification>,
}

impl RpcSession {
    /// Create a session over `transport`.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, session_id: u8) -> Arc<Self> {
        let (notifications, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        Arc::new(Self {
            transport,
            registry: CorrelationRegistry::new(),
            ids: CorrelationIds::new(),
            session_id,
            notifications,
        })
    }

    /// Subscribe to head-unit notifications.
    #[must_use]
    pub fn notifications(&self) -> broadcast::Receiver<RpcNotification> {
        self.notifications.subscribe()
    }

    /// Send a request and await its correlated response.
    ///
    /// The continuation is registered before the frame hits the wire, so
    /// a fast response can never race its own registration.
    pub async fn send_request(
        &self,
        function_id: FunctionId,
        params: serde_json::Value,
        bulk: Bytes,
    ) -> Result<RpcResponse> {
        let correlation_id = self.ids.next_id();
        let (tx, rx) = oneshot::channel();
        self.registry.register(correlation_id, tx)?;

        let request = RpcRequest {
            function_id,
            correlation_id,
            params,
            bulk,
        };
        let frame = match request.into_frame(self.session_id) {
            Ok(frame) => frame,
            Err(err) => {
                self.registry.discard(correlation_id);
                return Err(err.into());
            }
        };

        trace!(%function_id, correlation_id, "sending request");
        if let Err(err) = self.transport.send(frame.encode()).await {
            self.registry.discard(correlation_id);
            return Err(err.into());
        }

        rx.await.map_err(|_| SessionError::Disconnected)?
    }

    /// Send a request with a typed body and no bulk payload.
    pub async fn send_request_body<T: Serialize>(
        &self,
        function_id: FunctionId,
        body: &T,
    ) -> Result<RpcResponse> {
        let params = serde_json::to_value(body)?;
        self.send_request(function_id, params, Bytes::new()).await
    }

    /// Receive path: decode one complete frame and route it.
    ///
    /// Responses resolve their continuation, notifications fan out to
    /// subscribers. A malformed frame is fatal only to itself; the
    /// caller logs the returned error and keeps reading.
    pub fn handle_frame(&self, bytes: Bytes) -> std::result::Result<(), FormatError> {
        let frame = Frame::decode(bytes)?;
        let header = frame.header();

        if !header.service_type().carries_rpc_payload() {
            trace!(service = ?header.service_type(), "ignoring non-rpc frame");
            return Ok(());
        }

        match header.rpc_type() {
            RpcType::Response => match RpcResponse::from_frame(&frame) {
                Ok(response) => self.registry.resolve(response),
                Err(err) => {
                    warn!(correlation_id = header.message_id(), %err, "dropping unparseable response");
                }
            },
            RpcType::Notification => match RpcNotification::from_frame(&frame) {
                Ok(notification) => {
                    // No subscribers is fine; the send result only
                    // reports that nobody is listening.
                    let _ = self.notifications.send(notification);
                }
                Err(err) => {
                    warn!(%err, "dropping unparseable notification");
                }
            },
            RpcType::Request => {
                warn!(
                    correlation_id = header.message_id(),
                    "head-unit-initiated requests are not supported, dropping"
                );
            }
        }
        Ok(())
    }

    /// Tear the session down: every outstanding continuation is expired
    /// and informed of the disconnect.
    pub fn close(&self) {
        debug!(
            outstanding = self.registry.outstanding(),
            "closing session"
        );
        self.registry.expire_all();
    }

    /// Number of requests currently awaiting a response
    #[must_use]
    pub fn outstanding_requests(&self) -> usize {
        self.registry.outstanding()
    }

    /// Session ID frames are stamped with
    #[must_use]
    pub const fn session_id(&self) -> u8 {
        self.session_id
    }
}
