//! Correlation ID allocation and request/response matching
//!
//! Every outstanding request holds a continuation here until its
//! response arrives or the session tears down. The registry is the one
//! structure shared across all managers' operations, so access is
//! serialized behind a mutex with short critical sections.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use tokio::sync::oneshot;
use tracing::warn;

use super::error::SessionError;
use crate::rpc::RpcResponse;

/// Continuation resolved when the matching response arrives.
pub type PendingResponse = oneshot::Sender<Result<RpcResponse, SessionError>>;

/// Monotonic allocator for correlation IDs.
///
/// IDs are process-unique within a session, never reused, and masked to
/// 31 bits because head units treat the field as signed.
#[derive(Debug)]
pub struct CorrelationIds {
    next: AtomicU32,
}

impl CorrelationIds {
    /// Create an allocator starting at 1
    #[must_use]
    pub const fn new() -> Self {
        Self {
            next: AtomicU32::new(1),
        }
    }

    /// Allocate the next ID
    pub fn next_id(&self) -> u32 {
        self.next.fetch_add(1, Ordering::Relaxed) & 0x7FFF_FFFF
    }
}

impl Default for CorrelationIds {
    fn default() -> Self {
        Self::new()
    }
}

/// Maps outstanding correlation IDs to pending-response continuations.
#[derive(Debug, Default)]
pub struct CorrelationRegistry {
    pending: Mutex<HashMap<u32, PendingResponse>>,
}

impl CorrelationRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a continuation for `id`.
    ///
    /// Fails if `id` already has one; with the monotonic allocator that
    /// is a protocol violation, not a user-facing condition.
    pub fn register(&self, id: u32, continuation: PendingResponse) -> Result<(), SessionError> {
        let mut pending = self.pending.lock().expect("registry lock poisoned");
        if pending.contains_key(&id) {
            warn!(correlation_id = id, "correlation id registered twice");
            return Err(SessionError::DuplicateCorrelation { id });
        }
        pending.insert(id, continuation);
        Ok(())
    }

    /// Resolve the continuation registered for the response's ID.
    ///
    /// Late or duplicate responses have no entry; those are logged and
    /// dropped, never fatal.
    pub fn resolve(&self, response: RpcResponse) {
        let id = response.correlation_id;
        let continuation = self
            .pending
            .lock()
            .expect("registry lock poisoned")
            .remove(&id);

        match continuation {
            Some(tx) => {
                // Receiver may have given up waiting; nothing left to do.
                let _ = tx.send(Ok(response));
            }
            None => {
                warn!(
                    correlation_id = id,
                    function_id = %response.function_id,
                    "dropping response with no outstanding request"
                );
            }
        }
    }

    /// Remove a continuation without resolving it, e.g. when the send
    /// that registered it failed.
    pub fn discard(&self, id: u32) {
        self.pending
            .lock()
            .expect("registry lock poisoned")
            .remove(&id);
    }

    /// Expire every outstanding continuation on session teardown,
    /// informing each of the disconnect.
    pub fn expire_all(&self) {
        let drained: Vec<PendingResponse> = {
            let mut pending = self.pending.lock().expect("registry lock poisoned");
            pending.drain().map(|(_, tx)| tx).collect()
        };
        for tx in drained {
            let _ = tx.send(Err(SessionError::Disconnected));
        }
    }

    /// Number of requests currently awaiting a response
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.pending.lock().expect("registry lock poisoned").len()
    }
}
