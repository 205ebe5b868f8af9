//! Manager framework: operation queue plus shared lifecycle
//!
//! Every high-level feature manager (choice sets, alerts, screen state)
//! is built from the same primitives: a [`OperationQueue`] that runs its
//! work one operation at a time, and a [`ManagerLifecycle`] gating
//! whether new work is accepted at all.

pub mod choice_set;
mod operation;

pub use operation::{CancelToken, Operation, OperationHandle, OperationQueue, OperationState};

use tokio::sync::watch;
use tracing::debug;

/// Lifecycle state shared by every sub-manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerState {
    /// Probing capabilities; operations queue up behind the probe
    SettingUp,
    /// Fully usable
    Ready,
    /// Usable with reduced functionality
    Limited,
    /// Unusable for the rest of its lifetime; public calls fail fast
    Error,
    /// Torn down; the operation queue has been cancelled
    Disposed,
}

impl ManagerState {
    /// Whether the manager accepts new operations in this state
    #[must_use]
    pub const fn accepts_operations(self) -> bool {
        matches!(self, Self::SettingUp | Self::Ready | Self::Limited)
    }
}

/// Small state machine every manager embeds.
///
/// `SettingUp -> Ready | Limited | Error`; `Disposed` is reachable from
/// any state. `Error` and `Disposed` are terminal for the manager's
/// usable lifetime.
#[derive(Debug)]
pub struct ManagerLifecycle {
    state: watch::Sender<ManagerState>,
    name: &'static str,
}

impl ManagerLifecycle {
    /// Start in `SettingUp`
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            state: watch::Sender::new(ManagerState::SettingUp),
            name,
        }
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> ManagerState {
        *self.state.borrow()
    }

    /// Attempt a transition; returns whether it was applied.
    ///
    /// `Disposed` is reachable from everywhere, nothing is reachable
    /// from `Disposed`, and `Error` only yields to `Disposed`.
    pub fn transition(&self, next: ManagerState) -> bool {
        let name = self.name;
        self.state.send_if_modified(|state| {
            let allowed = match (*state, next) {
                (ManagerState::Disposed, _) => false,
                (_, ManagerState::Disposed) => true,
                (ManagerState::Error, _) => false,
                (current, next) => current != next,
            };
            if allowed {
                debug!(manager = name, from = ?*state, to = ?next, "state transition");
                *state = next;
            }
            allowed
        })
    }

    /// Watch for state changes
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ManagerState> {
        self.state.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_is_terminal_except_dispose() {
        let lifecycle = ManagerLifecycle::new("test");
        assert!(lifecycle.transition(ManagerState::Error));
        assert!(!lifecycle.transition(ManagerState::Ready));
        assert!(lifecycle.transition(ManagerState::Disposed));
        assert_eq!(lifecycle.state(), ManagerState::Disposed);
    }

    #[test]
    fn test_disposed_is_final() {
        let lifecycle = ManagerLifecycle::new("test");
        assert!(lifecycle.transition(ManagerState::Disposed));
        assert!(!lifecycle.transition(ManagerState::Ready));
        assert!(!lifecycle.transition(ManagerState::Error));
    }

    #[test]
    fn test_error_state_rejects_operations() {
        assert!(ManagerState::SettingUp.accepts_operations());
        assert!(ManagerState::Ready.accepts_operations());
        assert!(!ManagerState::Error.accepts_operations());
        assert!(!ManagerState::Disposed.accepts_operations());
    }
}
