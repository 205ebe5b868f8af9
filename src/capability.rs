//! Display capability collaborator
//!
//! Capability probing and subscription live outside the core; managers
//! consume snapshots of the default main window delivered on a watch
//! channel and keep only the latest one.

use tokio::sync::watch;

/// Snapshot of the default main window's capabilities.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WindowCapability {
    /// Head-unit display name
    pub display_name: Option<String>,
    /// Whether choice rows may carry images
    pub supports_choice_images: bool,
    /// Whether choice rows may carry secondary text
    pub supports_secondary_text: bool,
}

/// Receiving side of a capability subscription; `None` until the first
/// snapshot arrives.
pub type CapabilityReceiver = watch::Receiver<Option<WindowCapability>>;

/// Create a capability channel pair. The collaborator keeps the sender
/// and publishes a new snapshot on every capability notification.
#[must_use]
pub fn capability_channel() -> (watch::Sender<Option<WindowCapability>>, CapabilityReceiver) {
    watch::channel(None)
}
