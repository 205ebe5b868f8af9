//! Artwork upload collaborator
//!
//! Disk I/O and upload bookkeeping live outside the core; operations
//! that need artwork on the head unit before their primary RPC go
//! through this narrow interface.

use async_trait::async_trait;
use thiserror::Error;

use crate::rpc::messages::{Image, ImageType};

/// A piece of artwork referenced by a choice cell.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Artwork {
    /// Head-unit file name
    pub name: String,
    /// Static (pre-installed) or dynamic (app-uploaded)
    pub image_type: ImageType,
}

impl Artwork {
    /// Dynamic artwork by file name
    #[must_use]
    pub fn dynamic(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image_type: ImageType::Dynamic,
        }
    }

    /// Static head-unit artwork by well-known name
    #[must_use]
    pub fn static_icon(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image_type: ImageType::Static,
        }
    }

    /// RPC image reference for this artwork
    #[must_use]
    pub fn to_image(&self) -> Image {
        Image {
            value: self.name.clone(),
            image_type: self.image_type,
        }
    }
}

/// A single file failed to reach the head unit.
#[derive(Error, Debug, Clone)]
#[error("upload of {name} failed: {reason}")]
pub struct UploadError {
    /// File that failed
    pub name: String,
    /// Collaborator-provided reason
    pub reason: String,
}

/// File/artwork collaborator consumed by preload and present operations.
///
/// Retries, if any, belong to the implementation; the core treats a
/// failed upload as final for the operation that depends on it.
#[async_trait]
pub trait ArtworkUploader: Send + Sync {
    /// Whether the artwork still needs to be sent to the head unit
    fn needs_upload(&self, artwork: &Artwork) -> bool;

    /// Upload a batch, reporting a per-file outcome in input order.
    async fn upload(&self, artworks: Vec<Artwork>) -> Vec<Result<(), UploadError>>;
}
