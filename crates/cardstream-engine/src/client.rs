//! Render surface client

use crate::error::RenderError;
use async_trait::async_trait;
use cardstream_core::{Card, ObjectId};

/// Remote surface that displays one card per reply
///
/// `patch_element` and `replace_all` carry a sequence number; the surface
/// rejects numbers not greater than the last one it accepted.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RenderClient: Send + Sync {
    /// Create a card and return the surface's id for it
    async fn create(&self, card: &Card) -> Result<ObjectId, RenderError>;

    /// Replace the content of one element
    async fn patch_element(
        &self,
        object_id: &ObjectId,
        element_id: &str,
        content: &str,
        sequence: u64,
    ) -> Result<(), RenderError>;

    /// Replace the whole card
    async fn replace_all(
        &self,
        object_id: &ObjectId,
        card: &Card,
        sequence: u64,
    ) -> Result<(), RenderError>;
}

/// One queued render operation
#[derive(Debug, Clone, PartialEq)]
pub enum RenderOp {
    /// Patch a single element
    Patch {
        /// Target element
        element_id: String,
        /// New content
        content: String,
    },
    /// Replace the whole card
    ReplaceAll(Box<Card>),
}

impl RenderOp {
    /// Short name for logging
    #[inline]
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Patch { .. } => "patch",
            Self::ReplaceAll(_) => "replace_all",
        }
    }
}
