//! Error types for the transform pipeline

/// Failure of a single transform lookup
///
/// Never fatal to a reply: the fragment is rendered empty for that pass and
/// the cache entry stays unresolved so a later pass retries.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransformError {
    /// Rehosting an image failed
    #[error("failed to relocate resource {locator}: {reason}")]
    Relocate {
        /// Locator as written in the text
        locator: String,
        /// Collaborator-provided reason
        reason: String,
    },

    /// Resolving a citation failed
    #[error("failed to resolve citation {citation_id}: {reason}")]
    Resolve {
        /// Citation id from the marker
        citation_id: String,
        /// Collaborator-provided reason
        reason: String,
    },

    /// The citation id matches none of the session's references
    #[error("unknown citation: {0}")]
    UnknownCitation(String),
}

impl TransformError {
    /// Check if a later occurrence of the same key may succeed
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::UnknownCitation(_))
    }
}
