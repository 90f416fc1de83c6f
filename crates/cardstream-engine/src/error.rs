//! Error types for the render engine
//!
//! Provides error handling for:
//! - Render surface calls (transport, rejection, stale sequence)
//! - Upstream generator failures and idle timeouts
//! - Session-level failures surfaced to callers

use cardstream_core::CoreError;
use std::time::Duration;

/// Failure of a render client call
#[derive(Debug, Clone, thiserror::Error)]
pub enum RenderError {
    /// Network or client-side failure
    #[error("render transport error: {0}")]
    Transport(String),

    /// The surface refused the update
    #[error("render surface rejected update ({code}): {message}")]
    Rejected {
        /// Surface error code
        code: i64,
        /// Surface error message
        message: String,
    },

    /// The surface already saw an equal or greater sequence number
    #[error("sequence {sequence} rejected as stale")]
    SequenceRejected {
        /// Rejected sequence number
        sequence: u64,
    },
}

impl RenderError {
    /// Check if the update was refused for ordering reasons
    #[inline]
    #[must_use]
    pub fn is_sequence_violation(&self) -> bool {
        matches!(self, Self::SequenceRejected { .. })
    }

    /// Check if the same call might succeed later
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

/// Failure of the upstream generator
#[derive(Debug, Clone, thiserror::Error)]
pub enum UpstreamError {
    /// The request could not be sent
    #[error("upstream request failed: {0}")]
    Request(String),

    /// The endpoint answered with a non-success status
    #[error("upstream returned status {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body, as far as it could be read
        body: String,
    },

    /// The stream broke while reading
    #[error("upstream stream error: {0}")]
    Stream(String),

    /// The generator reported an error event
    #[error("upstream reported error: {0}")]
    Reported(String),

    /// No event arrived within the idle timeout
    #[error("no upstream event for {0:?}")]
    IdleTimeout(Duration),
}

impl UpstreamError {
    /// Check if a new request might succeed
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Request(_) | Self::Stream(_) | Self::IdleTimeout(_) => true,
            Self::Status { status, .. } => *status >= 500,
            Self::Reported(_) => false,
        }
    }
}

/// Session-level error
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The card could not be created; nothing was rendered
    #[error("card creation failed: {0}")]
    CreateFailed(#[source] RenderError),

    /// The generator failed; the card shows a failure message
    #[error("upstream failed: {0}")]
    Upstream(#[from] UpstreamError),

    /// Invalid engine configuration
    #[error("configuration error: {0}")]
    Config(#[from] CoreError),

    /// The session task panicked or was aborted
    #[error("session task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl EngineError {
    /// Check if the card reached the surface at all
    #[inline]
    #[must_use]
    pub fn card_rendered(&self) -> bool {
        matches!(self, Self::Upstream(_))
    }
}
