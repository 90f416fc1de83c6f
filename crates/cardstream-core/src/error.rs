//! Error types for cardstream core
//!
//! Covers:
//! - Illegal session lifecycle transitions
//! - Channel mutations that would shrink streamed text
//! - Configuration loading failures

use crate::channel::Channel;
use crate::lifecycle::SessionState;

/// Main core error type
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Lifecycle transition not present in the transition table
    #[error("illegal session transition: {from:?} -> {to:?}")]
    IllegalTransition {
        /// State the session was in
        from: SessionState,
        /// State that was requested
        to: SessionState,
    },

    /// A snapshot would have made an append-only channel shorter
    #[error("{channel} text cannot shrink ({current} -> {attempted} bytes)")]
    ChannelShrink {
        /// Channel that rejected the snapshot
        channel: Channel,
        /// Current raw length
        current: usize,
        /// Length of the rejected snapshot
        attempted: usize,
    },

    /// Configuration value out of range
    #[error("configuration error: {0}")]
    Config(String),

    /// Configuration file could not be parsed
    #[error("configuration parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

impl CoreError {
    /// Check if the error only affects one mutation and can be ignored
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::ChannelShrink { .. })
    }
}
