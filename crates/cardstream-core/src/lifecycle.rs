use crate::error::CoreError;
use serde::{Deserialize, Serialize};

/// Lifecycle of one render session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Card not yet created
    Starting,
    /// Consuming the upstream stream
    Streaming,
    /// Upstream finished normally
    Completed,
    /// Upstream or card creation failed
    Failed,
    /// Stopped by a cancel request
    Cancelled,
}

impl SessionState {
    /// Terminal states have no outgoing transitions
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        allowed_transitions(self).is_empty()
    }
}

/// Validates a lifecycle transition.
pub fn validate_transition(from: SessionState, to: SessionState) -> Result<(), CoreError> {
    if allowed(from, to) {
        Ok(())
    } else {
        Err(CoreError::IllegalTransition { from, to })
    }
}

#[must_use]
pub fn allowed_transitions(from: SessionState) -> Vec<SessionState> {
    use SessionState::*;
    match from {
        Starting => vec![Streaming, Failed, Cancelled],
        Streaming => vec![Completed, Failed, Cancelled],
        Completed | Failed | Cancelled => vec![],
    }
}

fn allowed(from: SessionState, to: SessionState) -> bool {
    allowed_transitions(from).into_iter().any(|s| s == to)
}
