//! Reply requests, session handles and outcomes

use crate::dispatch::DispatchStats;
use crate::error::EngineError;
use crate::registry::CancelFlag;
use cardstream_core::{ObjectId, SessionId, SessionState};
use tokio::task::JoinHandle;

/// What a new reply should answer
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplyRequest {
    /// User prompt
    pub prompt: String,
    /// Display name of the asking user
    pub sender_name: Option<String>,
    /// Conversation id on the generator side; defaults to the session id
    pub chat_id: Option<String>,
    /// Workflow variables forwarded to the generator
    pub variables: serde_json::Map<String, serde_json::Value>,
}

impl ReplyRequest {
    /// Create request for a prompt
    #[inline]
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Self::default()
        }
    }

    /// With sender display name
    #[inline]
    #[must_use]
    pub fn with_sender(mut self, name: impl Into<String>) -> Self {
        self.sender_name = Some(name.into());
        self
    }

    /// With generator-side conversation id
    #[inline]
    #[must_use]
    pub fn with_chat_id(mut self, chat_id: impl Into<String>) -> Self {
        self.chat_id = Some(chat_id.into());
        self
    }

    /// With one workflow variable
    #[inline]
    #[must_use]
    pub fn with_variable(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.variables.insert(key.into(), value);
        self
    }
}

impl From<&str> for ReplyRequest {
    fn from(prompt: &str) -> Self {
        Self::new(prompt)
    }
}

impl From<String> for ReplyRequest {
    fn from(prompt: String) -> Self {
        Self::new(prompt)
    }
}

/// How a session ended
#[derive(Debug)]
pub struct SessionOutcome {
    /// Session id
    pub session_id: SessionId,
    /// Terminal lifecycle state
    pub state: SessionState,
    /// Answer text as last shown on the card
    pub answer: String,
    /// Card id, if the card was created
    pub object_id: Option<ObjectId>,
    /// Failure cause for [`SessionState::Failed`]
    pub error: Option<EngineError>,
    /// Delivery counters
    pub dispatch: DispatchStats,
}

impl SessionOutcome {
    /// Whether the reply finished normally
    #[inline]
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.state == SessionState::Completed
    }
}

/// Caller's handle on a running session
#[derive(Debug)]
pub struct SessionHandle {
    id: SessionId,
    cancel: CancelFlag,
    task: JoinHandle<SessionOutcome>,
}

impl SessionHandle {
    pub(crate) fn new(id: SessionId, cancel: CancelFlag, task: JoinHandle<SessionOutcome>) -> Self {
        Self { id, cancel, task }
    }

    /// Session id
    #[inline]
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Ask the session to stop; returns `false` if already requested
    #[inline]
    pub fn request_cancel(&self) -> bool {
        self.cancel.cancel()
    }

    /// Whether the session task has ended
    #[inline]
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the session to end
    pub async fn await_outcome(self) -> Result<SessionOutcome, EngineError> {
        Ok(self.task.await?)
    }

    /// Wait for the session and return the final answer text
    ///
    /// A cancelled session yields the partial answer it kept; a failed one
    /// yields its error.
    pub async fn await_result(self) -> Result<String, EngineError> {
        let outcome = self.await_outcome().await?;
        match (outcome.state, outcome.error) {
            (SessionState::Failed, Some(err)) => Err(err),
            _ => Ok(outcome.answer),
        }
    }
}
