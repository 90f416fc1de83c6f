//! Upstream generator interface
//!
//! A generator turns a reply request into a stream of channel events. The
//! stream ends after [`UpstreamEvent::Completed`] or
//! [`UpstreamEvent::Failed`]; a stream that simply ends counts as completed.

pub mod http;
pub mod sse;

pub use http::{HttpGenerator, HttpGeneratorConfig};
pub use sse::{decode_body, SseDecoder};

use crate::error::UpstreamError;
use async_trait::async_trait;
use cardstream_core::{Channel, Reference, SessionId};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

/// Stream of decoded upstream events
pub type EventStream = BoxStream<'static, Result<UpstreamEvent, UpstreamError>>;

/// Progress reported by the generator's workflow
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progress {
    /// A workflow node started running
    NodeRunning(String),
    /// A tool is being called
    ToolCall(String),
}

/// One decoded upstream event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamEvent {
    /// Text appended to a channel
    Delta {
        /// Target channel
        channel: Channel,
        /// Appended text
        text: String,
    },
    /// Full text of a channel so far
    Snapshot {
        /// Target channel
        channel: Channel,
        /// Complete text
        text: String,
    },
    /// Workflow progress; rendered on the status channel
    Progress(Progress),
    /// Knowledge-base references used for the answer
    References(Vec<Reference>),
    /// Generation finished
    Completed,
    /// Generation failed
    Failed(String),
}

impl UpstreamEvent {
    /// Delta event
    #[inline]
    pub fn delta(channel: Channel, text: impl Into<String>) -> Self {
        Self::Delta {
            channel,
            text: text.into(),
        }
    }

    /// Snapshot event
    #[inline]
    pub fn snapshot(channel: Channel, text: impl Into<String>) -> Self {
        Self::Snapshot {
            channel,
            text: text.into(),
        }
    }
}

/// What the generator is asked to answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpstreamRequest {
    /// Render session this request belongs to
    pub session_id: SessionId,
    /// Conversation id on the generator side
    pub chat_id: String,
    /// User prompt
    pub prompt: String,
    /// Workflow variables
    pub variables: serde_json::Map<String, serde_json::Value>,
}

/// Source of streamed reply events
#[async_trait]
pub trait UpstreamGenerator: Send + Sync {
    /// Start generating and return the event stream
    async fn stream(&self, request: UpstreamRequest) -> Result<EventStream, UpstreamError>;
}
