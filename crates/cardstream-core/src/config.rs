//! Engine and per-reply configuration
//!
//! [`EngineConfig`] is process-wide and can be loaded from TOML.
//! [`ChannelConfig`] is chosen per reply.

use crate::channel::Channel;
use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Minimum spacing between two patches of the same channel
    pub debounce_interval_ms: u64,
    /// First sequence number used after card creation
    pub sequence_base: u64,
    /// Upstream silence after which the reply is failed
    pub upstream_idle_timeout_secs: u64,
    /// Render a stop button while streaming
    pub cancel_enabled: bool,
    /// Prefix joined to relative image locators before rehosting
    pub asset_base_url: Option<String>,
    /// Preview link template for citations; `{quote_id}` and
    /// `{collection_id}` are substituted
    pub citation_preview_url: Option<String>,
    /// User-visible strings
    pub labels: Labels,
}

impl EngineConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from TOML and validate
    pub fn from_toml_str(source: &str) -> Result<Self, CoreError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.debounce_interval_ms == 0 {
            return Err(CoreError::Config(
                "debounce_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.upstream_idle_timeout_secs == 0 {
            return Err(CoreError::Config(
                "upstream_idle_timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// With debounce interval
    #[inline]
    #[must_use]
    pub fn with_debounce(mut self, interval: Duration) -> Self {
        self.debounce_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// With idle timeout
    #[inline]
    #[must_use]
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.upstream_idle_timeout_secs = timeout.as_secs().max(1);
        self
    }

    /// With first sequence number
    #[inline]
    #[must_use]
    pub fn with_sequence_base(mut self, base: u64) -> Self {
        self.sequence_base = base;
        self
    }

    /// With stop button on or off
    #[inline]
    #[must_use]
    pub fn with_cancel_enabled(mut self, enabled: bool) -> Self {
        self.cancel_enabled = enabled;
        self
    }

    /// With asset base URL for relative image locators
    #[inline]
    #[must_use]
    pub fn with_asset_base_url(mut self, url: impl Into<String>) -> Self {
        self.asset_base_url = Some(url.into());
        self
    }

    /// With citation preview link template
    #[inline]
    #[must_use]
    pub fn with_citation_preview_url(mut self, template: impl Into<String>) -> Self {
        self.citation_preview_url = Some(template.into());
        self
    }

    /// Debounce interval as a duration
    #[inline]
    #[must_use]
    pub fn debounce_interval(&self) -> Duration {
        Duration::from_millis(self.debounce_interval_ms)
    }

    /// Idle timeout as a duration
    #[inline]
    #[must_use]
    pub fn upstream_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_idle_timeout_secs)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            debounce_interval_ms: 500,
            sequence_base: 1,
            upstream_idle_timeout_secs: 300,
            cancel_enabled: true,
            asset_base_url: None,
            citation_preview_url: None,
            labels: Labels::default(),
        }
    }
}

/// User-visible strings rendered into the card
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Labels {
    pub header_title: String,
    pub streaming_summary: String,
    pub preparing: String,
    /// `{name}` is replaced by the running node name
    pub running: String,
    /// `{name}` is replaced by the tool name
    pub tool_call: String,
    pub done: String,
    pub stopped: String,
    pub failed: String,
    pub apology: String,
    pub empty_answer: String,
    pub answer_heading: String,
    pub thinking_title: String,
    pub thinking_done_title: String,
    /// `{count}` is replaced by the number of references
    pub references_title: String,
    pub reference_link: String,
    pub stop_button: String,
    pub waiting_prompt: String,
    pub default_sender: String,
}

impl Labels {
    /// Status line for a running workflow node
    #[must_use]
    pub fn running_status(&self, name: &str) -> String {
        self.running.replace("{name}", name)
    }

    /// Status line for a tool call
    #[must_use]
    pub fn tool_status(&self, name: &str) -> String {
        self.tool_call.replace("{name}", name)
    }

    /// References panel title
    #[must_use]
    pub fn references_heading(&self, count: usize) -> String {
        self.references_title.replace("{count}", &count.to_string())
    }
}

impl Default for Labels {
    fn default() -> Self {
        Self {
            header_title: "🤖 AI Assistant".to_string(),
            streaming_summary: "AI is thinking...".to_string(),
            preparing: "🔄 **Preparing**...".to_string(),
            running: "🔄 **Running**: {name}".to_string(),
            tool_call: "🔧 **Tool call**: {name}...".to_string(),
            done: "✅ **Done**".to_string(),
            stopped: "⏹️ **Stopped by user**".to_string(),
            failed: "❌ **Something went wrong**".to_string(),
            apology: "Sorry, the AI service is temporarily unavailable. Please try again later."
                .to_string(),
            empty_answer:
                "Sorry, I could not understand your question. Please try rephrasing it."
                    .to_string(),
            answer_heading: "**Answer**".to_string(),
            thinking_title: "💭 **Thinking**".to_string(),
            thinking_done_title: "💭 **Finished thinking**".to_string(),
            references_title: "📚 **Knowledge base references** ({count})".to_string(),
            reference_link: "Open source".to_string(),
            stop_button: "Stop".to_string(),
            waiting_prompt: "> Processing your question...".to_string(),
            default_sender: "User".to_string(),
        }
    }
}

/// Per-reply channel selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Render the reasoning panel
    pub show_thinking: bool,
    /// Render the references panel
    pub show_references: bool,
    /// Rehost images found in the answer
    pub rewrite_resources: bool,
    /// Turn citation markers into preview links
    pub resolve_citations: bool,
}

impl ChannelConfig {
    /// Everything on
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer and status only, no transforms
    #[inline]
    #[must_use]
    pub fn answer_only() -> Self {
        Self {
            show_thinking: false,
            show_references: false,
            rewrite_resources: false,
            resolve_citations: false,
        }
    }

    /// With reasoning panel on or off
    #[inline]
    #[must_use]
    pub fn with_thinking(mut self, show: bool) -> Self {
        self.show_thinking = show;
        self
    }

    /// With references panel on or off
    #[inline]
    #[must_use]
    pub fn with_references(mut self, show: bool) -> Self {
        self.show_references = show;
        self
    }

    /// With image rehosting on or off
    #[inline]
    #[must_use]
    pub fn with_resource_rewrite(mut self, enabled: bool) -> Self {
        self.rewrite_resources = enabled;
        self
    }

    /// With citation resolution on or off
    #[inline]
    #[must_use]
    pub fn with_citations(mut self, enabled: bool) -> Self {
        self.resolve_citations = enabled;
        self
    }

    /// Whether a channel gets a block in the card
    #[inline]
    #[must_use]
    pub fn shows(&self, channel: Channel) -> bool {
        match channel {
            Channel::Status | Channel::Answer => true,
            Channel::Thinking => self.show_thinking,
            Channel::References => self.show_references,
        }
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            show_thinking: true,
            show_references: true,
            rewrite_resources: true,
            resolve_citations: true,
        }
    }
}
