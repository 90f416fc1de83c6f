//! Channel state store
//!
//! Holds the raw text received for each channel, the display text produced
//! by the transform pipeline, and the per-channel title and flags. Only the
//! orchestrator mutates it; the document builder and scheduler read it.

use crate::channel::Channel;
use crate::config::Labels;
use crate::error::CoreError;

/// Current content of one channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelState {
    /// Which channel this is
    pub channel: Channel,
    /// Text as received from upstream
    pub raw: String,
    /// Text after transforms; what the card shows
    pub display: String,
    /// Panel title (thinking and references panels)
    pub title: String,
    /// Title has made its single transition
    pub title_settled: bool,
    /// Replaced by a terminal message; no further mutation
    pub finalized: bool,
}

impl ChannelState {
    fn new(channel: Channel, title: String) -> Self {
        Self {
            channel,
            raw: String::new(),
            display: String::new(),
            title,
            title_settled: false,
            finalized: false,
        }
    }

    /// Whether there is anything to render
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.display.trim().is_empty()
    }
}

/// All channel states of one render session
#[derive(Debug, Clone)]
pub struct ChannelStore {
    states: [ChannelState; 4],
}

impl ChannelStore {
    /// Create store with initial titles and the "preparing" status line
    #[must_use]
    pub fn new(labels: &Labels) -> Self {
        let mut store = Self {
            states: Channel::ALL.map(|channel| {
                let title = match channel {
                    Channel::Thinking => labels.thinking_title.clone(),
                    Channel::References => labels.references_heading(0),
                    Channel::Status | Channel::Answer => String::new(),
                };
                ChannelState::new(channel, title)
            }),
        };
        let status = store.state_mut(Channel::Status);
        status.raw.clone_from(&labels.preparing);
        status.display.clone_from(&labels.preparing);
        store
    }

    /// Read one channel
    #[inline]
    #[must_use]
    pub fn get(&self, channel: Channel) -> &ChannelState {
        &self.states[channel.index()]
    }

    /// Iterate channels in render order
    pub fn iter(&self) -> impl Iterator<Item = &ChannelState> {
        self.states.iter()
    }

    /// Whether a channel has display text
    #[inline]
    #[must_use]
    pub fn is_empty(&self, channel: Channel) -> bool {
        self.get(channel).is_empty()
    }

    /// Append a streamed delta to the raw text
    ///
    /// Returns `true` when the raw text changed.
    pub fn append(&mut self, channel: Channel, delta: &str) -> bool {
        let state = self.state_mut(channel);
        if state.finalized || delta.is_empty() {
            return false;
        }
        state.raw.push_str(delta);
        true
    }

    /// Replace the raw text with a snapshot
    ///
    /// Append-only channels reject snapshots shorter than what they hold.
    pub fn replace(&mut self, channel: Channel, text: &str) -> Result<bool, CoreError> {
        let state = self.state_mut(channel);
        if state.finalized || state.raw == text {
            return Ok(false);
        }
        if channel.is_append_only() && text.len() < state.raw.len() {
            tracing::debug!(
                %channel,
                current = state.raw.len(),
                attempted = text.len(),
                "rejecting shrinking snapshot"
            );
            return Err(CoreError::ChannelShrink {
                channel,
                current: state.raw.len(),
                attempted: text.len(),
            });
        }
        state.raw.clear();
        state.raw.push_str(text);
        Ok(true)
    }

    /// Store the transformed text
    pub fn set_display(&mut self, channel: Channel, display: String) {
        let state = self.state_mut(channel);
        if !state.finalized {
            state.display = display;
        }
    }

    /// Make the channel title's single transition
    ///
    /// Returns `true` only the first time.
    pub fn settle_title(&mut self, channel: Channel, title: impl Into<String>) -> bool {
        let state = self.state_mut(channel);
        if state.title_settled {
            return false;
        }
        state.title = title.into();
        state.title_settled = true;
        true
    }

    /// Replace a channel's text with a terminal message
    ///
    /// This is the only mutation allowed to shrink an append-only channel.
    pub fn finalize(&mut self, channel: Channel, text: impl Into<String>) {
        let state = self.state_mut(channel);
        let text = text.into();
        state.raw.clone_from(&text);
        state.display = text;
        state.finalized = true;
    }

    fn state_mut(&mut self, channel: Channel) -> &mut ChannelState {
        &mut self.states[channel.index()]
    }
}
