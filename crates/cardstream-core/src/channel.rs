//! Semantic channels of a single reply
//!
//! A reply is split into independent text streams that render as separate
//! blocks of one card. The declaration order of [`Channel`] is the render
//! order.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One semantically distinct stream of text within a reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// Progress line ("running node X", "calling tool Y")
    Status,
    /// Model reasoning
    Thinking,
    /// The answer itself
    Answer,
    /// Knowledge-base references backing the answer
    References,
}

impl Channel {
    /// All channels in render order
    pub const ALL: [Channel; 4] = [
        Channel::Status,
        Channel::Thinking,
        Channel::Answer,
        Channel::References,
    ];

    /// Position in render order
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Channel::Status => 0,
            Channel::Thinking => 1,
            Channel::Answer => 2,
            Channel::References => 3,
        }
    }

    /// Stable slug
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Channel::Status => "status",
            Channel::Thinking => "thinking",
            Channel::Answer => "answer",
            Channel::References => "references",
        }
    }

    /// Parse a slug (case-insensitive, accepts a few aliases)
    #[must_use]
    pub fn from_slug(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "status" => Some(Channel::Status),
            "thinking" | "think" | "reasoning" => Some(Channel::Thinking),
            "answer" | "content" => Some(Channel::Answer),
            "references" | "refs" | "quotes" => Some(Channel::References),
            _ => None,
        }
    }

    /// Element that holds the channel's body text; patches target this id
    #[inline]
    #[must_use]
    pub const fn element_id(self) -> &'static str {
        match self {
            Channel::Status => "status",
            Channel::Thinking => "think_content",
            Channel::Answer => "answer",
            Channel::References => "references_content",
        }
    }

    /// Element that holds the channel's panel title, if it has one
    #[inline]
    #[must_use]
    pub const fn title_element_id(self) -> Option<&'static str> {
        match self {
            Channel::Thinking => Some("think"),
            Channel::References => Some("references_title"),
            Channel::Status | Channel::Answer => None,
        }
    }

    /// Whether the raw text only ever grows while streaming
    ///
    /// The status channel is a single replaceable progress line.
    #[inline]
    #[must_use]
    pub const fn is_append_only(self) -> bool {
        !matches!(self, Channel::Status)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_order_matches_index() {
        for (i, channel) in Channel::ALL.iter().enumerate() {
            assert_eq!(channel.index(), i);
        }
    }

    #[test]
    fn slug_roundtrip_and_aliases() {
        for channel in Channel::ALL {
            assert_eq!(Channel::from_slug(channel.as_str()), Some(channel));
        }
        assert_eq!(Channel::from_slug(" Reasoning "), Some(Channel::Thinking));
        assert_eq!(Channel::from_slug("unknown"), None);
    }

    #[test]
    fn element_ids_are_distinct() {
        let mut ids: Vec<&str> = Channel::ALL.iter().map(|c| c.element_id()).collect();
        ids.extend(Channel::ALL.iter().filter_map(|c| c.title_element_id()));
        let before = ids.len();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), before);
    }

    #[test]
    fn only_status_is_replaceable() {
        assert!(!Channel::Status.is_append_only());
        assert!(Channel::Answer.is_append_only());
    }
}
