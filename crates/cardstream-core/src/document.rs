//! Card document model and builder
//!
//! [`build_document`] is a pure function of the channel store and session
//! metadata. It is used for structural rebuilds and for the terminal
//! rebuild; ordinary incremental updates patch a single element with
//! [`element_content`] instead.
//!
//! # Layout
//!
//! ```text
//! refer              > sender: prompt
//! ── status          progress line
//! ── think           collapsible panel, body think_content
//! ── answer          heading + answer text
//! ── references      collapsible panel, body references_content
//!    stop_button     streaming only, when cancellation is armed
//! ```

use crate::channel::Channel;
use crate::config::{ChannelConfig, Labels};
use crate::store::ChannelStore;
use crate::types::{Reference, SessionId};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt::Write as _;

/// Element id of the quoted prompt
pub const REFER_ELEMENT_ID: &str = "refer";
/// Element id of the stop button
pub const STOP_BUTTON_ELEMENT_ID: &str = "stop_button";
/// Characters of a reference chunk shown in the references panel
pub const REFERENCE_PREVIEW_CHARS: usize = 300;
/// Characters of the answer used as the terminal summary
pub const SUMMARY_CHARS: usize = 60;

/// Complete card document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Card {
    pub schema: String,
    pub header: Header,
    pub config: CardConfig,
    pub body: Body,
}

impl Card {
    /// Top-level elements
    #[inline]
    #[must_use]
    pub fn elements(&self) -> &[Element] {
        &self.body.elements
    }

    /// Text of the element with `element_id`, searching inside panels
    #[must_use]
    pub fn element_content(&self, element_id: &str) -> Option<&str> {
        find_content(&self.body.elements, element_id)
    }

    /// Whether any element carries `element_id`
    #[must_use]
    pub fn contains_element(&self, element_id: &str) -> bool {
        contains_id(&self.body.elements, element_id)
    }

    /// Whether the card still streams
    #[inline]
    #[must_use]
    pub fn is_streaming(&self) -> bool {
        self.config.streaming_mode
    }

    /// Serialize to the wire representation
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Header {
    pub title: Text,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Text {
    pub tag: String,
    pub content: String,
}

impl Text {
    fn plain(content: impl Into<String>) -> Self {
        Self {
            tag: "plain_text".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardConfig {
    pub streaming_mode: bool,
    pub update_multi: bool,
    pub summary: Summary,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub streaming_config: Option<StreamingConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub content: String,
}

/// Typewriter settings the surface applies to streamed text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamingConfig {
    pub print_frequency_ms: PrintFrequency,
    pub print_step: PrintStep,
    pub print_strategy: String,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            print_frequency_ms: PrintFrequency {
                default: 70,
                android: 70,
                ios: 70,
                pc: 70,
            },
            print_step: PrintStep { default: 3 },
            print_strategy: "fast".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrintFrequency {
    pub default: u32,
    pub android: u32,
    pub ios: u32,
    pub pc: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrintStep {
    pub default: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Body {
    pub elements: Vec<Element>,
}

/// One card element; the `tag` field selects the variant on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "tag", rename_all = "snake_case")]
pub enum Element {
    Markdown(Markdown),
    Hr,
    CollapsiblePanel(CollapsiblePanel),
    Button(Button),
}

impl Element {
    fn markdown(content: impl Into<String>, element_id: &str) -> Self {
        Element::Markdown(Markdown {
            content: content.into(),
            element_id: Some(element_id.to_string()),
        })
    }

    /// Stable id, if the element has one
    #[must_use]
    pub fn element_id(&self) -> Option<&str> {
        match self {
            Element::Markdown(m) => m.element_id.as_deref(),
            Element::CollapsiblePanel(p) => p.element_id.as_deref(),
            Element::Button(b) => Some(&b.element_id),
            Element::Hr => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Markdown {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollapsiblePanel {
    pub expanded: bool,
    pub header: PanelHeader,
    pub vertical_spacing: String,
    pub padding: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_style: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_id: Option<String>,
    pub elements: Vec<Element>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanelHeader {
    pub title: Box<Element>,
    pub width: String,
    pub vertical_align: String,
    pub padding: String,
    pub icon: Icon,
    pub icon_position: String,
    pub icon_expanded_angle: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Icon {
    pub tag: String,
    pub token: String,
    pub color: String,
    pub size: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Button {
    pub text: Text,
    #[serde(rename = "type")]
    pub kind: String,
    pub element_id: String,
    pub behaviors: Vec<Behavior>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Behavior {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: serde_json::Value,
}

/// Where the session is when the document is built
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentPhase {
    /// Streaming; the stop button is rendered once cancellation is armed
    Streaming { cancel_armed: bool },
    /// Final document
    Terminal { summary: String },
}

/// Session metadata the builder needs besides channel state
#[derive(Debug, Clone)]
pub struct DocumentMeta<'a> {
    pub session_id: SessionId,
    pub prompt: &'a str,
    pub sender_name: Option<&'a str>,
    pub channels: &'a ChannelConfig,
    pub phase: DocumentPhase,
}

/// Text the surface should show for one channel's body element
#[must_use]
pub fn element_content(store: &ChannelStore, channel: Channel, labels: &Labels) -> String {
    let display = &store.get(channel).display;
    match channel {
        Channel::Answer => format!("{}\n\n{}", labels.answer_heading, display),
        Channel::Status | Channel::Thinking | Channel::References => display.clone(),
    }
}

/// Build the full card from the current store
#[must_use]
pub fn build_document(store: &ChannelStore, meta: &DocumentMeta<'_>, labels: &Labels) -> Card {
    let terminal = matches!(meta.phase, DocumentPhase::Terminal { .. });
    let mut elements = Vec::new();

    let refer = if meta.prompt.is_empty() {
        labels.waiting_prompt.clone()
    } else {
        let sender = meta.sender_name.unwrap_or(&labels.default_sender);
        format!("> {sender}: {}", meta.prompt)
    };
    elements.push(Element::markdown(refer, REFER_ELEMENT_ID));

    for state in store.iter() {
        if state.is_empty() || !meta.channels.shows(state.channel) {
            continue;
        }
        let content = element_content(store, state.channel, labels);
        match state.channel {
            Channel::Status | Channel::Answer => {
                elements.push(Element::Hr);
                elements.push(Element::markdown(content, state.channel.element_id()));
            }
            Channel::Thinking => {
                elements.push(Element::Hr);
                elements.push(panel(PanelSpec {
                    title: &state.title,
                    title_id: "think",
                    body: content,
                    body_id: state.channel.element_id(),
                    expanded: !terminal,
                    icon_color: "",
                    vertical_spacing: "8px",
                    background: None,
                    element_id: None,
                }));
            }
            Channel::References => {
                elements.push(Element::Hr);
                elements.push(panel(PanelSpec {
                    title: &state.title,
                    title_id: "references_title",
                    body: content,
                    body_id: state.channel.element_id(),
                    expanded: false,
                    icon_color: "blue",
                    vertical_spacing: "4px",
                    background: Some("grey"),
                    element_id: Some("references_panel"),
                }));
            }
        }
    }

    if let DocumentPhase::Streaming { cancel_armed: true } = meta.phase {
        elements.push(stop_button(meta.session_id, labels));
    }

    let summary = match &meta.phase {
        DocumentPhase::Streaming { .. } => labels.streaming_summary.clone(),
        DocumentPhase::Terminal { summary } => summary.clone(),
    };

    Card {
        schema: "2.0".to_string(),
        header: Header {
            title: Text::plain(labels.header_title.clone()),
        },
        config: CardConfig {
            streaming_mode: !terminal,
            update_multi: true,
            summary: Summary { content: summary },
            streaming_config: (!terminal).then(StreamingConfig::default),
        },
        body: Body { elements },
    }
}

/// Markdown for the references panel body
///
/// `links` is parallel to `references`; a missing link leaves the entry
/// without one.
#[must_use]
pub fn format_references(
    references: &[Reference],
    links: &[Option<String>],
    labels: &Labels,
) -> String {
    references
        .iter()
        .enumerate()
        .map(|(i, reference)| {
            let module = if reference.module_name.is_empty() {
                "-"
            } else {
                reference.module_name.as_str()
            };
            let mut entry = format!(
                "**{}. {}**\n> 📂 {}\n\n```\n{}\n```",
                i + 1,
                reference.source_name,
                module,
                truncate_chars(&reference.content, REFERENCE_PREVIEW_CHARS),
            );
            if let Some(Some(link)) = links.get(i) {
                let _ = write!(entry, "\n\n🔗 [{}]({link})", labels.reference_link);
            }
            entry
        })
        .collect::<Vec<_>>()
        .join("\n\n---\n\n")
}

/// Cut `text` to at most `max_chars` characters, marking the cut with "..."
#[must_use]
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

struct PanelSpec<'a> {
    title: &'a str,
    title_id: &'a str,
    body: String,
    body_id: &'a str,
    expanded: bool,
    icon_color: &'a str,
    vertical_spacing: &'a str,
    background: Option<&'a str>,
    element_id: Option<&'a str>,
}

fn panel(layout: PanelSpec<'_>) -> Element {
    Element::CollapsiblePanel(CollapsiblePanel {
        expanded: layout.expanded,
        header: PanelHeader {
            title: Box::new(Element::markdown(layout.title, layout.title_id)),
            width: "auto_when_fold".to_string(),
            vertical_align: "center".to_string(),
            padding: "4px 0px 4px 8px".to_string(),
            icon: Icon {
                tag: "standard_icon".to_string(),
                token: "down-small-ccm_outlined".to_string(),
                color: layout.icon_color.to_string(),
                size: "16px 16px".to_string(),
            },
            icon_position: "follow_text".to_string(),
            icon_expanded_angle: -180,
        },
        vertical_spacing: layout.vertical_spacing.to_string(),
        padding: "8px 8px 8px 8px".to_string(),
        background_style: layout.background.map(str::to_string),
        element_id: layout.element_id.map(str::to_string),
        elements: vec![Element::markdown(layout.body, layout.body_id)],
    })
}

fn stop_button(session_id: SessionId, labels: &Labels) -> Element {
    Element::Button(Button {
        text: Text::plain(labels.stop_button.clone()),
        kind: "danger".to_string(),
        element_id: STOP_BUTTON_ELEMENT_ID.to_string(),
        behaviors: vec![Behavior {
            kind: "callback".to_string(),
            value: json!({ "action": "stop", "session_id": session_id.to_string() }),
        }],
    })
}

fn find_content<'a>(elements: &'a [Element], element_id: &str) -> Option<&'a str> {
    elements.iter().find_map(|element| match element {
        Element::Markdown(m) if m.element_id.as_deref() == Some(element_id) => {
            Some(m.content.as_str())
        }
        Element::CollapsiblePanel(p) => {
            find_content(std::slice::from_ref(p.header.title.as_ref()), element_id)
                .or_else(|| find_content(&p.elements, element_id))
        }
        Element::Button(b) if b.element_id == element_id => Some(b.text.content.as_str()),
        _ => None,
    })
}

fn contains_id(elements: &[Element], element_id: &str) -> bool {
    elements.iter().any(|element| {
        element.element_id() == Some(element_id)
            || match element {
                Element::CollapsiblePanel(p) => {
                    contains_id(std::slice::from_ref(p.header.title.as_ref()), element_id)
                        || contains_id(&p.elements, element_id)
                }
                _ => false,
            }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn meta<'a>(channels: &'a ChannelConfig, phase: DocumentPhase) -> DocumentMeta<'a> {
        DocumentMeta {
            session_id: SessionId::new(),
            prompt: "What is the refund policy?",
            sender_name: Some("Ada"),
            channels,
            phase,
        }
    }

    fn ids(card: &Card) -> Vec<String> {
        card.elements()
            .iter()
            .filter_map(|e| e.element_id().map(str::to_string))
            .collect()
    }

    #[test]
    fn initial_card_has_prompt_and_status() {
        let labels = Labels::default();
        let store = ChannelStore::new(&labels);
        let channels = ChannelConfig::default();
        let card = build_document(
            &store,
            &meta(&channels, DocumentPhase::Streaming { cancel_armed: false }),
            &labels,
        );

        assert_eq!(ids(&card), vec!["refer", "status"]);
        assert_eq!(
            card.element_content("refer"),
            Some("> Ada: What is the refund policy?")
        );
        assert!(card.is_streaming());
        assert!(card.config.streaming_config.is_some());
    }

    #[test]
    fn blocks_follow_channel_order() {
        let labels = Labels::default();
        let mut store = ChannelStore::new(&labels);
        for channel in [Channel::References, Channel::Answer, Channel::Thinking] {
            store.set_display(channel, format!("{channel} text"));
        }
        let channels = ChannelConfig::default();
        let card = build_document(
            &store,
            &meta(&channels, DocumentPhase::Streaming { cancel_armed: true }),
            &labels,
        );

        assert_eq!(
            ids(&card),
            vec!["refer", "status", "answer", "references_panel", "stop_button"]
        );
        assert_eq!(card.element_content("think_content"), Some("thinking text"));
        assert_eq!(card.element_content("think"), Some(labels.thinking_title.as_str()));
        assert_eq!(
            card.element_content("answer"),
            Some("**Answer**\n\nanswer text")
        );
        assert!(card.contains_element("references_content"));
    }

    #[test]
    fn hidden_channels_are_skipped() {
        let labels = Labels::default();
        let mut store = ChannelStore::new(&labels);
        store.set_display(Channel::Thinking, "hmm".to_string());
        let channels = ChannelConfig::answer_only();
        let card = build_document(
            &store,
            &meta(&channels, DocumentPhase::Streaming { cancel_armed: false }),
            &labels,
        );
        assert!(!card.contains_element("think_content"));
    }

    #[test]
    fn terminal_card_drops_stop_button_and_streaming() {
        let labels = Labels::default();
        let mut store = ChannelStore::new(&labels);
        store.set_display(Channel::Answer, "42".to_string());
        let channels = ChannelConfig::default();
        let card = build_document(
            &store,
            &meta(
                &channels,
                DocumentPhase::Terminal {
                    summary: "42".to_string(),
                },
            ),
            &labels,
        );

        assert!(!card.contains_element(STOP_BUTTON_ELEMENT_ID));
        assert!(!card.is_streaming());
        assert!(card.config.streaming_config.is_none());
        assert_eq!(card.config.summary.content, "42");
    }

    #[test]
    fn stop_button_carries_session_id() {
        let labels = Labels::default();
        let store = ChannelStore::new(&labels);
        let channels = ChannelConfig::default();
        let m = meta(&channels, DocumentPhase::Streaming { cancel_armed: true });
        let card = build_document(&store, &m, &labels);
        let json = card.to_json().unwrap();
        assert!(json.contains(&m.session_id.to_string()));
        assert!(json.contains("\"tag\":\"button\""));
    }

    #[test]
    fn wire_format_uses_tags() {
        let labels = Labels::default();
        let mut store = ChannelStore::new(&labels);
        store.set_display(Channel::Thinking, "step".to_string());
        let channels = ChannelConfig::default();
        let card = build_document(
            &store,
            &meta(&channels, DocumentPhase::Streaming { cancel_armed: false }),
            &labels,
        );
        let value = serde_json::to_value(&card).unwrap();
        assert_eq!(value["schema"], "2.0");
        assert_eq!(value["body"]["elements"][1]["tag"], "hr");
        assert_eq!(value["body"]["elements"][4]["tag"], "collapsible_panel");
        assert_eq!(
            value["body"]["elements"][4]["header"]["title"]["tag"],
            "markdown"
        );

        let back: Card = serde_json::from_value(value).unwrap();
        assert_eq!(back, card);
    }

    #[test]
    fn references_are_numbered_and_truncated() {
        let labels = Labels::default();
        let long = "x".repeat(REFERENCE_PREVIEW_CHARS + 10);
        let refs = vec![
            Reference::new("a.pdf", "short").with_module("kb"),
            Reference::new("b.pdf", long),
        ];
        let text = format_references(&refs, &[Some("https://p/1".to_string()), None], &labels);

        assert!(text.starts_with("**1. a.pdf**"));
        assert!(text.contains("**2. b.pdf**"));
        assert!(text.contains("(https://p/1)"));
        assert!(text.contains(&format!("{}...", "x".repeat(REFERENCE_PREVIEW_CHARS))));
        assert_eq!(text.matches("---").count(), 1);
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé...");
        assert_eq!(truncate_chars("hi", 5), "hi");
    }
}
