//! Cardstream Core - channel state and card model
//!
//! Building blocks shared by the transform pipeline and the render engine:
//! - Semantic [`Channel`]s and their per-session [`ChannelStore`]
//! - Per-session [`SequenceAllocator`] for strictly increasing update numbers
//! - Session lifecycle with a validated transition table
//! - The card [`document`] model and its pure builder
//! - Engine and per-reply configuration
//!
//! # Example
//!
//! ```rust
//! use cardstream_core::{build_document, Channel, ChannelConfig, ChannelStore};
//! use cardstream_core::{DocumentMeta, DocumentPhase, Labels, SessionId};
//!
//! let labels = Labels::default();
//! let mut store = ChannelStore::new(&labels);
//! store.append(Channel::Answer, "Hello");
//! store.set_display(Channel::Answer, "Hello".to_string());
//!
//! let channels = ChannelConfig::default();
//! let meta = DocumentMeta {
//!     session_id: SessionId::new(),
//!     prompt: "hi",
//!     sender_name: None,
//!     channels: &channels,
//!     phase: DocumentPhase::Streaming { cancel_armed: false },
//! };
//! let card = build_document(&store, &meta, &labels);
//! assert_eq!(card.element_content("answer"), Some("**Answer**\n\nHello"));
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod channel;
pub mod config;
pub mod document;
pub mod error;
pub mod lifecycle;
pub mod sequence;
pub mod store;
pub mod types;

pub use channel::Channel;
pub use config::{ChannelConfig, EngineConfig, Labels};
pub use document::{
    build_document, element_content, format_references, truncate_chars, Card, DocumentMeta,
    DocumentPhase, Element,
};
pub use error::CoreError;
pub use lifecycle::{allowed_transitions, validate_transition, SessionState};
pub use sequence::SequenceAllocator;
pub use store::{ChannelState, ChannelStore};
pub use types::{ObjectId, Reference, SessionId};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with cardstream core
    pub use crate::{
        Card, Channel, ChannelConfig, ChannelStore, CoreError, EngineConfig, Labels, Reference,
        SessionId, SessionState,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
