//! Cardstream Transform - content rewriting with session-scoped caches
//!
//! Answer text passes through two rewriters before it is shown:
//!
//! ```text
//! raw answer → ResourceRewriter → CitationRewriter → display answer
//!                   ↓                    ↓
//!            TransformCache        TransformCache
//!                   ↓                    ↓
//!           ResourceRehoster      CitationResolver
//! ```
//!
//! Each distinct image locator or citation id is looked up at most once per
//! session; concurrent lookups of the same key share one call.

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod cache;
pub mod citation;
pub mod error;
pub mod pipeline;
pub mod resource;
pub mod traits;

pub use cache::{CacheStats, TransformCache};
pub use citation::CitationRewriter;
pub use error::TransformError;
pub use pipeline::TransformPipeline;
pub use resource::ResourceRewriter;
pub use traits::{CitationContext, CitationResolver, ResourceRehoster, TemplateCitationResolver};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
