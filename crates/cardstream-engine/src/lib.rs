//! Cardstream Engine - incremental card rendering for streamed replies
//!
//! Consumes a reply's upstream event stream and keeps one card on a remote
//! render surface up to date:
//! - Per-channel debouncing with a mandatory flush before termination
//! - One structural rebuild per channel, patches otherwise
//! - Strictly increasing sequence numbers through a single dispatch queue
//! - Cooperative cancellation through a process-wide session registry
//!
//! # Architecture
//!
//! ```text
//! UpstreamGenerator ─► Orchestrator ─► UpdateScheduler ─► Dispatcher ─► RenderClient
//!                          │   ▲                              │
//!                          ▼   │                        SequenceAllocator
//!                    TransformPipeline
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use cardstream_engine::Supervisor;
//! use cardstream_core::{ChannelConfig, EngineConfig};
//!
//! # async fn example(client: Arc<dyn RenderClient>, generator: Arc<dyn UpstreamGenerator>)
//! #     -> Result<(), Box<dyn std::error::Error>> {
//! let supervisor = Supervisor::new(EngineConfig::default(), client, generator)?;
//! let handle = supervisor.start_session("What is the refund policy?", ChannelConfig::default());
//!
//! let answer = handle.await_result().await?;
//! println!("{answer}");
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod client;
pub mod dispatch;
pub mod error;
mod orchestrator;
pub mod registry;
pub mod scheduler;
pub mod session;
pub mod supervisor;
pub mod upstream;

pub use client::{RenderClient, RenderOp};
pub use dispatch::{DispatchStats, Dispatcher};
pub use error::{EngineError, RenderError, UpstreamError};
pub use registry::{CancelFlag, RegistrationGuard, SessionRegistry};
pub use scheduler::{Decision, UpdateScheduler};
pub use session::{ReplyRequest, SessionHandle, SessionOutcome};
pub use supervisor::Supervisor;
pub use upstream::{
    EventStream, HttpGenerator, HttpGeneratorConfig, Progress, UpstreamEvent, UpstreamGenerator,
    UpstreamRequest,
};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with the engine
    pub use crate::{
        RenderClient, ReplyRequest, SessionHandle, SessionOutcome, Supervisor, UpstreamEvent,
        UpstreamGenerator,
    };
    pub use cardstream_core::prelude::*;
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
