//! Session supervisor
//!
//! Entry point of the engine. Starts one orchestrator task per reply,
//! keeps the registry of live sessions for out-of-band cancellation and
//! assembles each session's transform pipeline.

use crate::client::RenderClient;
use crate::error::EngineError;
use crate::orchestrator::{Collaborators, Orchestrator};
use crate::registry::{CancelFlag, SessionRegistry};
use crate::session::{ReplyRequest, SessionHandle};
use crate::upstream::UpstreamGenerator;
use cardstream_core::{ChannelConfig, EngineConfig, SessionId};
use cardstream_transform::{
    CitationResolver, ResourceRehoster, TemplateCitationResolver, TransformPipeline,
};
use std::sync::Arc;
use tracing::Instrument;

/// Starts and tracks render sessions
pub struct Supervisor {
    collaborators: Collaborators,
    rehoster: Option<Arc<dyn ResourceRehoster>>,
    resolver: Option<Arc<dyn CitationResolver>>,
    registry: SessionRegistry,
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("config", &self.collaborators.config)
            .field("rehoster", &self.rehoster.is_some())
            .field("resolver", &self.resolver.is_some())
            .field("active", &self.registry.len())
            .finish()
    }
}

impl Supervisor {
    /// Create supervisor
    ///
    /// # Errors
    /// - `EngineError::Config` if the configuration does not validate
    pub fn new(
        config: EngineConfig,
        client: Arc<dyn RenderClient>,
        generator: Arc<dyn UpstreamGenerator>,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let resolver = config.citation_preview_url.clone().map(|template| {
            Arc::new(TemplateCitationResolver::new(template)) as Arc<dyn CitationResolver>
        });
        Ok(Self {
            collaborators: Collaborators {
                config: Arc::new(config),
                client,
                generator,
            },
            rehoster: None,
            resolver,
            registry: SessionRegistry::new(),
        })
    }

    /// With image rehosting collaborator
    #[inline]
    #[must_use]
    pub fn with_rehoster(mut self, rehoster: Arc<dyn ResourceRehoster>) -> Self {
        self.rehoster = Some(rehoster);
        self
    }

    /// With citation resolver, replacing the template resolver
    #[inline]
    #[must_use]
    pub fn with_citation_resolver(mut self, resolver: Arc<dyn CitationResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Engine configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.collaborators.config
    }

    /// Registry of live sessions
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Start rendering a reply
    ///
    /// Must be called from within a tokio runtime. The session is
    /// registered before this returns and unregistered when its task ends,
    /// however it ends.
    pub fn start_session(
        &self,
        request: impl Into<ReplyRequest>,
        channels: ChannelConfig,
    ) -> SessionHandle {
        let request = request.into();
        let session_id = SessionId::new();
        let cancel = CancelFlag::new();
        let guard = self.registry.register(session_id, cancel.clone());

        let pipeline = self.pipeline(&channels);
        let orchestrator = Orchestrator::new(
            self.collaborators.clone(),
            session_id,
            request,
            channels,
            pipeline,
            cancel.clone(),
        );

        let span = tracing::info_span!("session", session = %session_id);
        let task = tokio::spawn(
            async move {
                let _guard = guard;
                orchestrator.run().await
            }
            .instrument(span),
        );
        SessionHandle::new(session_id, cancel, task)
    }

    /// Request cancellation of a live session by id
    ///
    /// Returns `false` if the session is unknown, finished or already
    /// cancelled.
    pub fn request_cancel(&self, session_id: SessionId) -> bool {
        let cancelled = self.registry.cancel(session_id);
        tracing::info!(session = %session_id, cancelled, "cancel requested");
        cancelled
    }

    /// Ids of sessions still running
    #[must_use]
    pub fn active_sessions(&self) -> Vec<SessionId> {
        self.registry.session_ids()
    }

    fn pipeline(&self, channels: &ChannelConfig) -> TransformPipeline {
        let config = &self.collaborators.config;
        let mut pipeline = TransformPipeline::passthrough();
        if channels.rewrite_resources {
            if let Some(rehoster) = &self.rehoster {
                pipeline =
                    pipeline.with_resources(Arc::clone(rehoster), config.asset_base_url.clone());
            }
        }
        if channels.resolve_citations {
            if let Some(resolver) = &self.resolver {
                pipeline = pipeline.with_citations(Arc::clone(resolver));
            }
        }
        pipeline
    }
}
