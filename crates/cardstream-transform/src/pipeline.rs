//! Per-session transform pipeline for the answer channel

use crate::cache::{CacheStats, TransformCache};
use crate::citation::CitationRewriter;
use crate::resource::ResourceRewriter;
use crate::traits::{CitationContext, CitationResolver, ResourceRehoster};
use std::sync::Arc;

/// Resource rewrite followed by citation rewrite
///
/// Each stage owns its own session-scoped cache and is skipped when not
/// configured.
#[derive(Debug, Clone, Default)]
pub struct TransformPipeline {
    resources: Option<ResourceRewriter>,
    citations: Option<CitationRewriter>,
}

impl TransformPipeline {
    /// Pipeline that returns text unchanged
    #[inline]
    #[must_use]
    pub fn passthrough() -> Self {
        Self::default()
    }

    /// With image rehosting
    #[must_use]
    pub fn with_resources(
        mut self,
        rehoster: Arc<dyn ResourceRehoster>,
        base_url: Option<String>,
    ) -> Self {
        self.resources =
            Some(ResourceRewriter::new(rehoster, TransformCache::new()).with_base_url(base_url));
        self
    }

    /// With citation resolution
    #[must_use]
    pub fn with_citations(mut self, resolver: Arc<dyn CitationResolver>) -> Self {
        self.citations = Some(CitationRewriter::new(resolver, TransformCache::new()));
        self
    }

    /// Whether any stage is configured
    #[inline]
    #[must_use]
    pub fn is_passthrough(&self) -> bool {
        self.resources.is_none() && self.citations.is_none()
    }

    /// Produce display text from raw text
    pub async fn apply(&self, raw: &str, context: &CitationContext) -> String {
        let mut text = match &self.resources {
            Some(resources) => resources.rewrite(raw).await,
            None => raw.to_string(),
        };
        if let Some(citations) = &self.citations {
            text = citations.rewrite(&text, context).await;
        }
        text
    }

    /// Statistics of (resource, citation) caches
    #[must_use]
    pub fn stats(&self) -> (CacheStats, CacheStats) {
        (
            self.resources
                .as_ref()
                .map(|r| r.cache().stats())
                .unwrap_or_default(),
            self.citations
                .as_ref()
                .map(|c| c.cache().stats())
                .unwrap_or_default(),
        )
    }
}
