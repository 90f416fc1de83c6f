//! Collaborators the rewriters call out to

use crate::error::TransformError;
use async_trait::async_trait;
use cardstream_core::{Reference, SessionId};

/// Moves an image to storage the render surface can display
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ResourceRehoster: Send + Sync {
    /// Return the surface-hosted locator for `locator`
    async fn relocate(&self, locator: &str) -> Result<String, TransformError>;
}

/// Turns a citation id into a preview link
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CitationResolver: Send + Sync {
    /// Return the preview link for `citation_id`
    async fn resolve(
        &self,
        citation_id: &str,
        context: &CitationContext,
    ) -> Result<String, TransformError>;
}

/// What a resolver may consult besides the id
#[derive(Debug, Clone, Default)]
pub struct CitationContext {
    /// Session the citation appears in
    pub session_id: SessionId,
    /// References received so far
    pub references: Vec<Reference>,
}

impl CitationContext {
    /// Create context for a session
    #[inline]
    #[must_use]
    pub fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            references: Vec::new(),
        }
    }

    /// With known references
    #[inline]
    #[must_use]
    pub fn with_references(mut self, references: Vec<Reference>) -> Self {
        self.references = references;
        self
    }

    /// Reference whose chunk id is `quote_id`
    #[must_use]
    pub fn reference(&self, quote_id: &str) -> Option<&Reference> {
        self.references
            .iter()
            .find(|r| r.quote_id.as_deref() == Some(quote_id))
    }
}

/// Resolver that fills a URL template from the matching reference
///
/// `{quote_id}` is replaced by the citation id and `{collection_id}` by the
/// collection of the reference carrying that id. A template that needs the
/// collection fails with [`TransformError::UnknownCitation`] until that
/// reference is known.
#[derive(Debug, Clone)]
pub struct TemplateCitationResolver {
    template: String,
}

impl TemplateCitationResolver {
    /// Create resolver from a template
    #[inline]
    #[must_use]
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }
}

#[async_trait]
impl CitationResolver for TemplateCitationResolver {
    async fn resolve(
        &self,
        citation_id: &str,
        context: &CitationContext,
    ) -> Result<String, TransformError> {
        let link = self.template.replace("{quote_id}", citation_id);
        if !link.contains("{collection_id}") {
            return Ok(link);
        }
        let collection = context
            .reference(citation_id)
            .and_then(|r| r.collection_id.as_deref())
            .ok_or_else(|| TransformError::UnknownCitation(citation_id.to_string()))?;
        Ok(link.replace("{collection_id}", collection))
    }
}
