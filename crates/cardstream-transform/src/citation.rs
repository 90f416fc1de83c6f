//! Citation marker rewriter
//!
//! Turns `[<quote_id>](CITE)` markers into numbered preview links. Numbers
//! follow the first appearance of each resolved id in the text, so they stay
//! put as the answer grows.

use crate::cache::TransformCache;
use crate::traits::{CitationContext, CitationResolver};
use futures::future::join_all;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::collections::HashMap;
use std::sync::Arc;

static CITE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[([A-Za-z0-9_-]+)\]\(CITE\)").expect("citation regex"));

/// Rewrites citation markers through a [`CitationResolver`]
#[derive(Clone)]
pub struct CitationRewriter {
    resolver: Arc<dyn CitationResolver>,
    cache: TransformCache,
}

impl std::fmt::Debug for CitationRewriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CitationRewriter")
            .field("cache", &self.cache.stats())
            .finish_non_exhaustive()
    }
}

impl CitationRewriter {
    /// Create rewriter with a session cache
    #[must_use]
    pub fn new(resolver: Arc<dyn CitationResolver>, cache: TransformCache) -> Self {
        Self { resolver, cache }
    }

    /// Session cache
    #[inline]
    #[must_use]
    pub fn cache(&self) -> &TransformCache {
        &self.cache
    }

    /// Rewrite every complete citation marker in `text`
    ///
    /// Markers whose resolution fails are removed from this pass and take
    /// no number, so the visible numbers have no gaps.
    pub async fn rewrite(&self, text: &str, context: &CitationContext) -> String {
        let mut order: Vec<&str> = Vec::new();
        for caps in CITE_RE.captures_iter(text) {
            if let Some(id) = caps.get(1).map(|m| m.as_str()) {
                if !order.contains(&id) {
                    order.push(id);
                }
            }
        }
        if order.is_empty() {
            return text.to_string();
        }

        let lookups = order.iter().map(|id| async move {
            let result = self
                .cache
                .resolve(id, || self.resolver.resolve(id, context))
                .await;
            (*id, result)
        });
        let links: HashMap<&str, (usize, String)> = join_all(lookups)
            .await
            .into_iter()
            .filter_map(|(id, result)| match result {
                Ok(link) => Some((id, link)),
                Err(err) => {
                    tracing::debug!(citation = id, error = %err, "citation unresolved");
                    None
                }
            })
            .enumerate()
            .map(|(i, (id, link))| (id, (i + 1, link)))
            .collect();

        CITE_RE
            .replace_all(text, |caps: &Captures<'_>| match links.get(&caps[1]) {
                Some((number, link)) => format!("[[{number}]]({link})"),
                None => String::new(),
            })
            .into_owned()
    }
}
