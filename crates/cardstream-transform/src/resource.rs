//! Image rehosting rewriter
//!
//! Rewrites `![alt](locator)` so the image points at surface-hosted
//! storage. Locators already hosted (`img_` prefix) are left alone.

use crate::cache::TransformCache;
use crate::error::TransformError;
use crate::traits::ResourceRehoster;
use futures::future::join_all;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::collections::HashMap;
use std::sync::Arc;

static IMAGE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"!\[([^\]]*)\]\(([^)\s]+)\)").expect("image regex"));

const HOSTED_PREFIX: &str = "img_";

/// Rewrites markdown images through a [`ResourceRehoster`]
#[derive(Clone)]
pub struct ResourceRewriter {
    rehoster: Arc<dyn ResourceRehoster>,
    cache: TransformCache,
    base_url: Option<String>,
}

impl std::fmt::Debug for ResourceRewriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceRewriter")
            .field("base_url", &self.base_url)
            .field("cache", &self.cache.stats())
            .finish_non_exhaustive()
    }
}

impl ResourceRewriter {
    /// Create rewriter with a session cache
    #[must_use]
    pub fn new(rehoster: Arc<dyn ResourceRehoster>, cache: TransformCache) -> Self {
        Self {
            rehoster,
            cache,
            base_url: None,
        }
    }

    /// With base URL joined to relative (`/...`) locators
    #[inline]
    #[must_use]
    pub fn with_base_url(mut self, base_url: Option<String>) -> Self {
        self.base_url = base_url;
        self
    }

    /// Session cache
    #[inline]
    #[must_use]
    pub fn cache(&self) -> &TransformCache {
        &self.cache
    }

    /// Rewrite every complete image in `text`
    ///
    /// Images whose rehost fails are dropped from this pass.
    pub async fn rewrite(&self, text: &str) -> String {
        let mut pending: Vec<&str> = IMAGE_RE
            .captures_iter(text)
            .filter_map(|caps| caps.get(2).map(|m| m.as_str()))
            .filter(|locator| !locator.starts_with(HOSTED_PREFIX))
            .collect();
        if pending.is_empty() {
            return text.to_string();
        }
        pending.sort_unstable();
        pending.dedup();

        let lookups = pending.iter().map(|locator| async move {
            let result = self
                .cache
                .resolve(locator, || self.relocate(locator))
                .await;
            (*locator, result)
        });
        let resolved: HashMap<&str, Option<String>> = join_all(lookups)
            .await
            .into_iter()
            .map(|(locator, result)| match result {
                Ok(new_locator) => (locator, Some(new_locator)),
                Err(err) => {
                    tracing::warn!(locator, error = %err, "image rehost failed");
                    (locator, None)
                }
            })
            .collect();

        IMAGE_RE
            .replace_all(text, |caps: &Captures<'_>| {
                let locator = &caps[2];
                if locator.starts_with(HOSTED_PREFIX) {
                    return caps[0].to_string();
                }
                match resolved.get(locator) {
                    Some(Some(new_locator)) => format!("![{}]({new_locator})", &caps[1]),
                    _ => String::new(),
                }
            })
            .into_owned()
    }

    async fn relocate(&self, locator: &str) -> Result<String, TransformError> {
        let target = match (&self.base_url, locator.starts_with('/')) {
            (Some(base), true) => format!("{}{locator}", base.trim_end_matches('/')),
            _ => locator.to_string(),
        };
        tracing::debug!(locator, %target, "rehosting image");
        self.rehoster.relocate(&target).await
    }
}
