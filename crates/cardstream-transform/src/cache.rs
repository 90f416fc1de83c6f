//! Session-scoped transform cache using moka
//!
//! Maps a text fragment key (image locator, citation id) to its resolved
//! replacement. Concurrent lookups of an unresolved key share one
//! computation; failures are not stored. Entries are never evicted, so a
//! key resolves at most once for the lifetime of the cache.

use crate::error::TransformError;
use moka::future::Cache;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Statistics for cache monitoring
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of resolved entries
    pub entry_count: u64,
    /// Number of computations started
    pub computations: u64,
    /// Number of computations that failed
    pub failures: u64,
}

/// Key to replacement cache with in-flight deduplication
#[derive(Debug, Clone)]
pub struct TransformCache {
    inner: Cache<String, String>,
    computations: Arc<AtomicU64>,
    failures: Arc<AtomicU64>,
}

impl TransformCache {
    /// Create an unbounded cache
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Cache::builder().build(),
            computations: Arc::new(AtomicU64::new(0)),
            failures: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Get a resolved value without computing
    #[inline]
    pub async fn get(&self, key: &str) -> Option<String> {
        self.inner.get(key).await
    }

    /// Resolve `key`, running `compute` only if no value is cached and no
    /// computation for it is in flight
    ///
    /// Callers that arrive while a computation is in flight wait for it and
    /// receive the same result.
    pub async fn resolve<F, Fut>(
        &self,
        key: &str,
        compute: F,
    ) -> Result<String, Arc<TransformError>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String, TransformError>>,
    {
        if let Some(hit) = self.inner.get(key).await {
            return Ok(hit);
        }

        let computations = Arc::clone(&self.computations);
        let failures = Arc::clone(&self.failures);
        self.inner
            .try_get_with(key.to_string(), async move {
                computations.fetch_add(1, Ordering::Relaxed);
                let result = compute().await;
                if result.is_err() {
                    failures.fetch_add(1, Ordering::Relaxed);
                }
                result
            })
            .await
    }

    /// Check if cache holds a resolved value for `key`
    #[inline]
    pub async fn contains(&self, key: &str) -> bool {
        self.inner.get(key).await.is_some()
    }

    /// Get cache statistics
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entry_count: self.inner.entry_count(),
            computations: self.computations.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

impl Default for TransformCache {
    fn default() -> Self {
        Self::new()
    }
}
