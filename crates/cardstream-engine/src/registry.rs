//! Process-wide session registry
//!
//! Maps live session ids to their cancel flags so cancel requests arriving
//! out of band (a card button callback) reach the right session. Entries
//! are removed by [`RegistrationGuard`] on every exit path.

use cardstream_core::SessionId;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct CancelInner {
    flag: AtomicBool,
    notify: Notify,
}

/// Cooperative cancellation flag shared by a session and its requesters
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    inner: Arc<CancelInner>,
}

impl CancelFlag {
    /// Create an unset flag
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the flag; returns `true` only for the first request
    pub fn cancel(&self) -> bool {
        let first = !self.inner.flag.swap(true, Ordering::SeqCst);
        if first {
            self.inner.notify.notify_waiters();
        }
        first
    }

    /// Whether cancellation was requested
    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.flag.load(Ordering::SeqCst)
    }

    /// Resolve once cancellation is requested
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// Live sessions and their cancel flags
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    entries: Arc<DashMap<SessionId, CancelFlag>>,
}

impl SessionRegistry {
    /// Create empty registry
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session; the entry lives as long as the guard
    #[must_use]
    pub fn register(&self, session_id: SessionId, flag: CancelFlag) -> RegistrationGuard {
        self.entries.insert(session_id, flag);
        tracing::debug!(session = %session_id, active = self.entries.len(), "session registered");
        RegistrationGuard {
            session_id,
            entries: Arc::clone(&self.entries),
        }
    }

    /// Request cancellation of a live session
    ///
    /// Returns `false` if the session is unknown or already cancelled.
    pub fn cancel(&self, session_id: SessionId) -> bool {
        self.entries
            .get(&session_id)
            .is_some_and(|flag| flag.cancel())
    }

    /// Whether a session is live
    #[inline]
    #[must_use]
    pub fn contains(&self, session_id: SessionId) -> bool {
        self.entries.contains_key(&session_id)
    }

    /// Ids of live sessions
    #[must_use]
    pub fn session_ids(&self) -> Vec<SessionId> {
        self.entries.iter().map(|entry| *entry.key()).collect()
    }

    /// Number of live sessions
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no session is live
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Removes a session's registry entry when dropped
#[derive(Debug)]
pub struct RegistrationGuard {
    session_id: SessionId,
    entries: Arc<DashMap<SessionId, CancelFlag>>,
}

impl RegistrationGuard {
    /// Session this guard belongs to
    #[inline]
    #[must_use]
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }
}

impl Drop for RegistrationGuard {
    fn drop(&mut self) {
        self.entries.remove(&self.session_id);
        tracing::debug!(session = %self.session_id, "session unregistered");
    }
}
