//! Ordered delivery of render operations
//!
//! Every outgoing operation gets its sequence number and its place in the
//! queue under one lock, and a single worker task submits them one at a
//! time. Submission order therefore always equals sequence order.

use crate::client::{RenderClient, RenderOp};
use cardstream_core::{ObjectId, SequenceAllocator, SessionId};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Delivery counters for one session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Operations the surface accepted
    pub delivered: u64,
    /// Operations that failed for transport or rejection reasons
    pub failed: u64,
    /// Operations dropped because their sequence was refused
    pub dropped: u64,
    /// Highest sequence submitted
    pub last_sequence: Option<u64>,
}

#[derive(Debug)]
struct Submission {
    sequence: u64,
    op: RenderOp,
}

/// Single-consumer dispatch queue for one card
#[derive(Debug)]
pub struct Dispatcher {
    session_id: SessionId,
    allocator: SequenceAllocator,
    tx: mpsc::UnboundedSender<Submission>,
    worker: JoinHandle<DispatchStats>,
}

impl Dispatcher {
    /// Start the worker for `object_id`; sequences start at `base`
    #[must_use]
    pub fn spawn(
        session_id: SessionId,
        client: Arc<dyn RenderClient>,
        object_id: ObjectId,
        base: u64,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = tokio::spawn(run_worker(session_id, client, object_id, rx));
        Self {
            session_id,
            allocator: SequenceAllocator::new(base),
            tx,
            worker,
        }
    }

    /// Queue an operation and return the sequence it was given
    ///
    /// Returns `None` if the worker is gone; the number is still consumed.
    pub fn submit(&self, op: RenderOp) -> Option<u64> {
        let kind = op.kind();
        self.allocator.issue(|sequence| {
            match self.tx.send(Submission { sequence, op }) {
                Ok(()) => {
                    tracing::trace!(session = %self.session_id, sequence, kind, "queued");
                    Some(sequence)
                }
                Err(_) => {
                    tracing::warn!(
                        session = %self.session_id,
                        sequence,
                        kind,
                        "dispatch worker gone"
                    );
                    None
                }
            }
        })
    }

    /// Numbers handed out so far
    #[inline]
    #[must_use]
    pub fn issued(&self) -> u64 {
        self.allocator.issued()
    }

    /// Close the queue and wait until every queued operation was submitted
    pub async fn close(self) -> DispatchStats {
        drop(self.tx);
        match self.worker.await {
            Ok(stats) => stats,
            Err(err) => {
                tracing::error!(session = %self.session_id, error = %err, "dispatch worker failed");
                DispatchStats::default()
            }
        }
    }
}

async fn run_worker(
    session_id: SessionId,
    client: Arc<dyn RenderClient>,
    object_id: ObjectId,
    mut rx: mpsc::UnboundedReceiver<Submission>,
) -> DispatchStats {
    let mut stats = DispatchStats::default();

    while let Some(Submission { sequence, op }) = rx.recv().await {
        if stats.last_sequence.is_some_and(|last| sequence <= last) {
            tracing::warn!(session = %session_id, sequence, "dropping out-of-order update");
            stats.dropped += 1;
            continue;
        }
        stats.last_sequence = Some(sequence);

        let result = match &op {
            RenderOp::Patch {
                element_id,
                content,
            } => {
                client
                    .patch_element(&object_id, element_id, content, sequence)
                    .await
            }
            RenderOp::ReplaceAll(card) => client.replace_all(&object_id, card, sequence).await,
        };

        match result {
            Ok(()) => {
                tracing::debug!(session = %session_id, sequence, kind = op.kind(), "delivered");
                stats.delivered += 1;
            }
            Err(err) if err.is_sequence_violation() => {
                tracing::warn!(session = %session_id, sequence, error = %err, "update dropped");
                stats.dropped += 1;
            }
            Err(err) => {
                tracing::warn!(session = %session_id, sequence, error = %err, "update failed");
                stats.failed += 1;
            }
        }
    }

    stats
}
