//! Console render surface
//!
//! Logs every render call and enforces the same sequence rule a real
//! surface does, so ordering bugs show up as rejected calls.

use async_trait::async_trait;
use cardstream_core::{Card, ObjectId};
use cardstream_engine::{RenderClient, RenderError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Default)]
struct ObjectState {
    last_sequence: Option<u64>,
    card: Option<Card>,
    patches: u64,
    rebuilds: u64,
}

/// What the surface saw for one card
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceSummary {
    pub object_id: ObjectId,
    pub patches: u64,
    pub rebuilds: u64,
    pub last_sequence: Option<u64>,
    pub card: Option<Card>,
}

/// Render surface that prints to the log
#[derive(Debug, Default)]
pub struct ConsoleSurface {
    latency: Duration,
    created: Mutex<u64>,
    objects: Mutex<HashMap<ObjectId, ObjectState>>,
}

impl ConsoleSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Summary of a created card
    pub fn summary(&self, object_id: &ObjectId) -> Option<SurfaceSummary> {
        let objects = self.objects.lock();
        objects.get(object_id).map(|state| SurfaceSummary {
            object_id: object_id.clone(),
            patches: state.patches,
            rebuilds: state.rebuilds,
            last_sequence: state.last_sequence,
            card: state.card.clone(),
        })
    }

    async fn delay(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    fn accept(
        &self,
        object_id: &ObjectId,
        sequence: u64,
        apply: impl FnOnce(&mut ObjectState),
    ) -> Result<(), RenderError> {
        let mut objects = self.objects.lock();
        let state = objects.get_mut(object_id).ok_or_else(|| RenderError::Rejected {
            code: 404,
            message: format!("unknown card {object_id}"),
        })?;
        if state.last_sequence.is_some_and(|last| sequence <= last) {
            tracing::warn!(
                object = %object_id,
                sequence,
                last = ?state.last_sequence,
                "sequence rejected"
            );
            return Err(RenderError::SequenceRejected { sequence });
        }
        state.last_sequence = Some(sequence);
        apply(state);
        Ok(())
    }
}

#[async_trait]
impl RenderClient for ConsoleSurface {
    async fn create(&self, card: &Card) -> Result<ObjectId, RenderError> {
        self.delay().await;
        let number = {
            let mut created = self.created.lock();
            *created += 1;
            *created
        };
        let object_id = ObjectId::new(format!("card_{number}"));
        self.objects.lock().insert(
            object_id.clone(),
            ObjectState {
                card: Some(card.clone()),
                ..ObjectState::default()
            },
        );
        tracing::info!(object = %object_id, elements = card.elements().len(), "create");
        Ok(object_id)
    }

    async fn patch_element(
        &self,
        object_id: &ObjectId,
        element_id: &str,
        content: &str,
        sequence: u64,
    ) -> Result<(), RenderError> {
        self.delay().await;
        self.accept(object_id, sequence, |state| state.patches += 1)?;
        tracing::info!(
            object = %object_id,
            sequence,
            element = element_id,
            chars = content.chars().count(),
            "patch"
        );
        tracing::debug!(element = element_id, %content, "patched content");
        Ok(())
    }

    async fn replace_all(
        &self,
        object_id: &ObjectId,
        card: &Card,
        sequence: u64,
    ) -> Result<(), RenderError> {
        self.delay().await;
        self.accept(object_id, sequence, |state| {
            state.rebuilds += 1;
            state.card = Some(card.clone());
        })?;
        tracing::info!(
            object = %object_id,
            sequence,
            elements = card.elements().len(),
            streaming = card.is_streaming(),
            "replace_all"
        );
        Ok(())
    }
}
