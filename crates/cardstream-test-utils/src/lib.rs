//! Testing utilities for cardstream workspace
//!
//! Hand-written fakes for the engine's collaborators: a render client that
//! records every call, a generator that plays back a script, and transform
//! collaborators that count their calls.

#![allow(missing_docs)]

use async_trait::async_trait;
use cardstream_core::{Card, Channel, ObjectId};
use cardstream_engine::{
    EventStream, RenderClient, RenderError, UpstreamError, UpstreamEvent, UpstreamGenerator,
    UpstreamRequest,
};
use cardstream_transform::{CitationContext, CitationResolver, ResourceRehoster, TransformError};
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

// ---------------------------------------------------------------------------
// Render client
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum RenderCall {
    Create {
        card: Card,
    },
    Patch {
        element_id: String,
        content: String,
        sequence: u64,
    },
    ReplaceAll {
        card: Card,
        sequence: u64,
    },
}

impl RenderCall {
    pub fn sequence(&self) -> Option<u64> {
        match self {
            Self::Create { .. } => None,
            Self::Patch { sequence, .. } | Self::ReplaceAll { sequence, .. } => Some(*sequence),
        }
    }

    pub fn card(&self) -> Option<&Card> {
        match self {
            Self::Create { card } | Self::ReplaceAll { card, .. } => Some(card),
            Self::Patch { .. } => None,
        }
    }
}

/// Render client that records calls and can inject failures
#[derive(Debug, Default)]
pub struct RecordingRenderClient {
    calls: Mutex<Vec<RenderCall>>,
    latency: Duration,
    fail_create: bool,
    rejected: Mutex<HashSet<u64>>,
}

impl RecordingRenderClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call sleeps this long before answering
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// `create` fails with a transport error
    #[must_use]
    pub fn failing_create(mut self) -> Self {
        self.fail_create = true;
        self
    }

    /// Calls carrying `sequence` are rejected as stale
    pub fn reject_sequence(&self, sequence: u64) {
        self.rejected.lock().insert(sequence);
    }

    pub fn calls(&self) -> Vec<RenderCall> {
        self.calls.lock().clone()
    }

    /// Sequence numbers in submission order
    pub fn sequences(&self) -> Vec<u64> {
        self.calls().iter().filter_map(RenderCall::sequence).collect()
    }

    /// `(element_id, content)` of every patch
    pub fn patches(&self) -> Vec<(String, String)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                RenderCall::Patch {
                    element_id,
                    content,
                    ..
                } => Some((element_id, content)),
                _ => None,
            })
            .collect()
    }

    /// Patches targeting one channel's body element
    pub fn patches_for(&self, channel: Channel) -> Vec<String> {
        self.patches()
            .into_iter()
            .filter(|(id, _)| id == channel.element_id())
            .map(|(_, content)| content)
            .collect()
    }

    /// Cards sent with `replace_all`
    pub fn rebuilds(&self) -> Vec<Card> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                RenderCall::ReplaceAll { card, .. } => Some(card),
                _ => None,
            })
            .collect()
    }

    /// Streaming rebuilds in which `element_id` first appears
    pub fn structural_rebuilds_for(&self, element_id: &str) -> usize {
        let mut seen = self
            .calls()
            .first()
            .and_then(RenderCall::card)
            .is_some_and(|card| card.contains_element(element_id));
        let mut count = 0;
        for card in self.rebuilds() {
            let present = card.contains_element(element_id);
            if present && !seen && card.is_streaming() {
                count += 1;
            }
            seen |= present;
        }
        count
    }

    /// Last card sent with `replace_all`
    pub fn final_card(&self) -> Option<Card> {
        self.rebuilds().pop()
    }

    fn record(&self, call: RenderCall) -> Result<(), RenderError> {
        let rejected = call
            .sequence()
            .is_some_and(|sequence| self.rejected.lock().contains(&sequence));
        let sequence = call.sequence();
        self.calls.lock().push(call);
        match sequence {
            Some(sequence) if rejected => Err(RenderError::SequenceRejected { sequence }),
            _ => Ok(()),
        }
    }

    async fn delay(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

#[async_trait]
impl RenderClient for RecordingRenderClient {
    async fn create(&self, card: &Card) -> Result<ObjectId, RenderError> {
        self.delay().await;
        if self.fail_create {
            return Err(RenderError::Transport("surface unavailable".to_string()));
        }
        self.record(RenderCall::Create { card: card.clone() })?;
        Ok(ObjectId::new("card_1"))
    }

    async fn patch_element(
        &self,
        _object_id: &ObjectId,
        element_id: &str,
        content: &str,
        sequence: u64,
    ) -> Result<(), RenderError> {
        self.delay().await;
        self.record(RenderCall::Patch {
            element_id: element_id.to_string(),
            content: content.to_string(),
            sequence,
        })
    }

    async fn replace_all(
        &self,
        _object_id: &ObjectId,
        card: &Card,
        sequence: u64,
    ) -> Result<(), RenderError> {
        self.delay().await;
        self.record(RenderCall::ReplaceAll {
            card: card.clone(),
            sequence,
        })
    }
}

// ---------------------------------------------------------------------------
// Upstream generator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum Step {
    Event(UpstreamEvent),
    Delay(Duration),
    Error(UpstreamError),
    /// Never yield again
    Hang,
}

/// Generator that plays back a fixed script
#[derive(Debug, Default)]
pub struct ScriptedGenerator {
    steps: Vec<Step>,
    open_error: Option<UpstreamError>,
    requests: Mutex<Vec<UpstreamRequest>>,
}

impl ScriptedGenerator {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps,
            ..Self::default()
        }
    }

    /// Generator whose `stream` call fails
    pub fn failing(err: UpstreamError) -> Self {
        Self {
            open_error: Some(err),
            ..Self::default()
        }
    }

    /// Answer snapshots separated by `gap`, then completion
    pub fn answer_snapshots(snapshots: &[&str], gap: Duration) -> Self {
        let mut steps = Vec::new();
        for text in snapshots {
            steps.push(Step::Event(UpstreamEvent::snapshot(Channel::Answer, *text)));
            steps.push(Step::Delay(gap));
        }
        steps.push(Step::Event(UpstreamEvent::Completed));
        Self::new(steps)
    }

    pub fn requests(&self) -> Vec<UpstreamRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl UpstreamGenerator for ScriptedGenerator {
    async fn stream(&self, request: UpstreamRequest) -> Result<EventStream, UpstreamError> {
        self.requests.lock().push(request);
        if let Some(err) = &self.open_error {
            return Err(err.clone());
        }

        let steps: VecDeque<Step> = self.steps.iter().cloned().collect();
        let stream = futures::stream::unfold(steps, |mut steps| async move {
            loop {
                match steps.pop_front()? {
                    Step::Event(event) => return Some((Ok(event), steps)),
                    Step::Error(err) => return Some((Err(err), steps)),
                    Step::Delay(delay) => tokio::time::sleep(delay).await,
                    Step::Hang => futures::future::pending::<()>().await,
                }
            }
        });
        Ok(stream.boxed())
    }
}

// ---------------------------------------------------------------------------
// Transform collaborators
// ---------------------------------------------------------------------------

/// Rehoster returning `img_<n>` and counting calls per locator
#[derive(Debug, Default)]
pub struct CountingRehoster {
    calls: Mutex<HashMap<String, usize>>,
    next: AtomicUsize,
    latency: Duration,
    failing: HashSet<String>,
}

impl CountingRehoster {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Calls for `locator` fail
    #[must_use]
    pub fn failing_for(mut self, locator: &str) -> Self {
        self.failing.insert(locator.to_string());
        self
    }

    pub fn calls_for(&self, locator: &str) -> usize {
        self.calls.lock().get(locator).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().values().sum()
    }
}

#[async_trait]
impl ResourceRehoster for CountingRehoster {
    async fn relocate(&self, locator: &str) -> Result<String, TransformError> {
        *self.calls.lock().entry(locator.to_string()).or_default() += 1;
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if self.failing.contains(locator) {
            return Err(TransformError::Relocate {
                locator: locator.to_string(),
                reason: "rehost refused".to_string(),
            });
        }
        Ok(format!("img_{}", self.next.fetch_add(1, Ordering::SeqCst) + 1))
    }
}

/// Resolver returning `https://preview/<id>` and counting calls per id
#[derive(Debug, Default)]
pub struct CountingResolver {
    calls: Mutex<HashMap<String, usize>>,
}

impl CountingResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls_for(&self, citation_id: &str) -> usize {
        self.calls.lock().get(citation_id).copied().unwrap_or(0)
    }
}

#[async_trait]
impl CitationResolver for CountingResolver {
    async fn resolve(
        &self,
        citation_id: &str,
        _context: &CitationContext,
    ) -> Result<String, TransformError> {
        *self.calls.lock().entry(citation_id.to_string()).or_default() += 1;
        Ok(format!("https://preview/{citation_id}"))
    }
}
