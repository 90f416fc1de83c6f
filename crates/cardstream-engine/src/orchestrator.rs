//! Per-reply orchestration
//!
//! One orchestrator drives one reply: it creates the card, consumes the
//! upstream stream, routes each event to its channel, runs the transform
//! pipeline on the answer, asks the scheduler what to send and hands the
//! result to the dispatcher. Every exit path ends with one terminal rebuild.
//!
//! ```text
//! Starting ──create──► Streaming ──┬─► Completed
//!    │                             ├─► Failed
//!    └──► Failed / Cancelled       └─► Cancelled
//! ```

use crate::client::{RenderClient, RenderOp};
use crate::dispatch::{DispatchStats, Dispatcher};
use crate::error::{EngineError, UpstreamError};
use crate::registry::CancelFlag;
use crate::scheduler::{Decision, UpdateScheduler};
use crate::session::{ReplyRequest, SessionOutcome};
use crate::upstream::{Progress, UpstreamEvent, UpstreamGenerator, UpstreamRequest};
use cardstream_core::document::SUMMARY_CHARS;
use cardstream_core::{
    build_document, element_content, format_references, truncate_chars, validate_transition,
    Card, Channel, ChannelConfig, ChannelStore, DocumentMeta, DocumentPhase, EngineConfig,
    ObjectId, Reference, SessionId, SessionState,
};
use cardstream_transform::{CitationContext, TransformPipeline};
use futures::StreamExt;
use std::sync::Arc;
use tokio::time::Instant;

/// Shared collaborators every session uses
#[derive(Clone)]
pub(crate) struct Collaborators {
    pub(crate) config: Arc<EngineConfig>,
    pub(crate) client: Arc<dyn RenderClient>,
    pub(crate) generator: Arc<dyn UpstreamGenerator>,
}

#[derive(Debug)]
enum Ending {
    Completed,
    Cancelled,
    Failed(UpstreamError),
}

pub(crate) struct Orchestrator {
    session_id: SessionId,
    request: ReplyRequest,
    channels: ChannelConfig,
    config: Arc<EngineConfig>,
    client: Arc<dyn RenderClient>,
    generator: Arc<dyn UpstreamGenerator>,
    pipeline: TransformPipeline,
    cancel: CancelFlag,
    store: ChannelStore,
    scheduler: UpdateScheduler,
    state: SessionState,
    references: Vec<Reference>,
    cancel_armed: bool,
}

impl Orchestrator {
    pub(crate) fn new(
        collaborators: Collaborators,
        session_id: SessionId,
        request: ReplyRequest,
        channels: ChannelConfig,
        pipeline: TransformPipeline,
        cancel: CancelFlag,
    ) -> Self {
        let Collaborators {
            config,
            client,
            generator,
        } = collaborators;
        Self {
            session_id,
            request,
            channels,
            store: ChannelStore::new(&config.labels),
            scheduler: UpdateScheduler::new(config.debounce_interval()),
            config,
            client,
            generator,
            pipeline,
            cancel,
            state: SessionState::Starting,
            references: Vec::new(),
            cancel_armed: false,
        }
    }

    /// Drive the reply to a terminal state
    pub(crate) async fn run(mut self) -> SessionOutcome {
        tracing::info!(session = %self.session_id, "reply started");

        if self.cancel.is_cancelled() {
            self.transition(SessionState::Cancelled);
            return self.outcome(None, None, DispatchStats::default());
        }

        let initial = self.document(DocumentPhase::Streaming {
            cancel_armed: false,
        });
        let object_id = match self.client.create(&initial).await {
            Ok(object_id) => object_id,
            Err(err) => {
                tracing::error!(session = %self.session_id, error = %err, "card creation failed");
                self.transition(SessionState::Failed);
                return self.outcome(
                    None,
                    Some(EngineError::CreateFailed(err)),
                    DispatchStats::default(),
                );
            }
        };
        tracing::debug!(session = %self.session_id, object = %object_id, "card created");

        let dispatcher = Dispatcher::spawn(
            self.session_id,
            Arc::clone(&self.client),
            object_id.clone(),
            self.config.sequence_base,
        );
        self.scheduler.mark_structural(Channel::Status, Instant::now());
        self.transition(SessionState::Streaming);

        if self.config.cancel_enabled && !self.cancel.is_cancelled() {
            self.cancel_armed = true;
            self.rebuild(&dispatcher);
        }

        let ending = self.stream(&dispatcher).await;
        let error = self.finish(&dispatcher, ending).await;
        let stats = dispatcher.close().await;

        tracing::info!(
            session = %self.session_id,
            state = ?self.state,
            delivered = stats.delivered,
            failed = stats.failed,
            dropped = stats.dropped,
            "reply finished"
        );
        self.outcome(Some(object_id), error, stats)
    }

    async fn stream(&mut self, dispatcher: &Dispatcher) -> Ending {
        let idle_timeout = self.config.upstream_idle_timeout();
        let idle = tokio::time::sleep(idle_timeout);
        tokio::pin!(idle);

        let request = UpstreamRequest {
            session_id: self.session_id,
            chat_id: self
                .request
                .chat_id
                .clone()
                .unwrap_or_else(|| self.session_id.to_string()),
            prompt: self.request.prompt.clone(),
            variables: self.request.variables.clone(),
        };

        let mut events = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return Ending::Cancelled,
            () = &mut idle => return Ending::Failed(UpstreamError::IdleTimeout(idle_timeout)),
            opened = self.generator.stream(request) => match opened {
                Ok(events) => events,
                Err(err) => return Ending::Failed(err),
            },
        };
        idle.as_mut().reset(Instant::now() + idle_timeout);

        loop {
            let flush_at = self.scheduler.next_deadline();
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => return Ending::Cancelled,
                () = &mut idle => return Ending::Failed(UpstreamError::IdleTimeout(idle_timeout)),
                () = wait_until(flush_at) => self.flush_due(dispatcher),
                next = events.next() => {
                    let event = match next {
                        None => return Ending::Completed,
                        Some(Err(err)) => return Ending::Failed(err),
                        Some(Ok(event)) => event,
                    };
                    idle.as_mut().reset(Instant::now() + idle_timeout);
                    if let Some(ending) = self.apply(event, dispatcher).await {
                        return ending;
                    }
                }
            }
        }
    }

    async fn apply(&mut self, event: UpstreamEvent, dispatcher: &Dispatcher) -> Option<Ending> {
        match event {
            UpstreamEvent::Delta { channel, text } => {
                if self.store.append(channel, &text) {
                    self.refresh(channel, dispatcher).await;
                }
            }
            UpstreamEvent::Snapshot { channel, text } => {
                self.replace(channel, &text, dispatcher).await;
            }
            UpstreamEvent::Progress(progress) => {
                let line = match progress {
                    Progress::NodeRunning(name) => self.config.labels.running_status(&name),
                    Progress::ToolCall(name) => self.config.labels.tool_status(&name),
                };
                self.replace(Channel::Status, &line, dispatcher).await;
            }
            UpstreamEvent::References(references) => {
                self.references.extend(references);
                let links: Vec<Option<String>> = self
                    .references
                    .iter()
                    .map(|r| preview_link(self.config.citation_preview_url.as_deref(), r))
                    .collect();
                let text = format_references(&self.references, &links, &self.config.labels);
                let title = self.config.labels.references_heading(self.references.len());
                self.store.settle_title(Channel::References, title);
                self.replace(Channel::References, &text, dispatcher).await;
            }
            UpstreamEvent::Completed => return Some(Ending::Completed),
            UpstreamEvent::Failed(message) => {
                return Some(Ending::Failed(UpstreamError::Reported(message)));
            }
        }
        None
    }

    async fn replace(&mut self, channel: Channel, text: &str, dispatcher: &Dispatcher) {
        match self.store.replace(channel, text) {
            Ok(true) => self.refresh(channel, dispatcher).await,
            Ok(false) => {}
            Err(err) => {
                tracing::warn!(
                    session = %self.session_id,
                    %channel,
                    error = %err,
                    "snapshot ignored"
                );
            }
        }
    }

    /// Recompute a channel's display text and schedule the update
    async fn refresh(&mut self, channel: Channel, dispatcher: &Dispatcher) {
        if !self.channels.shows(channel) {
            return;
        }

        let display = self.transform(channel).await;
        if self.cancel.is_cancelled() {
            return;
        }
        self.store.set_display(channel, display);
        if self.store.is_empty(channel) {
            return;
        }

        let title_changed = channel == Channel::Answer
            && !self.store.is_empty(Channel::Thinking)
            && self.store.settle_title(
                Channel::Thinking,
                self.config.labels.thinking_done_title.clone(),
            );

        let content = element_content(&self.store, channel, &self.config.labels);
        match self.scheduler.offer(channel, content, Instant::now()) {
            Decision::Rebuild => {
                tracing::debug!(session = %self.session_id, %channel, "structural rebuild");
                self.rebuild(dispatcher);
            }
            // Titles live outside patchable bodies
            Decision::Patch(_) | Decision::Deferred if title_changed => {
                tracing::debug!(session = %self.session_id, %channel, "title rebuild");
                self.rebuild(dispatcher);
            }
            Decision::Patch(content) => {
                dispatcher.submit(RenderOp::Patch {
                    element_id: channel.element_id().to_string(),
                    content,
                });
            }
            Decision::Deferred => {
                tracing::trace!(session = %self.session_id, %channel, "update held");
            }
        }
    }

    async fn transform(&self, channel: Channel) -> String {
        let raw = &self.store.get(channel).raw;
        if channel != Channel::Answer || self.pipeline.is_passthrough() {
            return raw.clone();
        }
        let context =
            CitationContext::new(self.session_id).with_references(self.references.clone());
        self.pipeline.apply(raw, &context).await
    }

    fn flush_due(&mut self, dispatcher: &Dispatcher) {
        for (channel, content) in self.scheduler.due(Instant::now()) {
            dispatcher.submit(RenderOp::Patch {
                element_id: channel.element_id().to_string(),
                content,
            });
        }
    }

    fn rebuild(&mut self, dispatcher: &Dispatcher) {
        let card = self.document(DocumentPhase::Streaming {
            cancel_armed: self.cancel_armed,
        });
        self.scheduler.rebuilt(Instant::now());
        dispatcher.submit(RenderOp::ReplaceAll(Box::new(card)));
    }

    /// Settle channels for the terminal state and send the terminal rebuild
    async fn finish(&mut self, dispatcher: &Dispatcher, ending: Ending) -> Option<EngineError> {
        let held = self.scheduler.drain();
        if !held.is_empty() {
            tracing::debug!(
                session = %self.session_id,
                count = held.len(),
                "held updates folded into terminal rebuild"
            );
        }

        let config = Arc::clone(&self.config);
        let labels = &config.labels;
        let (state, error) = match ending {
            Ending::Completed => {
                if self.channels.shows(Channel::Answer) && !self.pipeline.is_passthrough() {
                    let display = self.transform(Channel::Answer).await;
                    self.store.set_display(Channel::Answer, display);
                }
                if self.store.get(Channel::Answer).raw.trim().is_empty() {
                    self.store.finalize(Channel::Answer, labels.empty_answer.clone());
                }
                self.store.finalize(Channel::Status, labels.done.clone());
                (SessionState::Completed, None)
            }
            Ending::Cancelled => {
                tracing::info!(session = %self.session_id, "reply cancelled");
                self.store.finalize(Channel::Status, labels.stopped.clone());
                (SessionState::Cancelled, None)
            }
            Ending::Failed(err) => {
                tracing::error!(session = %self.session_id, error = %err, "upstream failed");
                self.store.finalize(Channel::Status, labels.failed.clone());
                let partial = self.store.get(Channel::Answer).display.clone();
                let answer = if partial.trim().is_empty() {
                    labels.apology.clone()
                } else {
                    format!("{partial}\n\n{}", labels.apology)
                };
                self.store.finalize(Channel::Answer, answer);
                (SessionState::Failed, Some(EngineError::Upstream(err)))
            }
        };

        if !self.store.is_empty(Channel::Thinking) {
            let title = labels.thinking_done_title.clone();
            self.store.settle_title(Channel::Thinking, title);
        }

        let answer = &self.store.get(Channel::Answer).display;
        let summary = if answer.trim().is_empty() {
            self.store.get(Channel::Status).display.clone()
        } else {
            truncate_chars(answer, SUMMARY_CHARS)
        };
        let card = self.document(DocumentPhase::Terminal { summary });
        dispatcher.submit(RenderOp::ReplaceAll(Box::new(card)));

        self.transition(state);
        error
    }

    fn document(&self, phase: DocumentPhase) -> Card {
        let meta = DocumentMeta {
            session_id: self.session_id,
            prompt: &self.request.prompt,
            sender_name: self.request.sender_name.as_deref(),
            channels: &self.channels,
            phase,
        };
        build_document(&self.store, &meta, &self.config.labels)
    }

    fn transition(&mut self, to: SessionState) {
        match validate_transition(self.state, to) {
            Ok(()) => {
                tracing::debug!(session = %self.session_id, from = ?self.state, ?to, "transition");
                self.state = to;
            }
            Err(err) => {
                tracing::error!(session = %self.session_id, error = %err, "transition rejected");
            }
        }
    }

    fn outcome(
        &self,
        object_id: Option<ObjectId>,
        error: Option<EngineError>,
        dispatch: DispatchStats,
    ) -> SessionOutcome {
        SessionOutcome {
            session_id: self.session_id,
            state: self.state,
            answer: self.store.get(Channel::Answer).display.clone(),
            object_id,
            error,
            dispatch,
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Preview link for a reference, from a `{quote_id}`/`{collection_id}` template
fn preview_link(template: Option<&str>, reference: &Reference) -> Option<String> {
    let template = template?;
    let quote_id = reference.quote_id.as_deref()?;
    let link = template.replace("{quote_id}", quote_id);
    if link.contains("{collection_id}") {
        let collection = reference.collection_id.as_deref()?;
        return Some(link.replace("{collection_id}", collection));
    }
    Some(link)
}
