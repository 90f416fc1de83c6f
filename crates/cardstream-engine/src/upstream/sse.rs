//! Server-sent event decoding for streaming chat endpoints
//!
//! Lines are buffered as bytes so multi-byte characters split across chunks
//! decode correctly. An `event:` line names the next `data:` line only.

use super::{EventStream, Progress, UpstreamEvent};
use crate::error::UpstreamError;
use cardstream_core::{Channel, Reference};
use futures::{Stream, StreamExt};
use serde_json::Value;
use std::collections::VecDeque;

const DONE_MARKER: &str = "[DONE]";
const SEARCH_MODULE: &str = "datasetSearchNode";

/// Incremental SSE decoder
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    event: Option<String>,
    done_seen: bool,
    finished: bool,
}

impl SseDecoder {
    /// Create decoder
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `data: [DONE]` has been seen
    #[inline]
    #[must_use]
    pub fn done_seen(&self) -> bool {
        self.done_seen
    }

    /// Decode every complete line in `chunk`
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<UpstreamEvent> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            if let Some(event) = self.decode_line(line.trim()) {
                events.push(event);
            }
        }
        events
    }

    /// Decode what is left and close the stream with a completion
    pub fn finish(&mut self) -> Vec<UpstreamEvent> {
        if self.finished {
            return Vec::new();
        }
        self.finished = true;
        let rest = std::mem::take(&mut self.buffer);
        let line = String::from_utf8_lossy(&rest);
        let mut events: Vec<UpstreamEvent> = self.decode_line(line.trim()).into_iter().collect();
        if !events.iter().any(|e| matches!(e, UpstreamEvent::Failed(_))) {
            events.push(UpstreamEvent::Completed);
        }
        events
    }

    fn decode_line(&mut self, line: &str) -> Option<UpstreamEvent> {
        if line.is_empty() {
            return None;
        }
        if let Some(name) = line.strip_prefix("event:") {
            self.event = Some(name.trim().to_string());
            return None;
        }
        let data = line.strip_prefix("data:")?.trim();
        let event = self.event.take();
        if data == DONE_MARKER {
            tracing::debug!("upstream answer finished");
            self.done_seen = true;
            return None;
        }

        let value: Value = match serde_json::from_str(data) {
            Ok(value) => value,
            Err(err) => {
                tracing::trace!(error = %err, "skipping malformed data line");
                return None;
            }
        };

        match event.as_deref() {
            Some("flowNodeStatus") => {
                if value.get("status").and_then(Value::as_str) != Some("running") {
                    return None;
                }
                let name = value.get("name").and_then(Value::as_str).unwrap_or_default();
                Some(UpstreamEvent::Progress(Progress::NodeRunning(name.to_string())))
            }
            Some("toolCall") => {
                let name = value
                    .pointer("/tool/toolName")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                Some(UpstreamEvent::Progress(Progress::ToolCall(name.to_string())))
            }
            Some("toolParams" | "toolResponse") => {
                tracing::trace!(event = ?event, "ignoring tool payload");
                None
            }
            Some("flowResponses") => {
                let references = collect_references(value.as_array()?);
                (!references.is_empty()).then_some(UpstreamEvent::References(references))
            }
            Some("error") => {
                let message = value
                    .get("message")
                    .and_then(Value::as_str)
                    .map_or_else(|| value.to_string(), str::to_string);
                Some(UpstreamEvent::Failed(message))
            }
            _ => decode_delta(&value),
        }
    }
}

fn decode_delta(value: &Value) -> Option<UpstreamEvent> {
    let delta = value.pointer("/choices/0/delta")?;
    if let Some(text) = delta.get("reasoning_content").and_then(Value::as_str) {
        if !text.is_empty() {
            return Some(UpstreamEvent::delta(Channel::Thinking, text));
        }
    }
    match delta.get("content").and_then(Value::as_str) {
        Some(text) if !text.is_empty() => Some(UpstreamEvent::delta(Channel::Answer, text)),
        _ => None,
    }
}

fn collect_references(responses: &[Value]) -> Vec<Reference> {
    let text = |value: &Value, key: &str| {
        value
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };

    let mut references = Vec::new();
    for response in responses {
        if response.get("moduleType").and_then(Value::as_str) != Some(SEARCH_MODULE) {
            continue;
        }
        let module_name = text(response, "moduleName");
        let query = text(response, "query");
        let quotes = response
            .get("quoteList")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        tracing::debug!(module = %module_name, count = quotes.len(), "knowledge base references");

        for quote in quotes {
            let mut reference = Reference::new(text(quote, "sourceName"), text(quote, "q"))
                .with_module(module_name.clone());
            reference.query.clone_from(&query);
            reference.collection_id = quote
                .get("collectionId")
                .and_then(Value::as_str)
                .map(str::to_string);
            reference.quote_id = quote.get("id").and_then(Value::as_str).map(str::to_string);
            references.push(reference);
        }
    }
    references
}

/// Decode a byte stream of SSE into upstream events
///
/// A transport error ends the stream with [`UpstreamError::Stream`].
pub fn decode_body<S, B, E>(body: S) -> EventStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let state = (Box::pin(body), SseDecoder::new(), VecDeque::new(), false);
    futures::stream::unfold(state, |(mut body, mut decoder, mut queue, mut ended)| async move {
        loop {
            if let Some(event) = queue.pop_front() {
                return Some((Ok(event), (body, decoder, queue, ended)));
            }
            if ended {
                return None;
            }
            match body.next().await {
                Some(Ok(chunk)) => queue.extend(decoder.feed(chunk.as_ref())),
                Some(Err(err)) => {
                    ended = true;
                    let err = UpstreamError::Stream(err.to_string());
                    return Some((Err(err), (body, decoder, queue, ended)));
                }
                None => {
                    ended = true;
                    queue.extend(decoder.finish());
                }
            }
        }
    })
    .boxed()
}
