//! Canned generator and rehoster for offline runs

use async_trait::async_trait;
use cardstream_core::{Channel, Reference};
use cardstream_engine::{
    EventStream, Progress, UpstreamError, UpstreamEvent, UpstreamGenerator, UpstreamRequest,
};
use cardstream_transform::{ResourceRehoster, TransformError};
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

const THINKING: &str = "The user asks about {prompt}. The knowledge base has a matching \
    policy page, so the answer should quote it and cite the source.";

const ANSWER: &str = "Here is what the knowledge base says about {prompt}.\n\n\
    Refunds are accepted within 30 days of purchase[q1](CITE). \
    Items must be unused and in their original packaging[q2](CITE).\n\n\
    ![refund flow](/assets/refund-flow.png)\n\n\
    Contact support if your order is older than 30 days[q1](CITE).";

/// Generator that streams a fixed reply word by word
#[derive(Debug, Clone)]
pub struct DemoGenerator {
    token_delay: Duration,
    fail_after: Option<usize>,
}

impl DemoGenerator {
    pub fn new(token_delay: Duration) -> Self {
        Self {
            token_delay,
            fail_after: None,
        }
    }

    /// Report an upstream error after `words` answer words
    pub fn failing_after(mut self, words: usize) -> Self {
        self.fail_after = Some(words);
        self
    }

    fn script(&self, prompt: &str) -> VecDeque<Option<UpstreamEvent>> {
        let mut script = VecDeque::new();
        script.push_back(Some(UpstreamEvent::Progress(Progress::NodeRunning(
            "Knowledge base search".to_string(),
        ))));
        script.push_back(None);
        script.push_back(Some(UpstreamEvent::References(references())));

        for word in words(&THINKING.replace("{prompt}", prompt)) {
            script.push_back(Some(UpstreamEvent::delta(Channel::Thinking, word)));
            script.push_back(None);
        }

        script.push_back(Some(UpstreamEvent::Progress(Progress::NodeRunning(
            "AI chat".to_string(),
        ))));
        for (index, word) in words(&ANSWER.replace("{prompt}", prompt)).into_iter().enumerate() {
            if self.fail_after == Some(index) {
                script.push_back(Some(UpstreamEvent::Failed("demo failure".to_string())));
                return script;
            }
            script.push_back(Some(UpstreamEvent::delta(Channel::Answer, word)));
            script.push_back(None);
        }
        script.push_back(Some(UpstreamEvent::Completed));
        script
    }
}

#[async_trait]
impl UpstreamGenerator for DemoGenerator {
    async fn stream(&self, request: UpstreamRequest) -> Result<EventStream, UpstreamError> {
        tracing::debug!(
            session = %request.session_id,
            chat = %request.chat_id,
            "demo stream opened"
        );
        let delay = self.token_delay;
        let script = self.script(&request.prompt);

        // `None` entries are pauses between tokens
        let stream = futures::stream::unfold(script, move |mut script| async move {
            loop {
                match script.pop_front()? {
                    Some(event) => return Some((Ok(event), script)),
                    None => tokio::time::sleep(delay).await,
                }
            }
        });
        Ok(stream.boxed())
    }
}

/// Split text into word tokens that keep their trailing whitespace
fn words(text: &str) -> Vec<String> {
    text.split_inclusive(char::is_whitespace)
        .map(str::to_string)
        .collect()
}

fn references() -> Vec<Reference> {
    vec![
        Reference::new("refund-policy.md", "Refunds are accepted within 30 days of purchase.")
            .with_module("Knowledge base search")
            .with_quote_id("q1")
            .with_collection("policies"),
        Reference::new(
            "returns-faq.md",
            "Returned items must be unused and in their original packaging.",
        )
        .with_module("Knowledge base search")
        .with_quote_id("q2")
        .with_collection("faq"),
    ]
}

/// Rehoster that hands out local image keys after a fixed delay
#[derive(Debug, Default)]
pub struct DemoRehoster {
    latency: Duration,
    keys: Mutex<HashMap<String, String>>,
}

impl DemoRehoster {
    pub fn new(latency: Duration) -> Self {
        Self {
            latency,
            ..Self::default()
        }
    }
}

#[async_trait]
impl ResourceRehoster for DemoRehoster {
    async fn relocate(&self, locator: &str) -> Result<String, TransformError> {
        tokio::time::sleep(self.latency).await;
        if !locator.starts_with("http") {
            return Err(TransformError::Relocate {
                locator: locator.to_string(),
                reason: "not an absolute URL".to_string(),
            });
        }
        let mut keys = self.keys.lock();
        let next = keys.len() + 1;
        let key = keys
            .entry(locator.to_string())
            .or_insert_with(|| format!("img_demo_{next}"))
            .clone();
        tracing::info!(%locator, %key, "image rehosted");
        Ok(key)
    }
}
