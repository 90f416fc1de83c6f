//! HTTP generator for streaming chat endpoints

use super::sse::decode_body;
use super::{EventStream, UpstreamGenerator, UpstreamRequest};
use crate::error::UpstreamError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

/// Endpoint settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpGeneratorConfig {
    /// Chat completions URL
    pub api_url: String,
    /// Bearer token
    pub api_key: String,
    /// Ask the endpoint to keep `[id](CITE)` markers in the answer
    #[serde(default)]
    pub retain_dataset_cite: bool,
    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_connect_timeout() -> u64 {
    10
}

impl HttpGeneratorConfig {
    /// Create config for an endpoint
    #[must_use]
    pub fn new(api_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            api_key: api_key.into(),
            retain_dataset_cite: false,
            connect_timeout_secs: default_connect_timeout(),
        }
    }

    /// With citation markers kept in the answer
    #[inline]
    #[must_use]
    pub fn with_dataset_cite(mut self, retain: bool) -> Self {
        self.retain_dataset_cite = retain;
        self
    }
}

/// Generator that posts the prompt and decodes the SSE response body
#[derive(Debug, Clone)]
pub struct HttpGenerator {
    client: reqwest::Client,
    config: HttpGeneratorConfig,
}

impl HttpGenerator {
    /// Create generator
    pub fn new(config: HttpGeneratorConfig) -> Result<Self, UpstreamError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| UpstreamError::Request(e.to_string()))?;
        Ok(Self { client, config })
    }

    /// JSON body sent for `request`
    #[must_use]
    pub fn request_body(&self, request: &UpstreamRequest) -> Value {
        let mut body = json!({
            "chatId": request.chat_id,
            "responseChatItemId": request.session_id.to_string(),
            "messages": [{ "role": "user", "content": request.prompt }],
            "variables": request.variables,
            "stream": true,
            "detail": true,
        });
        if self.config.retain_dataset_cite {
            body["retainDatasetCite"] = Value::Bool(true);
        }
        body
    }
}

#[async_trait]
impl UpstreamGenerator for HttpGenerator {
    async fn stream(&self, request: UpstreamRequest) -> Result<EventStream, UpstreamError> {
        tracing::info!(
            session = %request.session_id,
            url = %self.config.api_url,
            "opening upstream stream"
        );
        let response = self
            .client
            .post(&self.config.api_url)
            .bearer_auth(&self.config.api_key)
            .json(&self.request_body(&request))
            .send()
            .await
            .map_err(|e| UpstreamError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = status.as_u16(), %body, "upstream returned error status");
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(decode_body(response.bytes_stream()))
    }
}
