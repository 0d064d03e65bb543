//! Upstream chat-completions client.
//!
//! Thin client over an OpenAI-compatible `/chat/completions` endpoint,
//! always requesting a streamed response. The caller receives the raw
//! `reqwest::Response` once the upstream has answered with a success
//! status; SSE decoding happens in [`crate::api::streaming`].

use crate::core::config::ProviderConfig;
use crate::core::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Upstream error bodies are relayed to the caller but capped so a huge
/// HTML error page cannot balloon the response.
const MAX_ERROR_BODY_BYTES: usize = 2048;

/// One message in a conversation history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: String) -> Self {
        Self {
            role: "user".to_string(),
            content,
        }
    }

    pub fn assistant(content: String) -> Self {
        Self {
            role: "assistant".to_string(),
            content,
        }
    }
}

/// Wire format of the streaming chat-completions request.
#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
}

/// One decoded SSE chunk of a streamed completion.
#[derive(Debug, Deserialize)]
pub struct ChatStreamChunk {
    #[serde(default)]
    pub choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
pub struct StreamChoice {
    #[serde(default)]
    pub delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChunkDelta {
    #[serde(default)]
    pub content: Option<String>,
}

/// Client for the upstream provider.
#[derive(Clone)]
pub struct ProviderClient {
    http: reqwest::Client,
    config: ProviderConfig,
}

impl ProviderClient {
    pub fn new(config: ProviderConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .pool_max_idle_per_host(4)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()?;
        Ok(Self { http, config })
    }

    /// Issue one streaming completion call carrying the full history.
    ///
    /// Fails before any body bytes are produced when the connection fails
    /// or the upstream answers non-2xx, so the handler can still pick a
    /// proper HTTP status.
    pub async fn open_stream(&self, messages: &[ChatMessage]) -> Result<reqwest::Response> {
        let url = format!(
            "{}/chat/completions",
            self.config.api_base.trim_end_matches('/')
        );

        let payload = ChatCompletionRequest {
            model: &self.config.model,
            messages,
            stream: true,
        };

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(
                    url = %url,
                    model = %self.config.model,
                    error = %e,
                    is_timeout = e.is_timeout(),
                    is_connect = e.is_connect(),
                    "Upstream request failed"
                );
                AppError::from(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            let body: String = response
                .text()
                .await
                .unwrap_or_default()
                .chars()
                .take(MAX_ERROR_BODY_BYTES)
                .collect();
            tracing::error!(status = %status, body = %body, "Upstream returned error status");
            return Err(AppError::UpstreamStatus {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response)
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Deadline for the first streamed chunk, if configured.
    pub fn first_chunk_timeout(&self) -> Option<Duration> {
        self.config.first_chunk_timeout_secs.map(Duration::from_secs)
    }
}
