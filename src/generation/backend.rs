//! Completion backends
//!
//! The generator only needs `prompt -> completion`. The production backend
//! speaks the OpenAI-compatible `/v1/chat/completions` protocol, which Groq,
//! OpenAI and Ollama all serve.

use crate::config::LlmConfig;
use async_trait::async_trait;
use reqwest::header;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, info};

/// Longest response body excerpt carried in an error
const SNIPPET_CHARS: usize = 300;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Backend not configured: {0}")]
    NotConfigured(String),

    #[error("Request failed: {0}")]
    Transport(String),

    #[error("HTTP {status} from {url}: {snippet}")]
    HttpStatus {
        status: u16,
        url: String,
        snippet: String,
    },

    #[error("Malformed response: {0}")]
    Decode(String),

    #[error("Completion timed out after {0:?}")]
    Timeout(Duration),
}

impl From<reqwest::Error> for BackendError {
    fn from(e: reqwest::Error) -> Self {
        BackendError::Transport(e.to_string())
    }
}

/// Text completion service
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, BackendError>;

    /// Model identifier, for logs
    fn model(&self) -> &str;
}

#[derive(Debug)]
pub struct OpenAiCompatibleBackend {
    client: reqwest::Client,
    url_chat: String,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
}

impl OpenAiCompatibleBackend {
    /// Build from configuration, reading the API key from `api_key_env`
    ///
    /// Ollama needs no key; every other provider fails with `NotConfigured`
    /// when the variable is unset.
    pub fn from_config(cfg: &LlmConfig, timeout: Duration) -> Result<Self, BackendError> {
        let api_key = std::env::var(&cfg.api_key_env).ok().filter(|k| !k.trim().is_empty());
        if api_key.is_none() && cfg.provider != "ollama" {
            return Err(BackendError::NotConfigured(format!(
                "environment variable {} is not set",
                cfg.api_key_env
            )));
        }

        let endpoint = cfg.endpoint.trim();
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(BackendError::NotConfigured(format!(
                "invalid endpoint: {}",
                cfg.endpoint
            )));
        }

        let mut headers = header::HeaderMap::new();
        if let Some(key) = api_key {
            headers.insert(
                header::AUTHORIZATION,
                header::HeaderValue::from_str(&format!("Bearer {}", key)).map_err(|e| {
                    BackendError::NotConfigured(format!("invalid API key header: {}", e))
                })?,
            );
        }
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()?;

        let url_chat = format!("{}/v1/chat/completions", endpoint.trim_end_matches('/'));

        info!(
            provider = %cfg.provider,
            model = %cfg.model,
            endpoint = %cfg.endpoint,
            "Completion backend initialized"
        );

        Ok(Self {
            client,
            url_chat,
            model: cfg.model.clone(),
            temperature: cfg.temperature,
            max_tokens: cfg.max_tokens,
        })
    }
}

#[async_trait]
impl CompletionBackend for OpenAiCompatibleBackend {
    async fn complete(&self, prompt: &str) -> Result<String, BackendError> {
        let started = Instant::now();
        let body = ChatCompletionRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        debug!(model = %self.model, prompt_len = prompt.len(), "POST {}", self.url_chat);

        let resp = self.client.post(&self.url_chat).json(&body).send().await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            let snippet: String = text.chars().take(SNIPPET_CHARS).collect();

            error!(
                %status,
                url = %self.url_chat,
                %snippet,
                latency_ms = started.elapsed().as_millis(),
                "chat completion returned non-success status"
            );

            return Err(BackendError::HttpStatus {
                status: status.as_u16(),
                url: self.url_chat.clone(),
                snippet,
            });
        }

        let out: ChatCompletionResponse = resp.json().await.map_err(|e| {
            BackendError::Decode(format!(
                "{}; expected `choices[0].message.content`",
                e
            ))
        })?;

        let content = out
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| BackendError::Decode("response contained no choices".to_string()))?;

        info!(
            model = %self.model,
            latency_ms = started.elapsed().as_millis(),
            completion_len = content.len(),
            "chat completion finished"
        );

        Ok(content)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}
