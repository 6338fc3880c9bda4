//! AI adapter: OpenAI-compatible chat completions behind a small trait.
//!
//! Everything a call needs (endpoint, key, model, proxy, timeout) travels in
//! the `ChatRequest`, so concurrent scans never share mutable client state.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use metrics::{counter, histogram};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::net::http_client;

/// Request timeout for one chat call.
pub const LLM_TIMEOUT: Duration = Duration::from_secs(20);

/// Longest error body kept from a non-2xx response.
const ERROR_BODY_MAX_CHARS: usize = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// One chat completion call.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub proxy: Option<String>,
    pub timeout: Duration,
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("missing API key")]
    MissingApiKey,
    #[error("could not build HTTP client (check the proxy address)")]
    Client(#[source] reqwest::Error),
    #[error("chat request failed")]
    Http(#[source] reqwest::Error),
    #[error("chat endpoint returned HTTP {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("chat response could not be decoded")]
    Decode(#[source] reqwest::Error),
    #[error("chat response contained no text")]
    EmptyResponse,
}

impl LlmError {
    /// Metric label for the failure class.
    pub fn kind(&self) -> &'static str {
        match self {
            LlmError::MissingApiKey => "missing_api_key",
            LlmError::Client(_) => "client",
            LlmError::Http(e) if e.is_timeout() => "timeout",
            LlmError::Http(_) => "transport",
            LlmError::Status { .. } => "status",
            LlmError::Decode(_) => "decode",
            LlmError::EmptyResponse => "empty",
        }
    }
}

#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Return the assistant text of the first choice.
    async fn complete(&self, request: ChatRequest) -> Result<String, LlmError>;
    /// Provider name for diagnostics.
    fn provider_name(&self) -> &'static str;
}

/// Factory: `AI_TEST_MODE=mock` yields a deterministic mock, otherwise the
/// real OpenAI-compatible client.
pub fn build_chat_client() -> Arc<dyn ChatClient> {
    if std::env::var("AI_TEST_MODE")
        .map(|v| v == "mock")
        .unwrap_or(false)
    {
        return Arc::new(MockChatClient::new(
            "Score 5/10. Logic: no edge in the headline. Call: flat (mock).",
        ));
    }
    Arc::new(OpenAiChatClient)
}

/// `POST {base_url}/chat/completions` with bearer auth.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenAiChatClient;

#[derive(Serialize)]
struct Req<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
}

#[derive(Deserialize)]
struct Resp {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMsg,
}

#[derive(Deserialize)]
struct ChoiceMsg {
    content: Option<String>,
}

pub fn chat_endpoint(base_url: &str) -> String {
    format!("{}/chat/completions", base_url.trim().trim_end_matches('/'))
}

impl OpenAiChatClient {
    async fn call(&self, request: ChatRequest) -> Result<String, LlmError> {
        if request.api_key.trim().is_empty() {
            return Err(LlmError::MissingApiKey);
        }

        let http =
            http_client(request.proxy.as_deref(), request.timeout).map_err(LlmError::Client)?;
        let t0 = std::time::Instant::now();

        let resp = http
            .post(chat_endpoint(&request.base_url))
            .bearer_auth(request.api_key.trim())
            .json(&Req {
                model: &request.model,
                messages: &request.messages,
            })
            .send()
            .await
            .map_err(LlmError::Http)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(LlmError::Status {
                status,
                body: body.trim().chars().take(ERROR_BODY_MAX_CHARS).collect(),
            });
        }

        let body: Resp = resp.json().await.map_err(LlmError::Decode)?;
        histogram!("llm_call_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);

        body.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or(LlmError::EmptyResponse)
    }
}

#[async_trait]
impl ChatClient for OpenAiChatClient {
    async fn complete(&self, request: ChatRequest) -> Result<String, LlmError> {
        self.call(request).await.inspect_err(|e| {
            counter!("llm_call_errors_total", "kind" => e.kind()).increment(1);
        })
    }

    fn provider_name(&self) -> &'static str {
        "openai"
    }
}

/// Returns a fixed text; used for local runs without credentials.
#[derive(Debug, Clone)]
pub struct MockChatClient {
    pub fixed: String,
}

impl MockChatClient {
    pub fn new(fixed: impl Into<String>) -> Self {
        Self {
            fixed: fixed.into(),
        }
    }
}

#[async_trait]
impl ChatClient for MockChatClient {
    async fn complete(&self, _request: ChatRequest) -> Result<String, LlmError> {
        Ok(self.fixed.clone())
    }

    fn provider_name(&self) -> &'static str {
        "mock"
    }
}
