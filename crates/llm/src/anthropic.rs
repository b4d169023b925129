use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use pipeline::{CompletionRequest, CompletionResponse, LanguageModel, ModelError};
use reqwest::{header::RETRY_AFTER, Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, warn};

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
pub const DEFAULT_MODEL: &str = "claude-3-5-haiku-latest";
/// Value of the `anthropic-version` header.
pub const API_VERSION: &str = "2023-06-01";

const DEFAULT_MAX_TOKENS: u32 = 1024;
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(90);
/// How much of an error body ends up in the error message.
const ERROR_BODY_PREVIEW: usize = 300;

/// The provider could not be constructed.
#[derive(Debug, Error)]
pub enum ProviderConfigError {
    #[error("API key is missing or empty")]
    MissingApiKey,

    #[error("HTTP client could not be built: {0}")]
    Client(#[from] reqwest::Error),
}

/// Connection settings for [`AnthropicProvider`].
#[derive(Clone)]
pub struct AnthropicConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub max_tokens: u32,
    pub request_timeout: Duration,
}

impl AnthropicConfig {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

// The key never reaches logs.
impl fmt::Debug for AnthropicConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnthropicConfig")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("max_tokens", &self.max_tokens)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

/// [`LanguageModel`] backed by the Anthropic Messages API.
///
/// Each [`CompletionRequest`] becomes one `POST /v1/messages`: the
/// instructions go into `system`, the prompt and the pretty-printed context
/// into a single user message. The first JSON object found in the reply text
/// is the structured result.
#[derive(Debug)]
pub struct AnthropicProvider {
    client: Client,
    config: AnthropicConfig,
}

impl AnthropicProvider {
    pub fn new(config: AnthropicConfig) -> Result<Self, ProviderConfigError> {
        if config.api_key.trim().is_empty() {
            return Err(ProviderConfigError::MissingApiKey);
        }
        let client = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self { client, config })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/messages", self.config.base_url.trim_end_matches('/'))
    }

    fn body(&self, request: &CompletionRequest) -> Value {
        let context = serde_json::to_string_pretty(&request.context).unwrap_or_default();
        json!({
            "model": self.config.model,
            "max_tokens": self.config.max_tokens,
            "system": request.instructions,
            "messages": [{
                "role": "user",
                "content": format!("{}\n\nContext (JSON):\n{}", request.prompt, context),
            }],
        })
    }
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: u64,
    output_tokens: u64,
}

#[async_trait]
impl LanguageModel for AnthropicProvider {
    #[tracing::instrument(skip(self, request), fields(task = ?request.task, model = %self.config.model))]
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, ModelError> {
        let response = self
            .client
            .post(self.endpoint())
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&self.body(&request))
            .send()
            .await
            .map_err(|e| ModelError::Transient {
                message: format!("request failed: {e}"),
                retry_after: None,
            })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = retry_after_header(&response);
            let body = response.text().await.unwrap_or_default();
            let error = classify_status(status, retry_after, &body);
            warn!(status = status.as_u16(), error = %error, "model request rejected");
            return Err(error);
        }

        let parsed: MessagesResponse =
            response.json().await.map_err(|e| ModelError::MalformedOutput {
                message: format!("response body is not a Messages reply: {e}"),
            })?;
        if let Some(usage) = &parsed.usage {
            debug!(
                input_tokens = usage.input_tokens,
                output_tokens = usage.output_tokens,
                stop_reason = ?parsed.stop_reason,
                "model replied"
            );
        }

        let text: String = parsed
            .content
            .iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text.as_deref())
            .collect::<Vec<_>>()
            .join("\n");
        let content = extract_json_object(&text).ok_or_else(|| ModelError::MalformedOutput {
            message: format!("no JSON object in reply: {}", preview(&text)),
        })?;
        Ok(CompletionResponse { content })
    }
}

fn retry_after_header(response: &reqwest::Response) -> Option<Duration> {
    response
        .headers()
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Maps a non-success status onto the port's error classes.
///
/// Rate limits, timeouts and server-side failures (including 529 overloaded)
/// are transient; everything else means the request itself is wrong.
fn classify_status(status: StatusCode, retry_after: Option<Duration>, body: &str) -> ModelError {
    let message = format!("HTTP {}: {}", status.as_u16(), preview(body));
    match status.as_u16() {
        408 | 409 | 429 | 500..=599 => ModelError::Transient {
            message,
            retry_after,
        },
        _ => ModelError::Permanent { message },
    }
}

fn preview(text: &str) -> String {
    let mut out: String = text.trim().chars().take(ERROR_BODY_PREVIEW).collect();
    if text.trim().chars().count() > ERROR_BODY_PREVIEW {
        out.push('…');
    }
    out
}

/// Finds the JSON object in a model reply.
///
/// Accepts a bare object, an object inside a Markdown code fence, or an
/// object surrounded by prose. Arrays and scalars are rejected.
pub fn extract_json_object(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if let Ok(value @ Value::Object(_)) = serde_json::from_str(trimmed) {
        return Some(value);
    }
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    match serde_json::from_str(&trimmed[start..=end]) {
        Ok(value @ Value::Object(_)) => Some(value),
        _ => None,
    }
}
