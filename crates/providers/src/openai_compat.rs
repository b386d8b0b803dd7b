//! OpenAI-compatible chat-completions provider.
//!
//! Works with any endpoint exposing `/chat/completions` in the OpenAI wire
//! format: OpenAI itself, OpenRouter, Ollama, vLLM, Groq and similar.
//!
//! The oracle only needs non-streaming completions, optionally constrained
//! to a JSON object and seeded for reproducibility.

use crate::router::default_base_url;
use async_trait::async_trait;
use navpilot_core::error::ProviderError;
use navpilot_core::message::{Message, Role};
use navpilot_core::provider::{Provider, ProviderRequest, ProviderResponse, ResponseFormat, Usage};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
const DEFAULT_RETRY_AFTER_SECS: u64 = 5;

pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// `base_url` is the API root, e.g. `https://api.openai.com/v1`.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        let client = match reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build() {
            Ok(client) => client,
            Err(e) => {
                warn!(error = %e, "Falling back to a default HTTP client");
                reqwest::Client::new()
            }
        };

        let mut base_url: String = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }

        Self {
            name: name.into(),
            base_url,
            api_key: api_key.into(),
            client,
        }
    }

    /// A provider for a well-known endpoint.
    fn well_known(name: &'static str, api_key: impl Into<String>) -> Self {
        Self::new(name, default_base_url(name).unwrap_or_default(), api_key)
    }

    pub fn openai(api_key: impl Into<String>) -> Self {
        Self::well_known("openai", api_key)
    }

    pub fn openrouter(api_key: impl Into<String>) -> Self {
        Self::well_known("openrouter", api_key)
    }

    /// Ollama ignores the key, but the header must still be present.
    pub fn ollama(base_url: Option<&str>) -> Self {
        match base_url {
            Some(url) => Self::new("ollama", url, "ollama"),
            None => Self::well_known("ollama", "ollama"),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }
}

#[async_trait]
impl Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        debug!(
            provider = %self.name,
            model = %request.model,
            json = request.response_format == ResponseFormat::JsonObject,
            "Sending completion request"
        );

        let response = self
            .client
            .post(self.endpoint("chat/completions"))
            .bearer_auth(&self.api_key)
            .json(&ChatRequest::from(&request))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(format!("{}s", REQUEST_TIMEOUT.as_secs()))
                } else {
                    ProviderError::Network(e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        if status != 200 {
            let retry_after = retry_after(response.headers());
            let body = response.text().await.unwrap_or_default();
            warn!(provider = %self.name, status, body = %body, "Provider returned error");
            return Err(status_error(status, retry_after, body, &request.model));
        }

        let completion: ChatCompletion = response.json().await.map_err(|e| ProviderError::ApiError {
            status_code: status,
            message: format!("unreadable completion: {e}"),
        })?;

        completion.into_response()
    }

    async fn health_check(&self) -> Result<bool, ProviderError> {
        let response = self
            .client
            .get(self.endpoint("models"))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        Ok(response.status().is_success())
    }
}

/// Seconds from a `Retry-After` header.
fn retry_after(headers: &HeaderMap) -> u64 {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(DEFAULT_RETRY_AFTER_SECS)
}

/// Map a non-200 status to the matching provider error.
fn status_error(status: u16, retry_after_secs: u64, body: String, model: &str) -> ProviderError {
    match status {
        429 => ProviderError::RateLimited { retry_after_secs },
        401 | 403 => ProviderError::AuthenticationFailed(
            "Invalid API key or insufficient permissions".into(),
        ),
        404 => ProviderError::ModelNotFound(model.to_string()),
        _ => ProviderError::ApiError {
            status_code: status,
            message: body,
        },
    }
}

// --- Wire types ---

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    temperature: f32,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<WireFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u64>,
}

impl<'a> From<&'a ProviderRequest> for ChatRequest<'a> {
    fn from(request: &'a ProviderRequest) -> Self {
        Self {
            model: &request.model,
            messages: request.messages.iter().map(WireMessage::from).collect(),
            temperature: request.temperature,
            stream: false,
            max_tokens: request.max_tokens,
            response_format: match request.response_format {
                ResponseFormat::JsonObject => Some(WireFormat { kind: "json_object" }),
                ResponseFormat::Text => None,
            },
            seed: request.seed,
        }
    }
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'a Role,
    content: &'a str,
}

impl<'a> From<&'a Message> for WireMessage<'a> {
    fn from(message: &'a Message) -> Self {
        Self {
            role: &message.role,
            content: &message.content,
        }
    }
}

#[derive(Debug, Serialize)]
struct WireFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    model: String,
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

impl ChatCompletion {
    fn into_response(self) -> Result<ProviderResponse, ProviderError> {
        let Some(choice) = self.choices.into_iter().next() else {
            return Err(ProviderError::ApiError {
                status_code: 200,
                message: "completion has no choices".into(),
            });
        };

        Ok(ProviderResponse {
            message: Message::assistant(choice.message.content.unwrap_or_default()),
            usage: self.usage,
            model: self.model,
        })
    }
}
