//! Provider adapter: one `generate` contract over every supported text-generation backend.
//!
//! Providers differ in where the API key goes, how the request body looks and where the
//! generated text sits in the response. Those differences are data on [`Provider`], so the
//! rest of the crate never branches on the backend.

use crate::analysis::ValidationError;
use crate::config::AppConfig;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

/// The closed set of supported model backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Gemini,
    OpenAi,
    DeepSeek,
    Groq,
}

/// Where the API key is placed on the outbound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    /// `Authorization: Bearer <key>` header.
    Bearer,
    /// Query-string parameter with the given name.
    QueryKey(&'static str),
}

/// Request and response body shape spoken by a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireFormat {
    /// `generateContent`: `contents[].parts[].text` in, `candidates[0].content.parts[0].text` out.
    Gemini,
    /// OpenAI-style chat completions: `messages[]` in, `choices[0].message.content` out.
    ChatCompletions,
}

/// An entry of a provider's curated model list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelInfo {
    pub id: &'static str,
    pub name: &'static str,
}

const GEMINI_MODELS: &[ModelInfo] = &[
    ModelInfo { id: "gemini-2.0-flash", name: "Gemini 2.0 Flash (Latest)" },
    ModelInfo { id: "gemini-2.0-flash-lite-preview-02-05", name: "Gemini 2.0 Flash-Lite (Fastest)" },
    ModelInfo { id: "gemini-1.5-pro", name: "Gemini 1.5 Pro (Powerful)" },
    ModelInfo { id: "gemini-1.5-flash", name: "Gemini 1.5 Flash (Reliable)" },
];

const OPENAI_MODELS: &[ModelInfo] = &[
    ModelInfo { id: "gpt-4o", name: "GPT-4o (Best)" },
    ModelInfo { id: "gpt-4o-mini", name: "GPT-4o Mini (Fast)" },
    ModelInfo { id: "o1-mini", name: "o1-mini (Reasoning)" },
    ModelInfo { id: "o3-mini", name: "o3-mini (High Reasoning)" },
];

const DEEPSEEK_MODELS: &[ModelInfo] = &[
    ModelInfo { id: "deepseek-chat", name: "DeepSeek V3 (Chat)" },
    ModelInfo { id: "deepseek-reasoner", name: "DeepSeek R1 (Reasoning)" },
];

const GROQ_MODELS: &[ModelInfo] = &[
    ModelInfo { id: "llama-3.3-70b-versatile", name: "Llama 3.3 70B (Versatile)" },
    ModelInfo { id: "llama-3.1-8b-instant", name: "Llama 3.1 8B (Instant)" },
    ModelInfo { id: "mixtral-8x7b-32768", name: "Mixtral 8x7B" },
    ModelInfo { id: "gemma2-9b-it", name: "Gemma 2 9B" },
    ModelInfo { id: "deepseek-r1-distill-llama-70b", name: "DeepSeek R1 Distill 70B" },
];

impl Provider {
    pub const ALL: [Provider; 4] = [
        Provider::Gemini,
        Provider::OpenAi,
        Provider::DeepSeek,
        Provider::Groq,
    ];

    /// The stable tag stored in settings.
    pub fn id(&self) -> &'static str {
        match self {
            Provider::Gemini => "gemini",
            Provider::OpenAi => "openai",
            Provider::DeepSeek => "deepseek",
            Provider::Groq => "groq",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Provider::Gemini => "Gemini",
            Provider::OpenAi => "OpenAI",
            Provider::DeepSeek => "DeepSeek",
            Provider::Groq => "Groq",
        }
    }

    pub fn base_url(&self) -> &'static str {
        match self {
            Provider::Gemini => "https://generativelanguage.googleapis.com",
            Provider::OpenAi => "https://api.openai.com",
            Provider::DeepSeek => "https://api.deepseek.com",
            Provider::Groq => "https://api.groq.com/openai",
        }
    }

    /// Request path relative to [`Provider::base_url`].
    pub fn path(&self, model: &str) -> String {
        match self {
            Provider::Gemini => format!("/v1beta/models/{}:generateContent", model),
            Provider::OpenAi | Provider::Groq => String::from("/v1/chat/completions"),
            Provider::DeepSeek => String::from("/chat/completions"),
        }
    }

    pub fn auth(&self) -> AuthScheme {
        match self {
            Provider::Gemini => AuthScheme::QueryKey("key"),
            _ => AuthScheme::Bearer,
        }
    }

    pub fn wire_format(&self) -> WireFormat {
        match self {
            Provider::Gemini => WireFormat::Gemini,
            _ => WireFormat::ChatCompletions,
        }
    }

    /// Model used when the caller does not pick one.
    pub fn default_model(&self) -> &'static str {
        match self {
            Provider::Gemini => "gemini-2.0-flash",
            Provider::OpenAi => "gpt-4o-mini",
            Provider::DeepSeek => "deepseek-chat",
            Provider::Groq => "llama3-70b-8192",
        }
    }

    /// Curated model list offered for this provider.
    pub fn models(&self) -> &'static [ModelInfo] {
        match self {
            Provider::Gemini => GEMINI_MODELS,
            Provider::OpenAi => OPENAI_MODELS,
            Provider::DeepSeek => DEEPSEEK_MODELS,
            Provider::Groq => GROQ_MODELS,
        }
    }

    /// Pulls the generated text out of a successful response body.
    fn extract_text(&self, body: &str) -> Result<String, ProviderError> {
        let text = match self.wire_format() {
            WireFormat::Gemini => {
                let response: GeminiResponse = serde_json::from_str(body)
                    .map_err(|e| ProviderError::decode(*self, e))?;

                if response.candidates.is_empty() {
                    let reason = response.prompt_feedback.and_then(|f| f.block_reason);
                    return Err(match reason {
                        Some(reason) => {
                            warn!("{} blocked the prompt: {}", self, reason);
                            ProviderError::empty(*self, format!("content blocked: {}", reason))
                        }
                        None => ProviderError::empty(
                            *self,
                            "no candidates returned; check that the API key is valid and has quota",
                        ),
                    });
                }

                response
                    .candidates
                    .into_iter()
                    .next()
                    .and_then(|c| c.content)
                    .and_then(|c| c.parts.into_iter().find_map(|p| p.text))
            }
            WireFormat::ChatCompletions => {
                let response: ChatResponse = serde_json::from_str(body)
                    .map_err(|e| ProviderError::decode(*self, e))?;

                response
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|c| c.message)
                    .and_then(|m| m.content)
            }
        };

        match text {
            Some(text) if !text.trim().is_empty() => Ok(text),
            _ => Err(ProviderError::empty(*self, "response contained no generated text")),
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Provider {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tag = s.trim().to_ascii_lowercase();
        Provider::ALL
            .into_iter()
            .find(|p| p.id() == tag)
            .ok_or_else(|| ValidationError::UnknownProvider(s.to_string()))
    }
}

/// Category of a [`ProviderError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// The backend answered with a non-success status.
    Http,
    /// The backend answered successfully but without generated text.
    EmptyResponse,
    /// The request never got an answer (connection failure, timeout).
    Transport,
    /// A success response whose body was not the expected JSON.
    Decode,
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ProviderErrorKind::Http => "http",
            ProviderErrorKind::EmptyResponse => "empty_response",
            ProviderErrorKind::Transport => "transport",
            ProviderErrorKind::Decode => "decode",
        };
        f.write_str(label)
    }
}

/// A failed call to a model backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub provider: Provider,
    /// HTTP status, when the backend answered.
    pub status: Option<u16>,
    pub message: String,
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(
                f,
                "{} API error ({}, HTTP {}): {}",
                self.provider, self.kind, status, self.message
            ),
            None => write!(f, "{} API error ({}): {}", self.provider, self.kind, self.message),
        }
    }
}

impl ProviderError {
    fn http(provider: Provider, status: StatusCode, message: String) -> Self {
        Self {
            kind: ProviderErrorKind::Http,
            provider,
            status: Some(status.as_u16()),
            message,
        }
    }

    fn empty(provider: Provider, message: impl Into<String>) -> Self {
        Self {
            kind: ProviderErrorKind::EmptyResponse,
            provider,
            status: None,
            message: message.into(),
        }
    }

    fn transport(provider: Provider, err: reqwest::Error) -> Self {
        let message = if err.is_timeout() {
            format!("request timed out: {}", err)
        } else {
            err.to_string()
        };
        Self {
            kind: ProviderErrorKind::Transport,
            provider,
            status: None,
            message,
        }
    }

    fn decode(provider: Provider, err: serde_json::Error) -> Self {
        Self {
            kind: ProviderErrorKind::Decode,
            provider,
            status: None,
            message: format!("unexpected response body: {}", err),
        }
    }
}

#[derive(Serialize)]
struct GeminiRequest<'a> {
    contents: [GeminiRequestContent<'a>; 1],
}

#[derive(Serialize)]
struct GeminiRequestContent<'a> {
    parts: [GeminiRequestPart<'a>; 1],
}

#[derive(Serialize)]
struct GeminiRequestPart<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    prompt_feedback: Option<GeminiPromptFeedback>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Deserialize)]
struct GeminiPart {
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPromptFeedback {
    block_reason: Option<String>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatRequestMessage<'a>; 1],
}

#[derive(Serialize)]
struct ChatRequestMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: Option<ChatMessage>,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

/// Error envelope shared by every supported provider: `{"error": {"message": ...}}`.
#[derive(Deserialize)]
struct ErrorEnvelope {
    error: Option<ErrorBody>,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

/// HTTP client for the provider APIs.
pub struct LlmClient {
    client: Client,
    /// Replaces every provider's base URL when set.
    base_url: Option<String>,
}

impl LlmClient {
    /// Creates a new `LlmClient` from the runtime configuration.
    ///
    /// Every request is bounded by `config.request_timeout_secs`.
    pub fn new(config: &AppConfig) -> crate::Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.request_timeout())
            .gzip(true)
            .build()?;

        Ok(Self {
            client,
            base_url: config.api_base_url.clone(),
        })
    }

    /// Sends all requests to `base_url` instead of the provider's own host.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Sends `prompt` to `provider` and returns the raw generated text.
    ///
    /// # Arguments
    ///
    /// * `prompt` - The complete prompt, sent as a single user message.
    /// * `provider` - The backend to call.
    /// * `api_key` - The provider credential, placed the way the provider expects it.
    /// * `model` - The model to use. A blank or missing model falls back to the provider default.
    ///
    /// # Returns
    ///
    /// The generated text, or a `ProviderError` describing why none was produced. A single
    /// attempt is made.
    #[instrument(skip(self, prompt, api_key), fields(prompt_length = prompt.len()))]
    pub async fn generate(
        &self,
        prompt: &str,
        provider: Provider,
        api_key: &str,
        model: Option<&str>,
    ) -> Result<String, ProviderError> {
        let model = model
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| provider.default_model());
        let base = self
            .base_url
            .as_deref()
            .unwrap_or_else(|| provider.base_url())
            .trim_end_matches('/');
        let url = format!("{}{}", base, provider.path(model));

        debug!("Request URL: {}", url);

        let mut request = self.client.post(&url);
        request = match provider.auth() {
            AuthScheme::Bearer => request.bearer_auth(api_key),
            AuthScheme::QueryKey(name) => request.query(&[(name, api_key)]),
        };
        request = match provider.wire_format() {
            WireFormat::Gemini => request.json(&GeminiRequest {
                contents: [GeminiRequestContent {
                    parts: [GeminiRequestPart { text: prompt }],
                }],
            }),
            WireFormat::ChatCompletions => request.json(&ChatRequest {
                model,
                messages: [ChatRequestMessage {
                    role: "user",
                    content: prompt,
                }],
            }),
        };

        info!("Sending request to {} ({})", provider, model);

        let response = request
            .send()
            .await
            .map_err(|e| ProviderError::transport(provider, e))?;

        let status = response.status();
        debug!("Response status: {}", status);

        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::transport(provider, e))?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorEnvelope>(&body)
                .ok()
                .and_then(|e| e.error)
                .and_then(|e| e.message)
                .unwrap_or_else(|| {
                    status
                        .canonical_reason()
                        .unwrap_or("request failed")
                        .to_string()
                });
            error!("{} API error {}: {}", provider, status, message);
            return Err(ProviderError::http(provider, status, message));
        }

        provider.extract_text(&body)
    }
}
