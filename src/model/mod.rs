//! Chat model adapters.
//!
//! A [`ChatModel`] owns its conversation history and produces one assistant turn per
//! [`chat`](ChatModel::chat) call. Backends are picked once, by model identifier, through
//! [`choose_model`]:
//!
//! | identifier                                             | backend         |
//! |--------------------------------------------------------|-----------------|
//! | `gpt-3.5-turbo`, `openai:<id>`                         | [`OpenAiModel`] |
//! | `llama3:70b-instruct`, `gemma`, `phi3:14b`, `vicuna:13b`, `ollama:<id>` | [`OllamaModel`] |
//!
//! Anything else is rejected with [`PlayerError::UnknownModel`] before any game is played.

use std::time::Duration;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::PlayerError;

mod ollama;
mod openai;
mod retry;
mod scripted;

pub use ollama::OllamaModel;
pub use openai::OpenAiModel;
pub use retry::RetryingModel;
pub use scripted::ScriptedModel;

/// Speaker of a [`ChatMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instructions framing the whole conversation.
    System,
    /// Game text forwarded to the model.
    User,
    /// The model's own completions.
    Assistant,
}

/// One turn of a conversation, in the shape both backends accept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Who is speaking.
    pub role: Role,
    /// What was said.
    pub content: String,
}

impl ChatMessage {
    /// A user turn, i.e. game text.
    pub fn user(content: impl Into<String>) -> Self {
        ChatMessage {
            role: Role::User,
            content: content.into(),
        }
    }

    /// An assistant turn, i.e. a completion.
    pub fn assistant(content: impl Into<String>) -> Self {
        ChatMessage {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    /// A system prompt.
    pub fn system(content: impl Into<String>) -> Self {
        ChatMessage {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// Ordered conversation, oldest first.
pub type ConversationHistory = Vec<ChatMessage>;

/// Sampling knobs sent with every completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelConfig {
    /// Backend model identifier.
    pub model: String,
    /// Sampling temperature, 0 for deterministic answers.
    pub temperature: f32,
    /// Cap on the length of a completion, in tokens.
    pub max_tokens: u32,
    /// Upper bound on one completion request.
    pub request_timeout: Duration,
}

impl ModelConfig {
    /// Deterministic sampling.
    pub const DEFAULT_TEMPERATURE: f32 = 0.0;
    /// Enough for a move and a few words around it.
    pub const DEFAULT_MAX_TOKENS: u32 = 20;
    /// Per completion request.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

    /// Defaults for `model`.
    pub fn new(model: impl Into<String>) -> Self {
        ModelConfig {
            model: model.into(),
            temperature: Self::DEFAULT_TEMPERATURE,
            max_tokens: Self::DEFAULT_MAX_TOKENS,
            request_timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    /// Overwrite every field set in `options`.
    pub fn apply(&mut self, options: ModelOptions) {
        if let Some(model) = options.model {
            self.model = model;
        }
        if let Some(temperature) = options.temperature {
            self.temperature = temperature;
        }
        if let Some(max_tokens) = options.max_tokens {
            self.max_tokens = max_tokens;
        }
        if let Some(timeout) = options.request_timeout {
            self.request_timeout = timeout;
        }
    }
}

/// Partial update of a [`ModelConfig`], see [`ChatModel::reconfigure`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelOptions {
    /// See [`ModelConfig::model`].
    pub model: Option<String>,
    /// See [`ModelConfig::temperature`].
    pub temperature: Option<f32>,
    /// See [`ModelConfig::max_tokens`].
    pub max_tokens: Option<u32>,
    /// See [`ModelConfig::request_timeout`].
    pub request_timeout: Option<Duration>,
}

impl ModelOptions {
    /// Switch to another model of the same backend.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the completion length cap.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set the per-request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }
}

/// A chat-capable model backend.
///
/// Implementations own their history exclusively; nothing else mutates it between calls.
pub trait ChatModel: Send {
    /// Produce the next assistant turn from the current history.
    ///
    /// On success the returned text is appended to the history as an assistant turn. On failure
    /// the history is left exactly as it was.
    ///
    /// # Errors
    /// [`PlayerError::BackendUnavailable`] if the backend cannot be reached, times out, or answers
    /// with something unusable.
    fn chat(&mut self) -> Result<String, PlayerError>;

    /// Copy of the current history.
    fn history(&self) -> ConversationHistory;

    /// Replace the whole history.
    fn set_history(&mut self, history: ConversationHistory);

    /// Change sampling settings for the next calls.
    fn reconfigure(&mut self, options: ModelOptions);

    /// Settings used for the next call.
    fn config(&self) -> &ModelConfig;

    /// Append a user turn to the history.
    fn push_user(&mut self, content: &str) {
        let mut history = self.history();
        history.push(ChatMessage::user(content));
        self.set_history(history);
    }
}

impl<M: ChatModel + ?Sized> ChatModel for Box<M> {
    fn chat(&mut self) -> Result<String, PlayerError> {
        (**self).chat()
    }

    fn history(&self) -> ConversationHistory {
        (**self).history()
    }

    fn set_history(&mut self, history: ConversationHistory) {
        (**self).set_history(history)
    }

    fn reconfigure(&mut self, options: ModelOptions) {
        (**self).reconfigure(options)
    }

    fn config(&self) -> &ModelConfig {
        (**self).config()
    }

    fn push_user(&mut self, content: &str) {
        (**self).push_user(content)
    }
}

/// Where the backends live and how to authenticate.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendSettings {
    /// Base URL of the Ollama server.
    pub ollama_host: String,
    /// Base URL of the OpenAI-compatible API.
    pub openai_base_url: String,
    /// Bearer token for the hosted backend.
    pub openai_api_key: Option<String>,
}

impl BackendSettings {
    /// Local Ollama server.
    pub const DEFAULT_OLLAMA_HOST: &'static str = "http://127.0.0.1:11434";
    /// Public OpenAI API.
    pub const DEFAULT_OPENAI_BASE_URL: &'static str = "https://api.openai.com";

    /// Read `OLLAMA_HOST`, `OPENAI_BASE_URL` and `OPENAI_KEY` (falling back to
    /// `OPENAI_API_KEY`). Unset variables keep their defaults.
    pub fn from_env() -> Self {
        let default = Self::default();
        let non_empty = |var: &str| std::env::var(var).ok().filter(|v| !v.trim().is_empty());

        Self {
            ollama_host: non_empty("OLLAMA_HOST")
                .map(|host| with_scheme(&host))
                .unwrap_or(default.ollama_host),
            openai_base_url: non_empty("OPENAI_BASE_URL").unwrap_or(default.openai_base_url),
            openai_api_key: non_empty("OPENAI_KEY").or_else(|| non_empty("OPENAI_API_KEY")),
        }
    }

    /// Override the Ollama base URL.
    pub fn with_ollama_host(mut self, host: impl Into<String>) -> Self {
        self.ollama_host = host.into();
        self
    }

    /// Override the OpenAI-compatible base URL.
    pub fn with_openai_base_url(mut self, url: impl Into<String>) -> Self {
        self.openai_base_url = url.into();
        self
    }

    /// Set the key used by the hosted backend.
    pub fn with_openai_api_key(mut self, key: impl Into<String>) -> Self {
        self.openai_api_key = Some(key.into());
        self
    }
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            ollama_host: Self::DEFAULT_OLLAMA_HOST.to_owned(),
            openai_base_url: Self::DEFAULT_OPENAI_BASE_URL.to_owned(),
            openai_api_key: None,
        }
    }
}

// OLLAMA_HOST is commonly set as a bare `host:port`
fn with_scheme(host: &str) -> String {
    if host.contains("://") {
        host.to_owned()
    } else {
        format!("http://{host}")
    }
}

/// Backend families a model identifier can resolve to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// `/api/chat` of an Ollama server.
    Ollama,
    /// `/v1/chat/completions` of an OpenAI-compatible API.
    OpenAi,
}

const OPENAI_MODELS: &[&str] = &["gpt-3.5-turbo"];
const OLLAMA_MODELS: &[&str] = &["llama3:70b-instruct", "gemma", "phi3:14b", "vicuna:13b"];

/// Resolve `name` to a backend and the identifier that backend expects.
pub fn resolve_backend(name: &str) -> Result<(Backend, &str), PlayerError> {
    if let Some(model) = name.strip_prefix("openai:") {
        return Ok((Backend::OpenAi, model));
    }
    if let Some(model) = name.strip_prefix("ollama:") {
        return Ok((Backend::Ollama, model));
    }
    if OPENAI_MODELS.contains(&name) {
        Ok((Backend::OpenAi, name))
    } else if OLLAMA_MODELS.contains(&name) {
        Ok((Backend::Ollama, name))
    } else {
        Err(PlayerError::UnknownModel(name.to_owned()))
    }
}

/// Build the adapter serving `name`.
///
/// # Errors
/// [`PlayerError::UnknownModel`] for identifiers no backend serves,
/// [`PlayerError::MissingApiKey`] when a hosted backend has no credentials.
#[instrument(skip(settings))]
pub fn choose_model(
    name: &str,
    settings: &BackendSettings,
) -> Result<Box<dyn ChatModel>, PlayerError> {
    let (backend, model) = resolve_backend(name)?;
    if model.is_empty() {
        return Err(PlayerError::UnknownModel(name.to_owned()));
    }
    debug!(?backend, model, "model selected");

    let config = ModelConfig::new(model);
    Ok(match backend {
        Backend::OpenAi => {
            let key = settings
                .openai_api_key
                .clone()
                .ok_or(PlayerError::MissingApiKey("OPENAI_KEY"))?;
            Box::new(OpenAiModel::new(&settings.openai_base_url, key, config)?)
        }
        Backend::Ollama => Box::new(OllamaModel::new(&settings.ollama_host, config)?),
    })
}

fn http_client() -> Result<reqwest::blocking::Client, PlayerError> {
    reqwest::blocking::Client::builder()
        .build()
        .map_err(|e| PlayerError::BackendUnavailable(format!("could not build HTTP client: {e}")))
}

/// POST `body` as JSON and decode the JSON answer, mapping every failure to
/// [`PlayerError::BackendUnavailable`].
fn post_json<B: Serialize, R: DeserializeOwned>(
    request: reqwest::blocking::RequestBuilder,
    body: &B,
    backend: &str,
) -> Result<R, PlayerError> {
    request
        .json(body)
        .send()
        .map_err(|e| PlayerError::BackendUnavailable(format!("{backend} request failed: {e}")))?
        .error_for_status()
        .map_err(|e| PlayerError::BackendUnavailable(format!("{backend} returned an error: {e}")))?
        .json::<R>()
        .map_err(|e| {
            PlayerError::BackendUnavailable(format!("{backend} response decode failed: {e}"))
        })
}
