use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::{
    http_client, post_json, ChatMessage, ChatModel, ConversationHistory, ModelConfig, ModelOptions,
};
use crate::error::PlayerError;

/// Hosted model behind an OpenAI-compatible `POST /v1/chat/completions`.
pub struct OpenAiModel {
    client: Client,
    endpoint: String,
    api_key: String,
    config: ModelConfig,
    history: ConversationHistory,
}

impl std::fmt::Debug for OpenAiModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiModel")
            .field("endpoint", &self.endpoint)
            .field("config", &self.config)
            .field("history", &self.history.len())
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    // null when the completion was cut by a filter
    content: Option<String>,
}

impl OpenAiModel {
    /// `base_url` is the API root, e.g. `https://api.openai.com`.
    pub fn new(
        base_url: &str,
        api_key: impl Into<String>,
        config: ModelConfig,
    ) -> Result<Self, PlayerError> {
        Ok(OpenAiModel {
            client: http_client()?,
            endpoint: format!("{}/v1/chat/completions", base_url.trim_end_matches('/')),
            api_key: api_key.into(),
            config,
            history: vec![],
        })
    }
}

impl ChatModel for OpenAiModel {
    #[instrument(skip(self), fields(model = %self.config.model, turns = self.history.len()))]
    fn chat(&mut self) -> Result<String, PlayerError> {
        let body = ChatRequest {
            model: &self.config.model,
            messages: &self.history,
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };
        let request = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .timeout(self.config.request_timeout);

        let response: ChatCompletionResponse = post_json(request, &body, "openai")?;
        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                PlayerError::BackendUnavailable("openai response contained no message".to_owned())
            })?;
        debug!(completion = %content);

        self.history.push(ChatMessage::assistant(content.clone()));
        Ok(content)
    }

    fn history(&self) -> ConversationHistory {
        self.history.clone()
    }

    fn set_history(&mut self, history: ConversationHistory) {
        self.history = history;
    }

    fn reconfigure(&mut self, options: ModelOptions) {
        self.config.apply(options);
    }

    fn config(&self) -> &ModelConfig {
        &self.config
    }

    fn push_user(&mut self, content: &str) {
        self.history.push(ChatMessage::user(content));
    }
}
