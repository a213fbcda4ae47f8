use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::{
    http_client, post_json, ChatMessage, ChatModel, ConversationHistory, ModelConfig, ModelOptions,
};
use crate::error::PlayerError;

/// Model served by a local Ollama instance through `POST /api/chat`.
#[derive(Debug)]
pub struct OllamaModel {
    client: Client,
    endpoint: String,
    config: ModelConfig,
    history: ConversationHistory,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    options: SamplingOptions,
}

#[derive(Serialize)]
struct SamplingOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: String,
}

impl OllamaModel {
    /// `host` is the server base URL, e.g. `http://127.0.0.1:11434`.
    pub fn new(host: &str, config: ModelConfig) -> Result<Self, PlayerError> {
        Ok(OllamaModel {
            client: http_client()?,
            endpoint: format!("{}/api/chat", host.trim_end_matches('/')),
            config,
            history: vec![],
        })
    }

    /// Full URL of the chat endpoint.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl ChatModel for OllamaModel {
    #[instrument(skip(self), fields(model = %self.config.model, turns = self.history.len()))]
    fn chat(&mut self) -> Result<String, PlayerError> {
        let body = ChatRequest {
            model: &self.config.model,
            messages: &self.history,
            stream: false,
            options: SamplingOptions {
                temperature: self.config.temperature,
                num_predict: self.config.max_tokens,
            },
        };
        let request = self
            .client
            .post(&self.endpoint)
            .timeout(self.config.request_timeout);

        let response: ChatResponse = post_json(request, &body, "ollama")?;
        let content = response.message.content;
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::stub_server::serve_once;
    use crate::model::Role;

    #[test]
    fn request_body_shape() {
        let history = vec![ChatMessage::user("Hello")];
        let body = ChatRequest {
            model: "gemma",
            messages: &history,
            stream: false,
            options: SamplingOptions {
                temperature: 0.0,
                num_predict: 20,
            },
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "model": "gemma",
                "messages": [{"role": "user", "content": "Hello"}],
                "stream": false,
                "options": {"temperature": 0.0, "num_predict": 20}
            })
        );
    }

    #[test]
    fn chat_appends_completion() {
        let (url, server) = serve_once(
            200,
            r#"{"model":"gemma","message":{"role":"assistant","content":"position 2"},"done":true}"#,
        );
        let mut model = OllamaModel::new(&url, ModelConfig::new("gemma")).unwrap();
        model.push_user("Which box?");

        assert_eq!(model.chat().unwrap(), "position 2");
        assert_eq!(
            model.history(),
            vec![
                ChatMessage::user("Which box?"),
                ChatMessage::assistant("position 2")
            ]
        );

        let captured = server.join().unwrap();
        assert!(captured.head.starts_with("POST /api/chat "));
        let sent: serde_json::Value = serde_json::from_str(&captured.body).unwrap();
        assert_eq!(sent["model"], "gemma");
        assert_eq!(sent["options"]["num_predict"], 20);
        assert_eq!(sent["messages"][0]["content"], "Which box?");
    }

    #[test]
    fn error_status_is_backend_unavailable() {
        let (url, server) = serve_once(500, r#"{"error":"model not loaded"}"#);
        let mut model = OllamaModel::new(&url, ModelConfig::new("gemma")).unwrap();
        model.push_user("Hello");

        assert!(matches!(
            model.chat(),
            Err(PlayerError::BackendUnavailable(_))
        ));
        assert_eq!(model.history().len(), 1);
        server.join().unwrap();
    }

    #[test]
    fn endpoint_ignores_trailing_slash() {
        let model = OllamaModel::new("http://localhost:11434/", ModelConfig::new("gemma")).unwrap();
        assert_eq!(model.endpoint(), "http://localhost:11434/api/chat");
    }

    #[test]
    fn unreachable_server_leaves_history_untouched() {
        // nothing listens on a port we just released
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let mut model = OllamaModel::new(
            &format!("http://127.0.0.1:{port}"),
            ModelConfig::new("gemma"),
        )
        .unwrap();
        model.push_user("Hello");

        let res = model.chat();
        assert!(matches!(res, Err(PlayerError::BackendUnavailable(_))));
        assert_eq!(model.history().len(), 1);
        assert_eq!(model.history()[0].role, Role::User);
    }
}
