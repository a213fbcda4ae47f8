use std::collections::VecDeque;

use super::{ChatMessage, ChatModel, ConversationHistory, ModelConfig, ModelOptions};
use crate::error::PlayerError;

/// Offline model replaying canned completions in order.
///
/// Handy for dry runs against a game server and for tests. Once the script is exhausted every
/// call fails with [`PlayerError::BackendUnavailable`].
#[derive(Debug, Clone)]
pub struct ScriptedModel {
    replies: VecDeque<String>,
    failures_left: usize,
    calls: usize,
    config: ModelConfig,
    history: ConversationHistory,
}

impl ScriptedModel {
    /// Replay `replies`, one per call.
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ScriptedModel {
            replies: replies.into_iter().map(Into::into).collect(),
            failures_left: 0,
            calls: 0,
            config: ModelConfig::new("scripted"),
            history: vec![],
        }
    }

    /// Make the first `n` calls fail as if the backend were down.
    pub fn failing_first(mut self, n: usize) -> Self {
        self.failures_left = n;
        self
    }

    /// Number of `chat` calls made so far, failed ones included.
    pub fn calls(&self) -> usize {
        self.calls
    }

    /// Replies not consumed yet.
    pub fn remaining(&self) -> usize {
        self.replies.len()
    }
}

impl ChatModel for ScriptedModel {
    fn chat(&mut self) -> Result<String, PlayerError> {
        self.calls += 1;
        if self.failures_left > 0 {
            self.failures_left -= 1;
            return Err(PlayerError::BackendUnavailable(
                "scripted outage".to_owned(),
            ));
        }
        let reply = self.replies.pop_front().ok_or_else(|| {
            PlayerError::BackendUnavailable("scripted model ran out of replies".to_owned())
        })?;
        self.history.push(ChatMessage::assistant(reply.clone()));
        Ok(reply)
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
