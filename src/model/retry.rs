use std::time::Duration;

use tracing::warn;

use super::{ChatModel, ConversationHistory, ModelConfig, ModelOptions};
use crate::error::PlayerError;

/// Retries [`ChatModel::chat`] on [`PlayerError::BackendUnavailable`].
///
/// A failed `chat` never touches the history, so a retry always sees the same conversation.
/// Any other error is returned at once.
#[derive(Debug)]
pub struct RetryingModel<M: ChatModel> {
    inner: M,
    max_attempts: u32,
    delay: Duration,
}

impl<M: ChatModel> RetryingModel<M> {
    /// `max_attempts` counts the first try; it is raised to 1 if given 0.
    pub fn new(inner: M, max_attempts: u32, delay: Duration) -> Self {
        RetryingModel {
            inner,
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// The wrapped model.
    pub fn inner(&self) -> &M {
        &self.inner
    }

    /// Unwrap the model.
    pub fn into_inner(self) -> M {
        self.inner
    }
}

impl<M: ChatModel> ChatModel for RetryingModel<M> {
    fn chat(&mut self) -> Result<String, PlayerError> {
        let mut attempt = 1;
        loop {
            match self.inner.chat() {
                Err(PlayerError::BackendUnavailable(reason)) if attempt < self.max_attempts => {
                    warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        "model call failed, retrying in {:?}: {reason}",
                        self.delay
                    );
                    std::thread::sleep(self.delay);
                    attempt += 1;
                }
                res => return res,
            }
        }
    }

    fn history(&self) -> ConversationHistory {
        self.inner.history()
    }

    fn set_history(&mut self, history: ConversationHistory) {
        self.inner.set_history(history)
    }

    fn reconfigure(&mut self, options: ModelOptions) {
        self.inner.reconfigure(options)
    }

    fn config(&self) -> &ModelConfig {
        self.inner.config()
    }

    fn push_user(&mut self, content: &str) {
        self.inner.push_user(content)
    }
}
