//! Turn loop driving one player through a session of game episodes.
//!
//! Every inbound message is classified as one of three [`Turn`]s:
//!
//! - [`Turn::NeedsMove`]: the content goes to the model as a user turn, the completion is run
//!   through [`extract_move`] and the move is sent back.
//! - [`Turn::Informational`]: the content goes to the model as a user turn, nothing is sent.
//! - [`Turn::Terminal`]: the content carries the terminal marker; the `Final score: N` is parsed
//!   and the episode ends.
//!
//! The loop is strictly request/response: a read never starts while a write is pending. Closing
//! the underlying stream is the way to cancel a session; it surfaces as
//! [`PlayerError::StreamClosed`].

use std::io::{Read, Write};
use std::net::TcpStream;

use tracing::{debug, error, info, instrument};

use crate::channel::{connect, FramedChannel};
use crate::codec::{Codec, Message};
use crate::configuration::Configuration;
use crate::error::{PlayerError, SessionAborted};
use crate::extractor::extract_move;
use crate::model::ChatModel;
use crate::score::{parse_final_score, EpisodeScore, SessionResult};

/// What happens to the model history between two episodes of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HistoryPolicy {
    /// Every episode starts from the history the model had when the session started.
    #[default]
    Fresh,
    /// The conversation carries over from one episode to the next.
    Persistent,
}

/// Kind of an inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Turn {
    /// The server waits for a move.
    NeedsMove,
    /// Game text, no answer expected.
    Informational,
    /// End of the episode, carries the score.
    Terminal,
}

/// Classify `message`. The terminal marker wins over `needs_input`; an empty marker never
/// matches.
pub fn classify(message: &Message, terminal_marker: &str) -> Turn {
    if !terminal_marker.is_empty() && message.content.contains(terminal_marker) {
        Turn::Terminal
    } else if message.needs_input {
        Turn::NeedsMove
    } else {
        Turn::Informational
    }
}

/// Reply sent after an episode when the continuation signal is enabled.
const CONTINUE: &str = "Y";
const STOP: &str = "N";

/// A model playing over one connection.
pub struct Player<M: ChatModel, S: Read + Write> {
    model: M,
    channel: FramedChannel<S>,
    codec: Box<dyn Codec>,
    history_policy: HistoryPolicy,
    continuation_signal: bool,
    terminal_marker: String,
}

impl<M: ChatModel> Player<M, TcpStream> {
    /// Connect to the game server described by `config`.
    pub fn connect(model: M, config: &Configuration) -> Result<Self, PlayerError> {
        let stream = connect(config.address(), config.read_timeout)?;
        Ok(Self::new(model, stream, config))
    }
}

impl<M: ChatModel, S: Read + Write> Player<M, S> {
    /// Play over an already opened stream, speaking `config.wire_format`.
    pub fn new(model: M, stream: S, config: &Configuration) -> Self {
        let codec = config.wire_format.codec();
        Player {
            model,
            channel: FramedChannel::new(stream, codec.separator()),
            codec,
            history_policy: config.history_policy,
            continuation_signal: config.continuation_signal(),
            terminal_marker: config.terminal_marker.clone(),
        }
    }

    /// The model playing this session.
    pub fn model(&self) -> &M {
        &self.model
    }

    /// Mutable access to the model, e.g. to seed its history before [`Player::play`].
    pub fn model_mut(&mut self) -> &mut M {
        &mut self.model
    }

    /// The underlying connection.
    pub fn stream(&self) -> &S {
        self.channel.get_ref()
    }

    /// Take the model and the stream back. Buffered, unread bytes are lost.
    pub fn into_parts(self) -> (M, S) {
        (self.model, self.channel.into_inner())
    }

    fn receive(&mut self) -> Result<Message, PlayerError> {
        let frame = self.channel.read_frame()?;
        self.codec.decode(&frame)
    }

    fn send(&mut self, message: &Message) -> Result<(), PlayerError> {
        let payload = self.codec.encode(message)?;
        self.channel.write_frame(&payload)
    }

    /// Play until the server announces the end of the game, and return the final score.
    ///
    /// # Errors
    /// Any [`PlayerError`] is fatal to the episode: the stream closing, an undecodable frame, a
    /// model failure, or a terminal message without a score.
    #[instrument(skip(self))]
    pub fn play_episode(&mut self) -> Result<EpisodeScore, PlayerError> {
        loop {
            let message = self.receive()?;
            info!("{}", message.content);

            match classify(&message, &self.terminal_marker) {
                Turn::NeedsMove => {
                    self.model.push_user(&message.content);
                    let completion = self.model.chat()?;
                    let chosen = extract_move(&completion);
                    info!(completion = %completion.trim(), "AI: {chosen}");
                    self.send(&Message::reply(chosen))?;
                }
                Turn::Informational => {
                    self.model.push_user(&message.content);
                }
                Turn::Terminal => {
                    let score = parse_final_score(&message.content)?;
                    info!(score, "episode finished");
                    return Ok(score);
                }
            }
        }
    }

    /// Play `n_turns` episodes in a row and collect their scores.
    ///
    /// When the continuation signal is enabled (structured format only), `Y` is sent after every
    /// episode but the last and `N` after the last one. An episode only counts once its signal
    /// has been delivered.
    ///
    /// # Errors
    /// [`SessionAborted`] with the scores completed so far and the episode that failed.
    #[instrument(skip(self))]
    pub fn play(&mut self, n_turns: usize) -> Result<SessionResult, SessionAborted> {
        let mut result = SessionResult::new();
        let baseline = self.model.history();

        for episode in 1..=n_turns {
            if episode > 1 && self.history_policy == HistoryPolicy::Fresh {
                debug!("resetting model history");
                self.model.set_history(baseline.clone());
            }

            match self.play_single(episode, n_turns) {
                Ok(score) => result.push(score),
                Err(error) => {
                    error!(episode, completed = result.len(), "session aborted: {error}");
                    return Err(SessionAborted {
                        completed: result,
                        episode,
                        error,
                    });
                }
            }
        }

        info!(scores = %result, "session finished");
        Ok(result)
    }

    fn play_single(
        &mut self,
        episode: usize,
        n_turns: usize,
    ) -> Result<EpisodeScore, PlayerError> {
        let score = self.play_episode()?;
        if self.continuation_signal {
            let signal = if episode < n_turns { CONTINUE } else { STOP };
            debug!(signal, "episode boundary");
            self.send(&Message::reply(signal))?;
        }
        Ok(score)
    }
}
