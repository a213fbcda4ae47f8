//! Error types shared by the player core.
//!
//! None of these are swallowed inside the crate. They unwind to whoever drives the session,
//! which decides whether to abort the run or move on to the next player.

use crate::score::SessionResult;

/// Everything that can go wrong while a player talks to a game server.
#[derive(Debug, thiserror::Error)]
pub enum PlayerError {
    /// The transport reached end-of-stream before a complete frame was read.
    #[error("stream closed before a complete frame was received")]
    StreamClosed,

    /// A frame could not be encoded or decoded.
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// A terminal message did not carry a `Final score: N` pattern.
    #[error("no final score found in terminal message: {0:?}")]
    ScoreParseError(String),

    /// The model backend failed (transport error, timeout, bad status, bad body).
    #[error("model backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Aggregation over zero episodes.
    #[error("cannot aggregate an empty result")]
    EmptyResult,

    /// No backend is registered for this model identifier.
    #[error("unknown model: {0}")]
    UnknownModel(String),

    /// A hosted backend was selected without credentials.
    #[error("missing API key, set {0}")]
    MissingApiKey(&'static str),

    /// Underlying transport error (including read timeouts).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A session stopped before playing every requested episode.
///
/// Carries the scores of the episodes that did complete, so the caller can decide whether a
/// partial result is still useful.
#[derive(Debug)]
pub struct SessionAborted {
    /// Scores of the episodes completed before the failure.
    pub completed: SessionResult,
    /// 1-based index of the episode that was in progress.
    pub episode: usize,
    /// What went wrong.
    pub error: PlayerError,
}

impl std::fmt::Display for SessionAborted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "session aborted during episode {} after {} completed episode(s): {}",
            self.episode,
            self.completed.len(),
            self.error
        )
    }
}

impl std::error::Error for SessionAborted {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}
