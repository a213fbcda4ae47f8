//! # LLM Player
//!
//! A harness connecting a language-model "player" to an external game server over TCP.
//!
//! It provides:
//! - Separator-delimited framing over any byte stream ([`channel`])
//! - The two wire formats spoken by game servers, JSON lines and legacy raw text ([`codec`])
//! - Chat model adapters for local (Ollama) and hosted (OpenAI-compatible) backends ([`model`])
//! - Parsing of free-text completions into moves ([`extractor`])
//! - The turn loop playing one or more episodes over a connection ([`session`])
//! - Score parsing, aggregation and persistence ([`score`])
//! - Independent multi-player evaluations ([`evaluator`])
//!
//! The game itself is an opaque server: this crate never judges whether a move is legal.
//!
//! # Protocol
//!
//! Each frame carries one message `{"require_input": bool, "content": string}`:
//!
//! - Server -> Player: game text. When `require_input` is true a move is expected.
//! - Player -> Server: the move, with `require_input` set to false.
//! - A message containing `Game Over!` ends the episode and carries `Final score: N`.
//! - Optionally, after each episode: `Y` to play another one, `N` to stop.
//!
//! # Usage Example
//!
//! ```no_run
//! use llm_player::prelude::*;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = Configuration::new()
//!         .with_mode(GameMode::Zero)
//!         .with_n_turns(3)
//!         .with_history_policy(HistoryPolicy::Fresh);
//!
//!     let model = choose_model("gemma", &BackendSettings::from_env())?;
//!     let mut player = Player::connect(model, &config)?;
//!
//!     let scores = player.play(config.n_turns())?;
//!     println!("{scores}: mean {}", scores.mean()?);
//!     Ok(())
//! }
//! ```
#![warn(missing_docs)]

pub use anyhow;

pub mod channel;
pub mod codec;
pub mod configuration;
pub mod error;
pub mod evaluator;
pub mod extractor;
pub mod logger;
pub mod model;
pub mod score;
pub mod session;

/// Commonly used types and traits for quick access.
///
/// Import this prelude to get started easily:
/// ```rust
/// use llm_player::prelude::*;
/// ```
pub mod prelude {
    pub use crate::codec::{Message, WireFormat};
    pub use crate::configuration::{Configuration, GameMode};
    pub use crate::error::{PlayerError, SessionAborted};
    pub use crate::evaluator::Evaluator;
    pub use crate::extractor::extract_move;
    pub use crate::model::{choose_model, BackendSettings, ChatModel, ModelOptions};
    pub use crate::score::{aggregate, write_mean_score, SessionResult};
    pub use crate::session::{HistoryPolicy, Player};
}
