//! Evaluation of a model over several independent players.
//!
//! This module defines the [`Evaluator`] type. For each player it:
//!
//! - builds a fresh model through a user-supplied factory,
//! - opens its own connection to the game server,
//! - plays `n_turns` episodes (see [`Player::play`]),
//! - reports the scores, or why the session stopped.
//!
//! Players share nothing: each has its own stream, history and score list. They run one after
//! the other by default, or on one thread each with [`Evaluator::with_parallel`].

use std::marker::PhantomData;
use std::sync::{mpsc, Arc};

use tracing::{info, instrument, warn};

use crate::configuration::Configuration;
use crate::error::{PlayerError, SessionAborted};
use crate::model::ChatModel;
use crate::score::{aggregate, SessionResult};
use crate::session::Player;

/// Outcome of one player's session.
#[derive(Debug)]
pub struct PlayerReport {
    /// 0-based index of the player.
    pub player: usize,
    /// Every score, or the partial result and the reason the session stopped.
    pub outcome: Result<SessionResult, SessionAborted>,
}

/// Outcomes of every player, ordered by player index.
#[derive(Debug, Default)]
pub struct EvaluationReport {
    /// One report per player.
    pub players: Vec<PlayerReport>,
}

impl EvaluationReport {
    /// Sessions that played every episode.
    pub fn completed(&self) -> impl Iterator<Item = (usize, &SessionResult)> {
        self.players
            .iter()
            .filter_map(|r| r.outcome.as_ref().ok().map(|s| (r.player, s)))
    }

    /// Sessions that stopped early.
    pub fn failures(&self) -> impl Iterator<Item = (usize, &SessionAborted)> {
        self.players
            .iter()
            .filter_map(|r| r.outcome.as_ref().err().map(|e| (r.player, e)))
    }

    /// Mean over every episode of every completed session.
    ///
    /// # Errors
    /// [`PlayerError::EmptyResult`] if no session completed any episode.
    pub fn mean(&self) -> Result<f64, PlayerError> {
        let scores = self
            .completed()
            .flat_map(|(_, result)| result.scores().iter().copied())
            .collect::<Vec<_>>();
        aggregate(&scores)
    }
}

/// Runs `n_players` independent sessions of the same model against a game server.
///
/// # Type Parameters
/// - `M`: the [`ChatModel`] each player gets
/// - `F`: factory building one model per player
pub struct Evaluator<M, F>
where
    F: Fn() -> Result<M, PlayerError>,
{
    factory: Arc<F>,
    config: Configuration,
    parallel: bool,
    _m: PhantomData<fn() -> M>,
}

impl<M, F> Evaluator<M, F>
where
    M: ChatModel + 'static,
    F: Fn() -> Result<M, PlayerError> + Send + Sync + 'static,
{
    /// `factory` is called once per player, `config` is shared by all of them.
    pub fn new(factory: F, config: Configuration) -> Self {
        Evaluator {
            factory: Arc::new(factory),
            config,
            parallel: false,
            _m: PhantomData,
        }
    }

    /// Run every player on its own thread instead of one after the other.
    pub fn with_parallel(mut self, value: bool) -> Self {
        self.parallel = value;
        self
    }

    /// Play every session and gather their outcomes.
    #[instrument(skip(self))]
    pub fn evaluate(&self, n_players: usize) -> EvaluationReport {
        let mut players = if self.parallel {
            self.evaluate_parallel(n_players)
        } else {
            (0..n_players)
                .map(|player| PlayerReport {
                    player,
                    outcome: run_player(player, self.factory.as_ref(), &self.config),
                })
                .collect()
        };
        players.sort_by_key(|r| r.player);

        let report = EvaluationReport { players };
        match report.mean() {
            Ok(mean) => info!(mean, "evaluation finished"),
            Err(e) => warn!("evaluation finished without a score: {e}"),
        }
        report
    }

    fn evaluate_parallel(&self, n_players: usize) -> Vec<PlayerReport> {
        let (tx_result, rx_result) = mpsc::channel();

        for player in 0..n_players {
            let tx_result = tx_result.clone();
            let factory = Arc::clone(&self.factory);
            let config = self.config.clone();
            let spawned = std::thread::Builder::new()
                .name(format!("player-{player}"))
                .spawn(move || {
                    let outcome = run_player(player, factory.as_ref(), &config);
                    // receiver only goes away once every sender is done
                    let _ = tx_result.send(PlayerReport { player, outcome });
                });
            if let Err(e) = spawned {
                warn!(player, "could not spawn player thread: {e}");
            }
        }
        drop(tx_result);

        let mut reports: Vec<PlayerReport> = rx_result.iter().collect();

        // a player whose thread died (or never started) sent nothing
        for player in 0..n_players {
            if !reports.iter().any(|r| r.player == player) {
                reports.push(PlayerReport {
                    player,
                    outcome: Err(SessionAborted {
                        completed: SessionResult::new(),
                        episode: 1,
                        error: PlayerError::Io(std::io::Error::other(
                            "player thread terminated unexpectedly",
                        )),
                    }),
                });
            }
        }
        reports
    }
}

#[instrument(skip(factory, config))]
fn run_player<M, F>(
    player: usize,
    factory: &F,
    config: &Configuration,
) -> Result<SessionResult, SessionAborted>
where
    M: ChatModel,
    F: Fn() -> Result<M, PlayerError>,
{
    let setup = || -> Result<Player<M, std::net::TcpStream>, PlayerError> {
        let model = factory()?;
        Player::connect(model, config)
    };
    let mut session = setup().map_err(|error| SessionAborted {
        completed: SessionResult::new(),
        episode: 1,
        error,
    })?;

    let result = session.play(config.n_turns)?;
    info!(player, scores = %result, "player done");
    Ok(result)
}
