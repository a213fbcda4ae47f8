use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};

use llm_player::model::{
    ChatMessage, ConversationHistory, ModelConfig, ModelOptions, Role, ScriptedModel,
};
use llm_player::prelude::*;

use crate::game_server::Script;

mod game_server;

fn config_for(addr: std::net::SocketAddr) -> Configuration {
    Configuration::new()
        .with_host(addr.ip().to_string())
        .with_port(addr.port())
        .with_n_turns(2)
        .with_verbose(false)
}

/// Sends the final history of its model when the session drops it.
struct Recorded {
    inner: ScriptedModel,
    answer: usize,
    sink: mpsc::Sender<(usize, ConversationHistory)>,
}

impl ChatModel for Recorded {
    fn chat(&mut self) -> Result<String, PlayerError> {
        self.inner.chat()
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
}

impl Drop for Recorded {
    fn drop(&mut self) {
        let _ = self.sink.send((self.answer, self.inner.history()));
    }
}

#[test]
fn parallel_players_are_independent() {
    game_server::init_debug_logger();
    let (addr, server) = game_server::spawn(Script::default(), 4);

    // player k always answers k, so every session has its own score and history
    let next = Arc::new(AtomicUsize::new(0));
    let (tx_history, rx_history) = mpsc::channel();
    let factory = move || {
        let k = next.fetch_add(1, Ordering::SeqCst);
        Ok::<_, PlayerError>(Recorded {
            inner: ScriptedModel::new([k.to_string(), k.to_string()]),
            answer: k,
            sink: tx_history.clone(),
        })
    };

    let config = config_for(addr).with_history_policy(HistoryPolicy::Persistent);
    let report = Evaluator::new(factory, config)
        .with_parallel(true)
        .evaluate(4);

    assert_eq!(report.players.len(), 4);
    assert_eq!(report.failures().count(), 0);
    let mut per_player: Vec<f64> = report
        .completed()
        .map(|(_, scores)| {
            assert_eq!(scores.len(), 2);
            assert_eq!(scores.scores()[0], scores.scores()[1]);
            scores.scores()[0]
        })
        .collect();
    per_player.sort_by(f64::total_cmp);
    assert_eq!(per_player, [0.0, 10.0, 20.0, 30.0]);
    assert_eq!(report.mean().unwrap(), 15.0);

    let mut histories: Vec<_> = rx_history.try_iter().collect();
    histories.sort_by_key(|(answer, _)| *answer);
    assert_eq!(histories.len(), 4);
    for (answer, history) in histories {
        // welcome, move request and answer for each of the two episodes, nothing else
        assert_eq!(history.len(), 6);
        let answers: Vec<&str> = history
            .iter()
            .filter(|m| m.role == Role::Assistant)
            .map(|m| m.content.as_str())
            .collect();
        let own = answer.to_string();
        assert_eq!(answers, [own.as_str(), own.as_str()]);
        assert_eq!(history[0], ChatMessage::user("Welcome to episode 1"));
        assert_eq!(history[3], ChatMessage::user("Welcome to episode 2"));
    }

    for transcript in server.join().unwrap() {
        assert_eq!(transcript.replies.len(), 4);
        assert_eq!(transcript.replies[1], "Y");
        assert_eq!(transcript.replies[3], "N");
    }
}

#[test]
fn sequential_players_report_in_order() {
    let (addr, server) = game_server::spawn(Script::default(), 2);

    let factory = || Ok::<_, PlayerError>(ScriptedModel::new(["3", "4"]));
    let report = Evaluator::new(factory, config_for(addr)).evaluate(2);

    let players: Vec<usize> = report.completed().map(|(p, _)| p).collect();
    assert_eq!(players, [0, 1]);
    assert_eq!(report.mean().unwrap(), 35.0);
    server.join().unwrap();
}

#[test]
fn failures_do_not_hide_other_players() {
    let (addr, server) = game_server::spawn(Script::default(), 2);

    // the second model runs dry after one move
    let calls = Arc::new(AtomicUsize::new(0));
    let factory = move || {
        let replies: &[&str] = if calls.fetch_add(1, Ordering::SeqCst) == 0 {
            &["8", "8"]
        } else {
            &["1"]
        };
        Ok::<_, PlayerError>(ScriptedModel::new(replies.iter().copied()))
    };
    let report = Evaluator::new(factory, config_for(addr)).evaluate(2);

    let completed: Vec<_> = report.completed().collect();
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].0, 0);

    let (player, aborted) = report.failures().next().unwrap();
    assert_eq!(player, 1);
    assert_eq!(aborted.episode, 2);
    assert_eq!(aborted.completed.scores(), &[10.0]);
    assert!(matches!(aborted.error, PlayerError::BackendUnavailable(_)));

    // partial sessions stay out of the mean
    assert_eq!(report.mean().unwrap(), 80.0);
    server.join().unwrap();
}

#[test]
fn setup_failures_abort_before_the_first_episode() {
    let config = Configuration::new()
        .with_port(game_server::dead_address().port())
        .with_verbose(false);

    let factory = || choose_model("not-a-model", &BackendSettings::default());
    let report = Evaluator::new(factory, config.clone()).evaluate(1);
    let (_, aborted) = report.failures().next().unwrap();
    assert_eq!(aborted.episode, 1);
    assert!(matches!(&aborted.error, PlayerError::UnknownModel(name) if name == "not-a-model"));

    let report = Evaluator::new(|| Ok(ScriptedModel::new(["0"])), config).evaluate(2);
    assert_eq!(report.failures().count(), 2);
    assert!(report
        .failures()
        .all(|(_, aborted)| matches!(aborted.error, PlayerError::Io(_))));
}
