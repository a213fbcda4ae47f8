use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use tracing::{info, Level};

use llm_player::codec::WireFormat;
use llm_player::configuration::{Configuration, GameMode};
use llm_player::error::PlayerError;
use llm_player::evaluator::Evaluator;
use llm_player::logger::{init_logger, init_stderr_logger};
use llm_player::model::{choose_model, BackendSettings, ChatModel, ModelOptions, RetryingModel};
use llm_player::score::write_mean_score;
use llm_player::session::HistoryPolicy;

/// Play a game server with a language model and record its mean score.
///
/// Every option falls back to the matching PLAYER_* environment variable (a `.env` file is
/// loaded first), then to its default.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Model identifier: gpt-3.5-turbo, llama3:70b-instruct, gemma, phi3:14b, vicuna:13b,
    /// or any model prefixed with `openai:` / `ollama:`
    #[arg(short, long, default_value = "gemma")]
    model: String,

    /// Game flavor, selects the default port (zero: 8080, finite: 8081)
    #[arg(long)]
    mode: Option<GameMode>,

    #[arg(long)]
    host: Option<String>,

    #[arg(short, long)]
    port: Option<u16>,

    /// structured (JSON lines) or legacy (raw text)
    #[arg(long)]
    wire_format: Option<WireFormat>,

    /// Episodes per session
    #[arg(short = 'n', long)]
    turns: Option<usize>,

    /// Independent sessions, each with its own connection and model
    #[arg(long, default_value_t = 1)]
    players: usize,

    /// Run the sessions concurrently
    #[arg(long)]
    parallel: bool,

    /// Keep the conversation across the episodes of a session
    #[arg(long)]
    persistent_history: bool,

    /// Do not send Y/N after each episode
    #[arg(long)]
    no_continuation: bool,

    /// Give up on a silent server after this many seconds
    #[arg(long)]
    read_timeout: Option<u64>,

    #[arg(long)]
    temperature: Option<f32>,

    #[arg(long)]
    max_tokens: Option<u32>,

    /// Attempts per model call (1 disables retries)
    #[arg(long, default_value_t = 1)]
    attempts: u32,

    #[arg(long)]
    results_dir: Option<PathBuf>,

    /// Write logs to a timestamped file in this directory instead of stderr
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

impl Cli {
    fn apply(&self, mut config: Configuration) -> Configuration {
        if let Some(mode) = self.mode {
            config = config.with_mode(mode);
        }
        if let Some(host) = &self.host {
            config = config.with_host(host.clone());
        }
        if let Some(port) = self.port {
            config = config.with_port(port);
        }
        if let Some(format) = self.wire_format {
            config = config.with_wire_format(format);
        }
        if let Some(turns) = self.turns {
            config = config.with_n_turns(turns);
        }
        if self.persistent_history {
            config = config.with_history_policy(HistoryPolicy::Persistent);
        }
        if self.no_continuation {
            config = config.with_continuation_signal(false);
        }
        if let Some(secs) = self.read_timeout {
            config = config.with_read_timeout(Some(Duration::from_secs(secs)));
        }
        if let Some(dir) = &self.results_dir {
            config = config.with_results_dir(dir.clone());
        }
        if self.log_dir.is_some() {
            config = config.with_log(true);
        }
        config
    }

    fn model_options(&self) -> ModelOptions {
        ModelOptions {
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            ..ModelOptions::default()
        }
    }
}

fn main() -> anyhow::Result<()> {
    // a missing .env is fine
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let config = cli.apply(Configuration::from_env());

    if config.log() {
        let dir = cli.log_dir.clone().unwrap_or_else(|| PathBuf::from("logs"));
        let path = init_logger(&dir)?;
        eprintln!("logging to {}", path.display());
    } else if config.verbose() {
        init_stderr_logger(Level::INFO)?;
    }

    let settings = BackendSettings::from_env();
    // unknown models and missing keys are reported before connecting anywhere
    choose_model(&cli.model, &settings)
        .with_context(|| format!("cannot use model '{}'", cli.model))?;

    let (host, port) = config.address();
    info!(model = %cli.model, host, port, turns = config.n_turns(), players = cli.players, "starting");

    let model_name = cli.model.clone();
    let options = cli.model_options();
    let attempts = cli.attempts;
    let factory = move || -> Result<_, PlayerError> {
        let mut model = choose_model(&model_name, &settings)?;
        model.reconfigure(options.clone());
        Ok(RetryingModel::new(model, attempts, Duration::from_secs(2)))
    };

    let report = Evaluator::new(factory, config.clone())
        .with_parallel(cli.parallel)
        .evaluate(cli.players);

    for (player, scores) in report.completed() {
        println!("player {player}: {scores}");
    }
    for (player, aborted) in report.failures() {
        eprintln!("player {player}: {aborted}");
    }

    let mean = match report.mean() {
        Ok(mean) => mean,
        Err(e) => bail!("no score to report: {e}"),
    };
    println!("Mean Score: {mean}");

    let path = write_mean_score(config.results_dir(), &cli.model, mean)?;
    println!("saved to {}", path.display());
    Ok(())
}
