//! Config for the player behaviors
//!
//! Configuration can be created programmatically using [`Configuration::new()`] or by reading
//! environment variables using [`Configuration::from_env()`].
//!
//! # Environment Variables
//!
//! All values are optional and case-insensitive. Flags are enabled by the value `"true"`.
//!
//! - `PLAYER_HOST` — Game server host (default: `127.0.0.1`)
//! - `PLAYER_PORT` — Game server port (default: derived from `PLAYER_MODE`)
//! - `PLAYER_MODE` — `zero` (port 8080) or `finite` (port 8081) (default: `zero`)
//! - `PLAYER_WIRE_FORMAT` — `structured` or `legacy` (default: `structured`)
//! - `PLAYER_TURNS` — Number of episodes per session (default: `1`)
//! - `PLAYER_FRESH_HISTORY` — Reset the model history between episodes (default: `true`)
//! - `PLAYER_CONTINUATION` — Send `Y`/`N` after each episode, structured format only (default: `true`)
//! - `PLAYER_READ_TIMEOUT_SECS` — Bound on every channel read (default: none)
//! - `PLAYER_RESULTS_DIR` — Where mean scores are written (default: `results`)
//! - `PLAYER_VERBOSE` — Log to stderr (default: `true`)
//! - `PLAYER_LOG` — Log to a timestamped file (default: `false`)
//!
//! Values that cannot be parsed are ignored with a warning and the default is kept.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::codec::WireFormat;
use crate::session::HistoryPolicy;

/// Which flavor of the game server to connect to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GameMode {
    /// No move budget; served on port 8080.
    #[default]
    Zero,
    /// Bounded number of moves; served on port 8081.
    Finite,
}

impl GameMode {
    /// Port the game server listens on in this mode.
    pub fn default_port(self) -> u16 {
        match self {
            GameMode::Zero => 8080,
            GameMode::Finite => 8081,
        }
    }
}

impl FromStr for GameMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "zero" => Ok(GameMode::Zero),
            "finite" => Ok(GameMode::Finite),
            other => anyhow::bail!("unknown game mode '{other}', expected 'zero' or 'finite'"),
        }
    }
}

/// Configuration for player sessions.
#[derive(Debug, Clone, PartialEq)]
pub struct Configuration {
    pub(crate) host: String,
    pub(crate) port: Option<u16>,
    pub(crate) mode: GameMode,
    pub(crate) wire_format: WireFormat,
    pub(crate) n_turns: usize,
    pub(crate) history_policy: HistoryPolicy,
    pub(crate) continuation_signal: bool,
    pub(crate) terminal_marker: String,
    pub(crate) read_timeout: Option<Duration>,
    pub(crate) results_dir: PathBuf,
    pub(crate) verbose: bool,
    pub(crate) log: bool,
}

impl Configuration {
    /// Marker announcing the end of an episode.
    pub const DEFAULT_TERMINAL_MARKER: &'static str = "Game Over!";

    /// Create a new configuration with default parameters.
    ///
    /// By default:
    /// - The game server is expected on `127.0.0.1:8080` (zero mode).
    /// - Messages are JSON lines.
    /// - A session plays a single episode.
    /// - The model history is reset between episodes.
    /// - The `Y`/`N` continuation signal is sent after each episode (structured format only).
    /// - Reads never time out.
    /// - Logs go to stderr, not to a file.
    pub fn new() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: None,
            mode: GameMode::Zero,
            wire_format: WireFormat::Structured,
            n_turns: 1,
            history_policy: HistoryPolicy::Fresh,
            continuation_signal: true,
            terminal_marker: Self::DEFAULT_TERMINAL_MARKER.to_owned(),
            read_timeout: None,
            results_dir: PathBuf::from("results"),
            verbose: true,
            log: false,
        }
    }

    /// Create configuration from `PLAYER_*` environment variables (see module documentation).
    ///
    /// Unset or unparsable variables keep their default value.
    pub fn from_env() -> Self {
        fn get_env_flag(var: &str, default: bool) -> bool {
            match std::env::var(var) {
                Ok(val) => val.eq_ignore_ascii_case("true"),
                Err(_) => default,
            }
        }

        fn get_env_parsed<T: FromStr>(var: &str) -> Option<T> {
            let val = std::env::var(var).ok()?;
            match val.trim().parse() {
                Ok(parsed) => Some(parsed),
                Err(_) => {
                    warn!("ignoring {var}={val:?}: invalid value");
                    None
                }
            }
        }

        let default = Self::new();
        let fresh = get_env_flag("PLAYER_FRESH_HISTORY", true);

        Self {
            host: std::env::var("PLAYER_HOST").unwrap_or(default.host),
            port: get_env_parsed("PLAYER_PORT"),
            mode: get_env_parsed("PLAYER_MODE").unwrap_or(default.mode),
            wire_format: get_env_parsed("PLAYER_WIRE_FORMAT").unwrap_or(default.wire_format),
            n_turns: get_env_parsed("PLAYER_TURNS").unwrap_or(default.n_turns),
            history_policy: if fresh {
                HistoryPolicy::Fresh
            } else {
                HistoryPolicy::Persistent
            },
            continuation_signal: get_env_flag("PLAYER_CONTINUATION", true),
            terminal_marker: default.terminal_marker,
            read_timeout: get_env_parsed::<u64>("PLAYER_READ_TIMEOUT_SECS")
                .map(Duration::from_secs),
            results_dir: std::env::var("PLAYER_RESULTS_DIR")
                .map(PathBuf::from)
                .unwrap_or(default.results_dir),
            verbose: get_env_flag("PLAYER_VERBOSE", true),
            log: get_env_flag("PLAYER_LOG", false),
        }
    }

    /// Host and port to connect to. An explicit port wins over the game mode's default.
    pub fn address(&self) -> (&str, u16) {
        (
            &self.host,
            self.port.unwrap_or_else(|| self.mode.default_port()),
        )
    }

    /// Whether `Y`/`N` goes out after each episode. Never with the legacy wire format, whose
    /// servers hang up after `Game Over!`.
    pub fn continuation_signal(&self) -> bool {
        self.continuation_signal && self.wire_format == WireFormat::Structured
    }

    /// Episodes per session.
    pub fn n_turns(&self) -> usize {
        self.n_turns
    }

    /// Directory receiving the mean score files.
    pub fn results_dir(&self) -> &std::path::Path {
        &self.results_dir
    }

    /// Log to stderr.
    pub fn verbose(&self) -> bool {
        self.verbose
    }

    /// Log to a timestamped file.
    pub fn log(&self) -> bool {
        self.log
    }

    /// Host of the game server.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Override the port implied by the game mode.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Game flavor, which picks the default port.
    pub fn with_mode(mut self, mode: GameMode) -> Self {
        self.mode = mode;
        self
    }

    /// Wire format spoken by the game server.
    pub fn with_wire_format(mut self, wire_format: WireFormat) -> Self {
        self.wire_format = wire_format;
        self
    }

    /// Number of episodes played per session.
    pub fn with_n_turns(mut self, n_turns: usize) -> Self {
        self.n_turns = n_turns;
        self
    }

    /// What happens to the model history between episodes.
    pub fn with_history_policy(mut self, policy: HistoryPolicy) -> Self {
        self.history_policy = policy;
        self
    }

    /// Enable or disable the `Y`/`N` reply sent after each episode. Has no effect with the
    /// legacy wire format.
    pub fn with_continuation_signal(mut self, value: bool) -> Self {
        self.continuation_signal = value;
        self
    }

    /// Substring announcing the end of an episode. An empty marker never matches.
    pub fn with_terminal_marker(mut self, marker: impl Into<String>) -> Self {
        self.terminal_marker = marker.into();
        self
    }

    /// Bound every blocking read on the game connection. `None` waits forever.
    pub fn with_read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Directory receiving the mean score files.
    pub fn with_results_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.results_dir = dir.into();
        self
    }

    /// Enable or disable logging to stderr.
    pub fn with_verbose(mut self, value: bool) -> Self {
        self.verbose = value;
        self
    }

    /// Enable or disable logging to file.
    pub fn with_log(mut self, value: bool) -> Self {
        self.log = value;
        self
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self::new()
    }
}
