//! Tracing subscribers for the player binary.

use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::Context;
use time::{format_description, formatting::Formattable, OffsetDateTime, UtcOffset};
use tracing::{subscriber::set_global_default, Level};
use tracing_subscriber::{
    fmt::{time::OffsetTime, writer::BoxMakeWriter},
    FmtSubscriber,
};

const TIMESTAMP_FORMAT: &str = "[year]-[month]-[day] [hour]:[minute]:[second]";

fn local_timer() -> anyhow::Result<OffsetTime<impl Formattable>> {
    // local offset is unavailable from multi-threaded processes on some platforms
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    let format =
        format_description::parse(TIMESTAMP_FORMAT).context("invalid timestamp format")?;
    Ok(OffsetTime::new(offset, format))
}

/// Log everything down to TRACE into a timestamped file inside `dir`.
///
/// Returns the path of the log file.
pub fn init_logger(dir: impl AsRef<Path>) -> anyhow::Result<PathBuf> {
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir)
        .with_context(|| format!("could not create log directory {}", dir.display()))?;
    let path = dir.join(get_log_file_name()?);
    let file = File::create(&path)
        .with_context(|| format!("could not create log file {}", path.display()))?;

    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::TRACE)
        .with_ansi(false)
        .with_timer(local_timer()?)
        .with_writer(BoxMakeWriter::new(file))
        .finish();

    set_global_default(subscriber).context(
        "could not set global default tracing subscriber, one is probably already installed",
    )?;
    Ok(path)
}

/// Log to stderr, down to `level`.
pub fn init_stderr_logger(level: Level) -> anyhow::Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_timer(local_timer()?)
        .with_writer(std::io::stderr)
        .finish();

    set_global_default(subscriber).context(
        "could not set global default tracing subscriber, one is probably already installed",
    )
}

fn get_log_file_name() -> anyhow::Result<String> {
    let format = format_description::parse("[year]-[month]-[day]_[hour]:[minute]:[second]_log.txt")
        .context("invalid log file name format")?;
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    now.format(&format).context("could not format log file name")
}
