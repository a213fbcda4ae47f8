//! Episode scores: parsing them out of terminal messages, collecting and averaging them.

use std::path::{Path, PathBuf};

use anyhow::Context;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::info;

use crate::error::PlayerError;

/// Score of one completed episode.
pub type EpisodeScore = f64;

static FINAL_SCORE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"Final score:\s*(-?\d+(?:\.\d+)?)").expect("invalid final score regex")
});

/// Extract the `Final score: N` value of a terminal message.
///
/// # Errors
/// [`PlayerError::ScoreParseError`] if the pattern is absent.
pub fn parse_final_score(content: &str) -> Result<EpisodeScore, PlayerError> {
    FINAL_SCORE_RE
        .captures(content)
        .and_then(|caps| caps[1].parse().ok())
        .ok_or_else(|| PlayerError::ScoreParseError(content.to_owned()))
}

/// Arithmetic mean of `scores`.
///
/// # Errors
/// [`PlayerError::EmptyResult`] when there is nothing to average.
pub fn aggregate(scores: &[EpisodeScore]) -> Result<f64, PlayerError> {
    if scores.is_empty() {
        return Err(PlayerError::EmptyResult);
    }
    Ok(scores.iter().sum::<f64>() / scores.len() as f64)
}

/// Scores of a session, in the order the episodes were played.
#[derive(PartialEq, Debug, Clone, Default)]
pub struct SessionResult(pub Vec<EpisodeScore>);

impl SessionResult {
    /// No episode played yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the score of the next episode.
    pub fn push(&mut self, score: EpisodeScore) {
        self.0.push(score);
    }

    /// Number of completed episodes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// No episode completed.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Scores in play order.
    pub fn scores(&self) -> &[EpisodeScore] {
        &self.0
    }

    /// See [`aggregate`].
    pub fn mean(&self) -> Result<f64, PlayerError> {
        aggregate(&self.0)
    }
}

impl From<Vec<EpisodeScore>> for SessionResult {
    fn from(scores: Vec<EpisodeScore>) -> Self {
        SessionResult(scores)
    }
}

impl std::fmt::Display for SessionResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let scores = self
            .0
            .iter()
            .map(|s| format!("{s}"))
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "[{scores}]")
    }
}

/// Write `mean` to `<dir>/<model_name>.txt`, creating `dir` if needed.
///
/// Path separators in `model_name` are replaced so the file always lands directly in `dir`.
pub fn write_mean_score(
    dir: impl AsRef<Path>,
    model_name: &str,
    mean: f64,
) -> anyhow::Result<PathBuf> {
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir)
        .with_context(|| format!("could not create results directory {}", dir.display()))?;

    let file_name = model_name.replace(['/', '\\'], "_");
    let path = dir.join(format!("{file_name}.txt"));
    std::fs::write(&path, format!("{mean}\n"))
        .with_context(|| format!("could not write result file {}", path.display()))?;

    info!(path = %path.display(), mean, "mean score saved");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_integer_score() {
        assert_eq!(parse_final_score("Game Over! Final score: 42").unwrap(), 42.0);
    }

    #[test]
    fn parses_decimal_and_negative_scores() {
        assert_eq!(parse_final_score("Final score: 3.5 points").unwrap(), 3.5);
        assert_eq!(parse_final_score("Final score:\n-2").unwrap(), -2.0);
    }

    #[test]
    fn missing_score_is_an_error() {
        let err = parse_final_score("Game Over!").unwrap_err();
        assert!(matches!(err, PlayerError::ScoreParseError(c) if c == "Game Over!"));
        assert!(parse_final_score("Final score: none").is_err());
    }

    #[test]
    fn mean_of_scores() {
        assert_eq!(aggregate(&[10.0, 20.0, 30.0]).unwrap(), 20.0);
        assert_eq!(SessionResult::from(vec![1.0, 2.0]).mean().unwrap(), 1.5);
    }

    #[test]
    fn mean_of_nothing() {
        assert!(matches!(aggregate(&[]), Err(PlayerError::EmptyResult)));
        assert!(matches!(
            SessionResult::new().mean(),
            Err(PlayerError::EmptyResult)
        ));
    }

    #[test]
    fn display_lists_scores() {
        assert_eq!(SessionResult::from(vec![1.0, 2.5]).to_string(), "[1, 2.5]");
    }

    #[test]
    fn writes_result_file() {
        let dir = std::env::temp_dir().join(format!("llm-player-results-{}", std::process::id()));
        let path = write_mean_score(&dir, "org/phi3:14b", 12.5).unwrap();
        assert_eq!(path, dir.join("org_phi3:14b.txt"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "12.5\n");
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
