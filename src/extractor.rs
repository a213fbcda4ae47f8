//! Turns a free-text model completion into the move sent to the game server.

use once_cell::sync::Lazy;
use regex::Regex;

static POSITION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"position\s+(\d+)(?:st|nd|rd|th)?").expect("invalid position regex")
});

/// Normalize a completion into a move.
///
/// 1. the trimmed text is an integer: its canonical decimal form (`"+07"` -> `"7"`)
/// 2. the text mentions `position N` (optionally `Nth`, `Nst`, ...): the first `N`
/// 3. anything else: the trimmed text, untouched
///
/// Never fails; whether the move is legal is for the game server to decide.
pub fn extract_move(completion: &str) -> String {
    let trimmed = completion.trim();

    if let Ok(n) = trimmed.parse::<i64>() {
        return n.to_string();
    }

    match POSITION_RE.captures(trimmed) {
        Some(caps) => caps[1].to_owned(),
        None => trimmed.to_owned(),
    }
}
