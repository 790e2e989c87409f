use crate::models::ScoreReading;
use regex::Regex;
use std::sync::OnceLock;

fn score_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"\b(100|[1-9]?[0-9])\b").ok())
        .as_ref()
}

/// First whole-word integer in `0..=100`, scanning left to right.
pub fn parse_score(text: &str) -> Option<u8> {
    score_pattern()?
        .captures(text)
        .and_then(|captures| captures.get(1))
        .and_then(|found| found.as_str().parse().ok())
}

/// Match percentage from free-form model output, 0 when none is present.
pub fn extract_score(text: &str) -> u8 {
    parse_score(text).unwrap_or(0)
}

pub fn read_score(text: &str) -> ScoreReading {
    match parse_score(text) {
        Some(value) => ScoreReading {
            value,
            reliable: true,
        },
        None => ScoreReading {
            value: 0,
            reliable: false,
        },
    }
}
