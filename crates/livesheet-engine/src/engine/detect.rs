//! Raw input classification.
//!
//! Checks run in a fixed order and the first match wins:
//! formula (`=` prefix), number, date (`YYYY-MM-DD` prefix), boolean, text.

use regex::Regex;
use std::sync::OnceLock;

use super::cell::CellKind;

fn date_prefix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{4}-\d{2}-\d{2}").expect("date regex must compile"))
}

/// Parse `input` as a finite number, ignoring surrounding whitespace.
pub fn parse_number(input: &str) -> Option<f64> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Classify a raw cell input.
pub fn detect(raw: &str) -> CellKind {
    if raw.starts_with('=') {
        CellKind::Formula
    } else if parse_number(raw).is_some() {
        CellKind::Number
    } else if date_prefix_re().is_match(raw) {
        CellKind::Date
    } else if raw.eq_ignore_ascii_case("true") || raw.eq_ignore_ascii_case("false") {
        CellKind::Boolean
    } else {
        CellKind::Text
    }
}
