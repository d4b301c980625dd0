//! Splitting of scripts into batches on `GO` separator lines.

use regex::Regex;
use std::ops::RangeInclusive;
use std::sync::OnceLock;

const STRING_DELIMITER: char = '\'';

fn go_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?im)^\s*GO(\s+|$)").expect("valid regex"))
}

/// Split `script` into the batches separated by `GO` lines.
///
/// A `GO` that starts inside a single-quoted string literal does not separate
/// batches. An unterminated literal extends to the end of the script. The text
/// after the last separator is always returned, even when empty.
pub fn split_batches(script: &str) -> Vec<&str> {
    let literals = string_literal_sections(script);

    let mut batches = Vec::new();
    let mut start = 0;
    for separator in go_pattern().find_iter(script) {
        if literals.iter().any(|l| l.contains(&separator.start())) {
            continue;
        }
        batches.push(&script[start..separator.start()]);
        start = separator.end();
    }
    batches.push(&script[start..]);
    batches
}

/// Byte ranges (inclusive of both quotes) of single-quoted literals.
fn string_literal_sections(script: &str) -> Vec<RangeInclusive<usize>> {
    let mut sections = Vec::new();
    let mut search_from = 0;
    while let Some(offset) = script[search_from..].find(STRING_DELIMITER) {
        let start = search_from + offset;
        let end = match script[start + 1..].find(STRING_DELIMITER) {
            Some(offset) => start + 1 + offset,
            None => script.len().saturating_sub(1),
        };
        sections.push(start..=end);
        search_from = end + 1;
        if search_from >= script.len() {
            break;
        }
    }
    sections
}
