//! Console messages printed around each migration.

use std::time::Duration;

const STARTED_MESSAGE_WIDTH: usize = 64;
const MAX_NAME_LENGTH: usize = 22;
const MAX_DISPLAYED_SECONDS: f64 = 9999.0;

/// `[version] name`, with the name cut to 22 characters and the line padded to 64.
pub fn format_started(version: i64, name: &str) -> String {
    let message = format!("[{}] {}", version, truncate(name, MAX_NAME_LENGTH));
    format!("{:<width$}", message, width = STARTED_MESSAGE_WIDTH)
}

/// `Done! (secs s)` with at most five characters of seconds.
pub fn format_completed(elapsed: Duration) -> String {
    format!("Done! ({} s)", format_seconds(elapsed))
}

fn format_seconds(elapsed: Duration) -> String {
    let seconds = elapsed.as_secs_f64().min(MAX_DISPLAYED_SECONDS);
    let fixed = format!("{:.3}", seconds);
    let cut: String = fixed.chars().take(5).collect();
    cut.trim_matches('.').to_string()
}

fn truncate(subject: &str, max_chars: usize) -> &str {
    match subject.char_indices().nth(max_chars) {
        Some((index, _)) => &subject[..index],
        None => subject,
    }
}
