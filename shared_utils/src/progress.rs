//! Progress Bar Module
//!
//! One look for every bar in the project: ████████▓▓░░░░░░
//! plus the small formatting helpers the bars and reports share.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::Duration;

pub mod templates {
    pub const BATCH: &str = "{spinner:.green} {prefix:.cyan.bold} ▕{bar:35.green/black}▏ {percent:>3}% • {pos}/{len} • ⏱️ {elapsed_precise} • ETA {msg}";
    pub const ACTIVE: &str = "  {spinner:.green} {prefix:.dim} {msg}";
    pub const PROGRESS_CHARS: &str = "█▓░";
    pub const SPINNER_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";
}

/// Main batch bar drawn on stderr. Hidden when stderr is not a terminal.
pub fn create_batch_bar(total: u64, prefix: &str) -> ProgressBar {
    let bar = ProgressBar::new(total);
    if !console::Term::stderr().is_term() {
        bar.set_draw_target(ProgressDrawTarget::hidden());
        return bar;
    }
    let style = ProgressStyle::default_bar()
        .template(templates::BATCH)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars(templates::PROGRESS_CHARS)
        .tick_chars(templates::SPINNER_CHARS);
    bar.set_style(style);
    bar.set_prefix(prefix.to_string());
    bar
}

/// One line per running job, shown under the batch bar.
pub fn create_active_line(prefix: &str) -> ProgressBar {
    let line = ProgressBar::new_spinner();
    let style = ProgressStyle::default_spinner()
        .template(templates::ACTIVE)
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_chars(templates::SPINNER_CHARS);
    line.set_style(style);
    line.set_prefix(prefix.to_string());
    line
}

pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs >= 3600 {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    } else if secs >= 60 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}s", secs)
    }
}

/// Shortens `filename` to at most `max_len` characters, keeping both ends.
pub fn truncate_filename(filename: &str, max_len: usize) -> String {
    let chars: Vec<char> = filename.chars().collect();
    if chars.len() <= max_len {
        return filename.to_string();
    }
    if max_len <= 3 {
        return ".".repeat(max_len);
    }
    let keep = max_len - 3;
    let head = keep - keep / 2;
    let tail = keep / 2;
    let start: String = chars[..head].iter().collect();
    let end: String = chars[chars.len() - tail..].iter().collect();
    format!("{}...{}", start, end)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(30)), "30s");
        assert_eq!(format_duration(Duration::from_secs(90)), "1m 30s");
        assert_eq!(format_duration(Duration::from_secs(3661)), "1h 1m 1s");
    }

    #[test]
    fn test_truncate_filename() {
        assert_eq!(truncate_filename("short.flac", 20), "short.flac");
        let truncated = truncate_filename("very_long_track_title_that_needs_truncation.flac", 20);
        assert_eq!(truncated.chars().count(), 20);
        assert!(truncated.contains("..."));
        assert!(truncated.starts_with("very_long"));
        assert!(truncated.ends_with(".flac"));
    }

    #[test]
    fn test_truncate_filename_multibyte() {
        let truncated = truncate_filename("ümlaut_ärger_öffnung_über.flac", 12);
        assert_eq!(truncated.chars().count(), 12);
    }

    #[test]
    fn test_truncate_filename_tiny_budget() {
        assert_eq!(truncate_filename("abcdef", 2), "..");
    }
}
