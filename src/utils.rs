//! Formatting helpers shared by the commands.

use std::borrow::Cow;

/// Formats a duration in seconds as `1h 1m 1s`, `1m 1s` or `30s`.
pub fn format_duration(seconds: i64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    match (hours, minutes) {
        (0, 0) => format!("{}s", secs),
        (0, _) => format!("{}m {}s", minutes, secs),
        _ => format!("{}h {}m {}s", hours, minutes, secs),
    }
}

/// Formats a byte count using binary units with one decimal place.
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Truncates to at most `max_len` characters, appending "..." if truncated.
///
/// Counts characters, not bytes, so command output with non-ASCII text
/// never splits a code point.
pub fn truncate(s: &str, max_len: usize) -> Cow<'_, str> {
    if s.chars().count() <= max_len {
        return Cow::Borrowed(s);
    }

    let keep = if max_len <= 3 { max_len } else { max_len - 3 };
    let end = s.char_indices().nth(keep).map(|(i, _)| i).unwrap_or(s.len());

    if max_len <= 3 {
        Cow::Borrowed(&s[..end])
    } else {
        Cow::Owned(format!("{}...", &s[..end]))
    }
}

/// First line of a possibly multi-line message.
pub fn first_line(s: &str) -> &str {
    s.lines().next().unwrap_or("")
}
