//! Shared helpers for formatting output and building remote commands.

use std::borrow::Cow;

/// Formats a duration in seconds into a human-readable string.
///
/// `3661` becomes `"1h 1m 1s"`, `61` becomes `"1m 1s"`, `30` stays `"30s"`.
pub fn format_duration(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    match (hours, minutes) {
        (0, 0) => format!("{}s", secs),
        (0, _) => format!("{}m {}s", minutes, secs),
        _ => format!("{}h {}m {}s", hours, minutes, secs),
    }
}

/// Quote a value for safe interpolation into a POSIX shell script.
///
/// Values made only of safe characters are returned unchanged.
pub fn shell_quote(value: &str) -> Cow<'_, str> {
    let safe = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/' | ':' | '='));

    if safe {
        Cow::Borrowed(value)
    } else {
        Cow::Owned(format!("'{}'", value.replace('\'', "'\\''")))
    }
}

/// Keep the last `max_lines` non-empty lines of a command's output.
pub fn tail_lines(output: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = output.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(max_lines);
    lines[start..].join("\n")
}

/// Mask a secret for display, keeping a short prefix.
pub fn redact(secret: &str) -> String {
    if secret.is_empty() {
        return String::new();
    }
    let prefix: String = secret.chars().take(4).collect();
    if prefix.len() == secret.len() {
        "****".to_string()
    } else {
        format!("{}****", prefix)
    }
}
