//! Common utility functions used across modules.
//!
//! - [`truncate`] - Truncate strings with ellipsis
//! - [`shell_quote`] - Quote a word for a POSIX shell
//! - [`format_count`] - Format counts with K/M suffix (1.5K, 2.3M)

/// Truncate a string to a maximum length, adding "..." if truncated.
///
/// Cuts on a character boundary, so command output containing multi-byte
/// characters never panics.
///
/// # Examples
/// ```
/// use jailctl::utils::truncate;
/// assert_eq!(truncate("short", 10), "short");
/// assert_eq!(truncate("this is long", 10), "this is...");
/// ```
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    if max_len <= 3 {
        return "...".to_string();
    }
    let mut end = max_len - 3;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}

/// Quote a word so a POSIX shell passes it through unchanged.
///
/// # Examples
/// ```
/// use jailctl::utils::shell_quote;
/// assert_eq!(shell_quote("sshd"), "sshd");
/// assert_eq!(shell_quote("a b"), "'a b'");
/// assert_eq!(shell_quote("it's"), "'it'\\''s'");
/// ```
pub fn shell_quote(word: &str) -> String {
    let safe = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,@%+".contains(c));
    if safe {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', "'\\''"))
    }
}

/// Join a program and its arguments into one shell command line.
pub fn shell_join(program: &str, args: &[String]) -> String {
    let mut line = shell_quote(program);
    for arg in args {
        line.push(' ');
        line.push_str(&shell_quote(arg));
    }
    line
}

/// Format a count with K/M suffix for compact display.
///
/// # Examples
/// ```
/// use jailctl::utils::format_count;
/// assert_eq!(format_count(500), "500");
/// assert_eq!(format_count(1500), "1.5K");
/// ```
pub fn format_count(count: usize) -> String {
    if count >= 1_000_000 {
        format!("{:.1}M", count as f64 / 1_000_000.0)
    } else if count >= 1_000 {
        format!("{:.1}K", count as f64 / 1_000.0)
    } else {
        count.to_string()
    }
}
