//! The fail2ban action that reports bans and unbans back to a callback URL.
//!
//! Jails reference it as `action = %(action_)s\n          jailctl-callback`.
//! The rendered file is deterministic for a given server and URL, which is
//! what makes repeated pushes a no-op.

use crate::config::validate_callback_url;
use crate::error::Result;
use crate::jail_config::managed_marker;
use crate::utils::shell_quote;

/// File name of the callback action under `action.d/`
pub const ACTION_FILE_NAME: &str = "jailctl-callback.conf";

/// Seconds curl may spend delivering one event
const CALLBACK_TIMEOUT_SECS: u32 = 5;

/// Render the callback action for `server_id`.
///
/// The URL is checked with [`validate_callback_url`] since it is embedded in
/// a shell command on the target host.
pub fn render_action_file(server_id: &str, callback_url: &str) -> Result<String> {
    validate_callback_url(callback_url)?;
    let url = interpolation_escape(&shell_quote(callback_url));
    let server = interpolation_escape(&json_escape(server_id));

    let command = |event: &str| {
        format!(
            "curl -fsS -m {timeout} -X POST -H 'Content-Type: application/json' \
             -d '{{\"server\":\"{server}\",\"event\":\"{event}\",\"jail\":\"<name>\",\"ip\":\"<ip>\",\"failures\":<failures>,\"time\":<time>}}' \
             {url} >/dev/null 2>&1 || true",
            timeout = CALLBACK_TIMEOUT_SECS,
            server = server,
            event = event,
            url = url,
        )
    };

    Ok(format!(
        "{marker}\n\
         # Reports ban and unban events for server '{id}'.\n\
         \n\
         [Definition]\n\
         actionstart =\n\
         actionstop =\n\
         actioncheck =\n\
         actionban = {ban}\n\
         actionunban = {unban}\n\
         \n\
         [Init]\n",
        marker = managed_marker(),
        id = server,
        ban = command("ban"),
        unban = command("unban"),
    ))
}

/// Double every `%` so fail2ban's `%(name)s` interpolation leaves it alone.
fn interpolation_escape(value: &str) -> String {
    value.replace('%', "%%")
}

/// Escape a value for a JSON string literal inside single shell quotes.
fn json_escape(value: &str) -> String {
    value
        .chars()
        .filter(|c| *c != '\'' && !c.is_control())
        .flat_map(|c| match c {
            '"' | '\\' => vec!['\\', c],
            _ => vec![c],
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jail_config::{marker_version, parse_header};

    #[test]
    fn test_render_contains_actions() {
        let content = render_action_file("web1", "https://panel.example.com/api/events").unwrap();

        assert_eq!(marker_version(&content), Some(1));
        assert!(content.lines().any(|l| parse_header(l) == Some("Definition")));

        let ban = content
            .lines()
            .find(|l| l.starts_with("actionban = "))
            .unwrap();
        assert!(ban.contains("\"event\":\"ban\""));
        assert!(ban.contains("\"server\":\"web1\""));
        assert!(ban.contains("<ip>"));
        assert!(ban.ends_with("https://panel.example.com/api/events >/dev/null 2>&1 || true"));

        let unban = content
            .lines()
            .find(|l| l.starts_with("actionunban = "))
            .unwrap();
        assert!(unban.contains("\"event\":\"unban\""));
    }

    #[test]
    fn test_render_is_deterministic() {
        let a = render_action_file("web1", "https://panel.example.com/hook").unwrap();
        let b = render_action_file("web1", "https://panel.example.com/hook").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, render_action_file("web2", "https://panel.example.com/hook").unwrap());
    }

    #[test]
    fn test_url_with_query_is_quoted() {
        let content = render_action_file("web1", "https://panel.example.com/hook?a=1&b=2").unwrap();
        assert!(content.contains("'https://panel.example.com/hook?a=1&b=2'"));
    }

    #[test]
    fn test_percent_in_url_is_doubled() {
        let content =
            render_action_file("web%1", "https://panel.example.com/hook%20events?t=a%2Fb").unwrap();
        let ban = content
            .lines()
            .find(|l| l.starts_with("actionban = "))
            .unwrap();
        assert!(ban.contains("https://panel.example.com/hook%%20events?t=a%%2Fb"));
        assert!(ban.contains("\"server\":\"web%%1\""));
        assert!(content.contains("server 'web%%1'"));

        // Only doubled percent signs remain
        let singles = ban.replace("%%", "");
        assert!(!singles.contains('%'));
    }

    #[test]
    fn test_rejects_unsafe_url() {
        assert!(render_action_file("web1", "https://x/$(reboot)").is_err());
        assert!(render_action_file("web1", "file:///etc/passwd").is_err());
    }

    #[test]
    fn test_json_escape() {
        assert_eq!(json_escape("a\"b"), "a\\\"b");
        assert_eq!(json_escape("it's"), "its");
    }
}
