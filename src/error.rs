//! Error types for jailctl.
//!
//! Every library operation returns [`Result`]. The variants map onto the two
//! classes an upstream caller cares about: bad input (`Validation`,
//! `NotFound`) and backend failure (everything else).

use std::fmt;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, JailctlError>;

/// Sub-kind of a transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// The command or request exceeded its deadline
    Timeout,
    /// Spawn failure, nonzero exit, SSH auth failure, HTTP error, ...
    Other,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Timeout => f.write_str("timeout"),
            TransportKind::Other => f.write_str("failure"),
        }
    }
}

#[derive(Error, Debug)]
pub enum JailctlError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Transport {kind} ({context}): {message}")]
    Transport {
        kind: TransportKind,
        context: String,
        message: String,
    },

    #[error("Reload failed: {message}{}", reload_suffix(.jail, *.auto_disabled))]
    ReloadFailure {
        message: String,
        jail: Option<String>,
        auto_disabled: bool,
    },

    #[error("File system error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {0}")]
    Config(String),
}

fn reload_suffix(jail: &Option<String>, auto_disabled: bool) -> String {
    match (jail, auto_disabled) {
        (Some(jail), true) => format!(" (jail '{}' was auto-disabled)", jail),
        _ => String::new(),
    }
}

impl JailctlError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn timeout(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            kind: TransportKind::Timeout,
            context: context.into(),
            message: message.into(),
        }
    }

    pub fn transport(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            kind: TransportKind::Other,
            context: context.into(),
            message: message.into(),
        }
    }

    /// Wrap an I/O error, turning `NotFound` into [`JailctlError::NotFound`].
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            Self::NotFound(path)
        } else {
            Self::Io { path, source }
        }
    }

    /// True for transport failures caused by an exceeded deadline.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::Transport {
                kind: TransportKind::Timeout,
                ..
            }
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// True when the caller sent bad input (HTTP 4xx class).
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_not_found_maps_to_not_found() {
        let err = JailctlError::io(
            "/etc/fail2ban/jail.d/sshd.local",
            std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        );
        assert!(err.is_not_found());
        assert!(err.is_client_error());
    }

    #[test]
    fn test_io_permission_denied_is_server_error() {
        let err = JailctlError::io(
            "/etc/fail2ban/jail.local",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(matches!(err, JailctlError::Io { .. }));
        assert!(!err.is_client_error());
    }

    #[test]
    fn test_timeout_classification() {
        let err = JailctlError::timeout("fail2ban-client status", "exceeded 30s");
        assert!(err.is_timeout());
        assert!(!err.is_client_error());
        assert!(err.to_string().contains("timeout"));
        assert!(err.to_string().contains("fail2ban-client status"));

        let other = JailctlError::transport("ssh web1", "Permission denied (publickey)");
        assert!(!other.is_timeout());
    }

    #[test]
    fn test_reload_failure_mentions_auto_disabled_jail() {
        let err = JailctlError::ReloadFailure {
            message: "ERROR  No file(s) found for glob /var/log/nginx/*.log".to_string(),
            jail: Some("nginx".to_string()),
            auto_disabled: true,
        };
        let text = err.to_string();
        assert!(text.starts_with("Reload failed: ERROR"));
        assert!(text.contains("jail 'nginx' was auto-disabled"));

        let plain = JailctlError::ReloadFailure {
            message: "boom".to_string(),
            jail: Some("nginx".to_string()),
            auto_disabled: false,
        };
        assert_eq!(plain.to_string(), "Reload failed: boom");
    }
}
