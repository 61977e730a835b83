//! Connectors: one uniform operation set over local, SSH and agent servers.
//!
//! A [`Connector`] is bound to exactly one [`Server`] when it is built and
//! keeps no state between calls apart from its transport handle. Callers
//! only ever see `Arc<dyn Connector>`; [`create_connector`] picks the
//! variant once from the server type.

mod agent;
mod host;
mod local;
mod ssh;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

pub use agent::AgentConnector;
pub use host::{HostConnector, HostOptions, FAIL2BAN_CLIENT, FAIL2BAN_REGEX};
pub use local::{LocalConnector, LocalTransport};
pub use ssh::{SshConnector, SshTransport};

use crate::config::{Server, ServerType, Settings};
use crate::config_engine::{DefaultSettings, JailLocalIntegrity, LogpathTest, StructureOutcome};
use crate::error::{JailctlError, Result};
use crate::lock::JailLocks;

/// Live summary of one jail.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JailInfo {
    pub jail_name: String,
    pub enabled: bool,
    pub total_banned: usize,
    pub new_in_last_hour: usize,
    #[serde(rename = "bannedIPs")]
    pub banned_ips: Vec<String>,
}

impl JailInfo {
    /// A configured jail with no live ban data.
    pub fn configured(name: impl Into<String>, enabled: bool) -> Self {
        Self {
            jail_name: name.into(),
            enabled,
            ..Default::default()
        }
    }
}

/// How a restart request was carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RestartMode {
    /// The service was restarted through systemd
    Restart,
    /// systemd was not available; the configuration was reloaded instead
    Reload,
}

impl std::fmt::Display for RestartMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RestartMode::Restart => f.write_str("restart"),
            RestartMode::Reload => f.write_str("reload"),
        }
    }
}

/// Result of running a filter over sample log lines.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterTestResult {
    /// Full `fail2ban-regex` output
    pub output: String,
    /// Sample lines the filter matched
    pub matched_lines: Vec<String>,
}

/// Capability contract shared by every server type.
#[async_trait]
pub trait Connector: Send + Sync {
    /// The server this connector is bound to
    fn server(&self) -> &Server;

    /// Restart fail2ban, falling back to a reload where systemd is missing.
    async fn restart(&self) -> Result<()> {
        self.restart_with_mode().await.map(|_| ())
    }

    async fn restart_with_mode(&self) -> Result<RestartMode>;

    /// Reload configuration, keeping current bans.
    async fn reload(&self) -> Result<()>;

    async fn ban_ip(&self, jail: &str, ip: &str) -> Result<()>;

    async fn unban_ip(&self, jail: &str, ip: &str) -> Result<()>;

    /// Active jails with live ban lists, sorted by name.
    async fn get_jail_infos(&self) -> Result<Vec<JailInfo>>;

    /// Every configured jail, active or not.
    async fn get_all_jails(&self) -> Result<Vec<JailInfo>>;

    async fn create_jail(&self, name: &str, content: &str) -> Result<()>;

    async fn delete_jail(&self, name: &str) -> Result<()>;

    async fn get_jail_config(&self, name: &str) -> Result<String>;

    async fn set_jail_config(&self, name: &str, content: &str) -> Result<()>;

    async fn get_filter_config(&self, name: &str) -> Result<String>;

    async fn set_filter_config(&self, name: &str, content: &str) -> Result<()>;

    async fn create_filter(&self, name: &str, content: &str) -> Result<()>;

    async fn delete_filter(&self, name: &str) -> Result<()>;

    async fn get_filters(&self) -> Result<Vec<String>>;

    async fn test_filter(&self, name: &str, log_lines: &[String]) -> Result<FilterTestResult>;

    async fn update_jail_enabled_states(&self, states: &BTreeMap<String, bool>) -> Result<()>;

    async fn check_jail_local_integrity(&self) -> Result<JailLocalIntegrity>;

    async fn ensure_jail_local_structure(&self) -> Result<StructureOutcome>;

    async fn update_default_settings(&self, settings: &DefaultSettings) -> Result<()>;

    async fn test_logpath_with_resolution(&self, logpath: &str) -> Result<Vec<LogpathTest>>;

    /// Write the ban/unban callback action. Returns true if the file changed.
    async fn update_action_file(&self, callback_url: &str) -> Result<bool>;
}

/// Build the connector variant matching `server.server_type`.
pub fn create_connector(
    server: &Server,
    settings: &Settings,
    locks: Arc<JailLocks>,
) -> Result<Arc<dyn Connector>> {
    let connector: Arc<dyn Connector> = match server.server_type {
        ServerType::Local => Arc::new(LocalConnector::new(server.clone(), settings, locks)),
        ServerType::Ssh => Arc::new(SshConnector::new(server.clone(), settings, locks)?),
        ServerType::Agent => Arc::new(AgentConnector::new(server.clone(), settings)?),
    };
    Ok(connector)
}

/// A jail that was switched off to get a reload through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoDisabled {
    pub jail: String,
    /// The reload error that triggered the disable
    pub cause: String,
}

/// Outcome of [`reload_after_jail_edit`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReloadReport {
    pub auto_disabled: Option<AutoDisabled>,
}

/// Reload after `jail` was edited.
///
/// If the reload fails, the jail is disabled and the reload retried once.
/// A successful retry reports the disabled jail; a failed retry (or a
/// failed disable) returns [`JailctlError::ReloadFailure`] with the
/// original error message.
pub async fn reload_after_jail_edit(connector: &dyn Connector, jail: &str) -> Result<ReloadReport> {
    let original = match connector.reload().await {
        Ok(()) => return Ok(ReloadReport::default()),
        Err(e) => e,
    };
    let message = match &original {
        JailctlError::ReloadFailure { message, .. } => message.clone(),
        other => other.to_string(),
    };
    warn!(
        "Reload of {} failed after editing jail {}: {}",
        connector.server().id,
        jail,
        message
    );

    let mut disable = BTreeMap::new();
    disable.insert(jail.to_string(), false);
    if let Err(e) = connector.update_jail_enabled_states(&disable).await {
        warn!("Could not disable jail {}: {}", jail, e);
        return Err(JailctlError::ReloadFailure {
            message,
            jail: Some(jail.to_string()),
            auto_disabled: false,
        });
    }

    match connector.reload().await {
        Ok(()) => {
            info!("Jail {} auto-disabled; reload succeeded", jail);
            Ok(ReloadReport {
                auto_disabled: Some(AutoDisabled {
                    jail: jail.to_string(),
                    cause: message,
                }),
            })
        }
        Err(retry) => {
            warn!("Reload still failing with {} disabled: {}", jail, retry);
            Err(JailctlError::ReloadFailure {
                message,
                jail: Some(jail.to_string()),
                auto_disabled: true,
            })
        }
    }
}

/// Jail names from `fail2ban-client status` output.
///
/// ```
/// use jailctl::connector::parse_jail_list;
/// let out = "Status\n|- Number of jail:\t2\n`- Jail list:\tsshd, nginx-http-auth\n";
/// assert_eq!(parse_jail_list(out), vec!["sshd", "nginx-http-auth"]);
/// ```
pub fn parse_jail_list(output: &str) -> Vec<String> {
    output
        .lines()
        .find_map(|line| line.split_once("Jail list:").map(|(_, rest)| rest))
        .map(|rest| {
            rest.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

/// Matched lines from `fail2ban-regex --print-all-matched` output.
pub fn parse_regex_matches(output: &str) -> Vec<String> {
    let mut matched = Vec::new();
    let mut inside = false;
    for line in output.lines() {
        if line.contains("Matched line(s):") {
            inside = true;
            continue;
        }
        if !inside {
            continue;
        }
        if line.starts_with('`') {
            break;
        }
        if let Some(rest) = line.strip_prefix("|  ") {
            matched.push(rest.trim_end().to_string());
        } else if line.trim().is_empty() || !line.starts_with('|') {
            break;
        }
    }
    matched
}


#[cfg(test)]
mod tests {
    use super::mock::MockConnector;
    use super::*;

    fn rejected(msg: &str) -> JailctlError {
        JailctlError::ReloadFailure {
            message: msg.to_string(),
            jail: None,
            auto_disabled: false,
        }
    }

    #[tokio::test]
    async fn test_reload_ok_needs_no_disable() {
        let conn = MockConnector::new("local", ServerType::Local);
        let report = reload_after_jail_edit(&conn, "sshd").await.unwrap();
        assert_eq!(report, ReloadReport::default());
        assert!(conn.enabled_updates.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reload_failure_then_retry_success() {
        let conn = MockConnector::new("local", ServerType::Local);
        conn.push_reload(Err(rejected("bad regex in sshd")));
        conn.push_reload(Ok(()));

        let report = reload_after_jail_edit(&conn, "sshd").await.unwrap();
        assert_eq!(
            report.auto_disabled,
            Some(AutoDisabled {
                jail: "sshd".to_string(),
                cause: "bad regex in sshd".to_string(),
            })
        );
        let updates = conn.enabled_updates.lock().unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].get("sshd"), Some(&false));
        assert_eq!(*conn.reload_calls.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_reload_retry_failure_keeps_original_message() {
        let conn = MockConnector::new("local", ServerType::Local);
        conn.push_reload(Err(rejected("first")));
        conn.push_reload(Err(rejected("second")));

        let err = reload_after_jail_edit(&conn, "nginx").await.unwrap_err();
        match err {
            JailctlError::ReloadFailure {
                message,
                jail,
                auto_disabled,
            } => {
                assert_eq!(message, "first");
                assert_eq!(jail.as_deref(), Some("nginx"));
                assert!(auto_disabled);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_reload_disable_failure() {
        let conn = MockConnector::new("local", ServerType::Local);
        conn.push_reload(Err(rejected("broken")));
        *conn.disable_error.lock().unwrap() = Some("read-only filesystem".to_string());

        let err = reload_after_jail_edit(&conn, "sshd").await.unwrap_err();
        assert!(matches!(
            err,
            JailctlError::ReloadFailure {
                auto_disabled: false,
                ..
            }
        ));
        // No retry when the disable did not happen
        assert_eq!(*conn.reload_calls.lock().unwrap(), 1);
    }

    #[test]
    fn test_parse_jail_list() {
        assert_eq!(
            parse_jail_list("Status\n|- Number of jail:\t1\n`- Jail list:\tsshd\n"),
            vec!["sshd"]
        );
        assert!(parse_jail_list("Status\n|- Number of jail:\t0\n`- Jail list:\t\n").is_empty());
        assert!(parse_jail_list("garbage").is_empty());
    }

    #[test]
    fn test_parse_regex_matches() {
        let output = "\
Running tests
=============

Lines: 3 lines, 0 ignored, 2 matched, 1 missed

|- Matched line(s):
|  Jan 10 10:00:00 host sshd[1]: Failed password for root from 1.2.3.4 port 22 ssh2
|  Jan 10 10:00:05 host sshd[1]: Failed password for root from 1.2.3.4 port 22 ssh2
`-

|- Missed line(s):
|  hello
`-
";
        let matched = parse_regex_matches(output);
        assert_eq!(matched.len(), 2);
        assert!(matched[0].starts_with("Jan 10 10:00:00"));
        assert!(parse_regex_matches("Lines: 1 lines, 0 ignored, 0 matched, 1 missed").is_empty());
    }

    #[test]
    fn test_jail_info_wire_names() {
        let info = JailInfo {
            jail_name: "sshd".to_string(),
            enabled: true,
            total_banned: 1,
            new_in_last_hour: 1,
            banned_ips: vec!["1.2.3.4".to_string()],
        };
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["jailName"], "sshd");
        assert_eq!(json["totalBanned"], 1);
        assert_eq!(json["newInLastHour"], 1);
        assert_eq!(json["bannedIPs"][0], "1.2.3.4");
        assert_eq!(serde_json::to_value(RestartMode::Reload).unwrap(), "reload");
    }
}
