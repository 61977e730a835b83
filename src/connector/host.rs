//! Connector for hosts whose shell we can reach: this machine or an SSH
//! target. The two only differ in their [`Transport`] and in the
//! [`FileSystem`] backing the config engine.

use async_trait::async_trait;
use chrono::Local;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

use super::{parse_jail_list, parse_regex_matches, Connector, FilterTestResult, JailInfo, RestartMode};
use crate::action_file::{render_action_file, ACTION_FILE_NAME};
use crate::aggregator::{collect_jail_infos, parse_bans_with_time, AggregateOptions, JailBans};
use crate::cmd_abstraction::{args_to_strings, describe, run_script, Transport};
use crate::config::Server;
use crate::config_engine::{
    ConfigEngine, DefaultSettings, JailLocalIntegrity, LogpathTest, StructureOutcome,
};
use crate::error::{JailctlError, Result};
use crate::validation::{validate_filter_name, validate_ip, validate_jail_name};

/// fail2ban control client
pub const FAIL2BAN_CLIENT: &str = "fail2ban-client";

/// fail2ban filter tester
pub const FAIL2BAN_REGEX: &str = "fail2ban-regex";

const SYSTEMD_PROBE: &str =
    "command -v systemctl >/dev/null 2>&1 && [ -d /run/systemd/system ]";

/// Feed stdin into a temp file and run `fail2ban-regex` over it.
const REGEX_SCRIPT: &str = r#"tmp=$(mktemp) || exit 1
cat > "$tmp"
"$1" --print-all-matched "$tmp" "$2"; rc=$?
rm -f -- "$tmp"
exit $rc"#;

/// Tunables for a host connector.
#[derive(Debug, Clone, Default)]
pub struct HostOptions {
    pub aggregate: AggregateOptions,
}

/// Runs `fail2ban-client` and friends through a [`Transport`], and edits
/// config files through a [`ConfigEngine`].
pub struct HostConnector<T> {
    pub(super) server: Server,
    pub(super) transport: Arc<T>,
    pub(super) engine: ConfigEngine,
    pub(super) options: HostOptions,
}

impl<T: Transport + 'static> HostConnector<T> {
    /// Assemble a connector from already-built parts.
    pub fn from_parts(server: Server, transport: Arc<T>, engine: ConfigEngine, options: HostOptions) -> Self {
        Self {
            server,
            transport,
            engine,
            options,
        }
    }

    pub fn engine(&self) -> &ConfigEngine {
        &self.engine
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Run `fail2ban-client args...` and return stdout.
    ///
    /// fail2ban reports unknown jails as "does not exist"; those become
    /// [`JailctlError::NotFound`].
    async fn client(&self, args: &[&str]) -> Result<String> {
        let args = args_to_strings(args);
        let output = self.transport.run(FAIL2BAN_CLIENT, &args, None).await?;
        if output.success {
            return Ok(output.stdout);
        }
        if output.stderr.contains("does not exist") || output.stdout.contains("does not exist") {
            return Err(JailctlError::not_found(format!(
                "{} on {}",
                args.get(1).map_or("jail", String::as_str),
                self.server.id
            )));
        }
        let context = format!("{}: {}", self.transport.label(), describe(FAIL2BAN_CLIENT, &args));
        output.into_checked(&context)
    }

    async fn active_jails(&self) -> Result<Vec<String>> {
        let output = self.client(&["status"]).await?;
        Ok(parse_jail_list(&output))
    }

    async fn jail_bans(&self, jail: &str) -> Result<JailBans> {
        let output = self.client(&["get", jail, "banip", "--with-time"]).await?;
        Ok(parse_bans_with_time(&output, Local::now()))
    }

    async fn has_systemd(&self) -> Result<bool> {
        let output = run_script(self.transport.as_ref(), SYSTEMD_PROBE, &[], None).await?;
        Ok(output.success)
    }

    async fn set_ban(&self, action: &str, jail: &str, ip: &str) -> Result<()> {
        validate_jail_name(jail)?;
        let ip = validate_ip(ip)?.to_string();
        self.client(&["set", jail, action, ip.as_str()]).await?;
        info!("{} {} in {} on {}", action, ip, jail, self.server.id);
        Ok(())
    }
}

#[async_trait]
impl<T: Transport + 'static> Connector for HostConnector<T> {
    fn server(&self) -> &Server {
        &self.server
    }

    async fn restart_with_mode(&self) -> Result<RestartMode> {
        if self.has_systemd().await? {
            let args = args_to_strings(&["restart", "fail2ban"]);
            let context = format!("{}: {}", self.transport.label(), describe("systemctl", &args));
            self.transport
                .run("systemctl", &args, None)
                .await?
                .into_checked(&context)?;
            info!("Restarted fail2ban on {}", self.server.id);
            return Ok(RestartMode::Restart);
        }
        info!("systemd not available on {}, reloading instead", self.server.id);
        self.reload().await?;
        Ok(RestartMode::Reload)
    }

    async fn reload(&self) -> Result<()> {
        let args = args_to_strings(&["reload"]);
        let output = self.transport.run(FAIL2BAN_CLIENT, &args, None).await?;
        if output.success {
            debug!("Reloaded fail2ban on {}", self.server.id);
            return Ok(());
        }
        let detail = if output.stderr.trim().is_empty() {
            output.stdout.trim()
        } else {
            output.stderr.trim()
        };
        Err(JailctlError::ReloadFailure {
            message: detail.to_string(),
            jail: None,
            auto_disabled: false,
        })
    }

    async fn ban_ip(&self, jail: &str, ip: &str) -> Result<()> {
        self.set_ban("banip", jail, ip).await
    }

    async fn unban_ip(&self, jail: &str, ip: &str) -> Result<()> {
        self.set_ban("unbanip", jail, ip).await
    }

    async fn get_jail_infos(&self) -> Result<Vec<JailInfo>> {
        let jails = self.active_jails().await?;
        debug!("{} active jails on {}", jails.len(), self.server.id);
        Ok(collect_jail_infos(jails, self.options.aggregate, |jail| async move {
            self.jail_bans(&jail).await
        })
        .await)
    }

    async fn get_all_jails(&self) -> Result<Vec<JailInfo>> {
        Ok(self
            .engine
            .discover_jails_from_files()
            .await?
            .into_iter()
            .map(|s| JailInfo::configured(s.name, s.enabled))
            .collect())
    }

    async fn create_jail(&self, name: &str, content: &str) -> Result<()> {
        self.engine.create_jail(name, content).await
    }

    async fn delete_jail(&self, name: &str) -> Result<()> {
        self.engine.delete_jail(name).await
    }

    async fn get_jail_config(&self, name: &str) -> Result<String> {
        self.engine.get_jail_config(name).await
    }

    async fn set_jail_config(&self, name: &str, content: &str) -> Result<()> {
        self.engine.set_jail_config(name, content).await
    }

    async fn get_filter_config(&self, name: &str) -> Result<String> {
        self.engine.get_filter_config(name).await
    }

    async fn set_filter_config(&self, name: &str, content: &str) -> Result<()> {
        self.engine.set_filter_config(name, content).await
    }

    async fn create_filter(&self, name: &str, content: &str) -> Result<()> {
        self.engine.create_filter(name, content).await
    }

    async fn delete_filter(&self, name: &str) -> Result<()> {
        self.engine.delete_filter(name).await
    }

    async fn get_filters(&self) -> Result<Vec<String>> {
        self.engine.get_filters().await
    }

    async fn test_filter(&self, name: &str, log_lines: &[String]) -> Result<FilterTestResult> {
        validate_filter_name(name)?;
        if log_lines.is_empty() {
            return Err(JailctlError::validation("No log lines to test"));
        }
        let filter = self.engine.filter_path(name).await?.display().to_string();
        let mut input = log_lines.join("\n");
        input.push('\n');

        let output = run_script(
            self.transport.as_ref(),
            REGEX_SCRIPT,
            &[FAIL2BAN_REGEX, &filter],
            Some(&input),
        )
        .await?;
        let context = format!("{}: {} {}", self.transport.label(), FAIL2BAN_REGEX, filter);
        let stdout = output.into_checked(&context)?;

        Ok(FilterTestResult {
            matched_lines: parse_regex_matches(&stdout),
            output: stdout,
        })
    }

    async fn update_jail_enabled_states(&self, states: &BTreeMap<String, bool>) -> Result<()> {
        self.engine.update_jail_enabled_states(states).await
    }

    async fn check_jail_local_integrity(&self) -> Result<JailLocalIntegrity> {
        self.engine.check_jail_local_integrity().await
    }

    async fn ensure_jail_local_structure(&self) -> Result<StructureOutcome> {
        self.engine.ensure_jail_local_structure().await
    }

    async fn update_default_settings(&self, settings: &DefaultSettings) -> Result<()> {
        self.engine.update_default_settings(settings).await
    }

    async fn test_logpath_with_resolution(&self, logpath: &str) -> Result<Vec<LogpathTest>> {
        self.engine.test_logpath_with_resolution(logpath).await
    }

    async fn update_action_file(&self, callback_url: &str) -> Result<bool> {
        let content = render_action_file(&self.server.id, callback_url)?;
        self.engine.write_action_file(ACTION_FILE_NAME, &content).await
    }
}
