//! Settings for jailctl: the server inventory and runtime tuning.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::env;
use std::path::Path;
use std::time::Duration;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::aggregator::{AggregateOptions, DEFAULT_CONCURRENCY};
use crate::config_engine::DEFAULT_FAIL2BAN_DIR;
use crate::error::JailctlError;

/// Default settings file location
pub const DEFAULT_CONFIG_PATH: &str = "/etc/jailctl/config.yaml";

/// Environment variable overriding the settings file location
pub const CONFIG_ENV: &str = "JAILCTL_CONFIG";

/// Default process lock file for mutating CLI commands
pub const DEFAULT_LOCK_FILE: &str = "/run/jailctl.lock";

/// Secure string type that zeroizes memory on drop
/// Used for sensitive data like agent secrets
#[derive(Clone, Default, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(transparent)]
pub struct SecureString(String);

impl SecureString {
    pub fn new(s: String) -> Self {
        Self(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for SecureString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl From<String> for SecureString {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SecureString {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// How a server is reached.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ServerType {
    /// fail2ban on this machine
    #[default]
    Local,
    /// fail2ban on a remote host, driven through the system `ssh` binary
    Ssh,
    /// fail2ban behind a jailctl HTTP agent
    Agent,
}

impl std::fmt::Display for ServerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerType::Local => f.write_str("local"),
            ServerType::Ssh => f.write_str("ssh"),
            ServerType::Agent => f.write_str("agent"),
        }
    }
}

/// One managed fail2ban instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Server {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub server_type: ServerType,

    /// SSH host name or address
    pub host: String,
    /// SSH port
    pub port: u16,
    /// SSH login user; commands are prefixed with `sudo -n` unless root
    pub ssh_user: String,
    pub ssh_key_path: Option<String>,

    /// Agent base URL, e.g. `https://web1.internal:9191`
    pub agent_url: String,
    /// Agent secret sent as `X-Agent-Secret`
    /// Memory is securely zeroed when dropped
    pub agent_secret: SecureString,
    /// Environment variable name to read the agent secret from (optional)
    pub agent_secret_env: Option<String>,

    /// fail2ban config root on the host (defaults to the global setting)
    pub fail2ban_dir: Option<String>,

    pub enabled: bool,
    pub is_default: bool,
}

impl Default for Server {
    fn default() -> Self {
        Self {
            id: String::new(),
            name: String::new(),
            server_type: ServerType::Local,
            host: String::new(),
            port: 22,
            ssh_user: "root".to_string(),
            ssh_key_path: None,
            agent_url: String::new(),
            agent_secret: SecureString::default(),
            agent_secret_env: None,
            fail2ban_dir: None,
            enabled: true,
            is_default: false,
        }
    }
}

impl Server {
    /// The built-in local server.
    pub fn local() -> Self {
        Self {
            id: "local".to_string(),
            name: "Local".to_string(),
            is_default: true,
            ..Default::default()
        }
    }

    /// Get the effective agent secret, checking the env var first if configured
    /// Returns a SecureString that will be zeroed when dropped
    pub fn get_agent_secret(&self) -> SecureString {
        if let Some(ref env_name) = self.agent_secret_env {
            if let Ok(val) = env::var(env_name) {
                return SecureString::new(val);
            }
        }
        self.agent_secret.clone()
    }

    /// Display name, falling back to the ID
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }

    fn validate(&self) -> crate::error::Result<()> {
        let invalid =
            |msg: String| -> crate::error::Result<()> { Err(JailctlError::Config(msg)) };

        if self.id.is_empty()
            || !self
                .id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        {
            return invalid(format!(
                "Invalid server id '{}'. Use letters, digits, '-', '_' or '.'",
                self.id
            ));
        }

        match self.server_type {
            ServerType::Local => {}
            ServerType::Ssh => {
                if self.host.is_empty()
                    || self.host.starts_with('-')
                    || self.host.contains(|c: char| c.is_whitespace() || c == '@')
                {
                    return invalid(format!("Server '{}': invalid ssh host '{}'", self.id, self.host));
                }
                if self.ssh_user.is_empty()
                    || self.ssh_user.starts_with('-')
                    || !self
                        .ssh_user
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
                {
                    return invalid(format!(
                        "Server '{}': invalid ssh_user '{}'",
                        self.id, self.ssh_user
                    ));
                }
                if self.port == 0 {
                    return invalid(format!("Server '{}': port must not be 0", self.id));
                }
            }
            ServerType::Agent => {
                if !self.agent_url.starts_with("https://") && !self.agent_url.starts_with("http://")
                {
                    return invalid(format!(
                        "Server '{}': agent_url must be an http(s) URL: '{}'",
                        self.id, self.agent_url
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Main settings structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Default fail2ban config root for local and ssh servers
    pub fail2ban_dir: String,

    /// Deadline for every fail2ban-client/ssh/systemctl invocation
    pub command_timeout_secs: u64,

    /// Maximum jails fetched at once when building jail summaries
    pub aggregate_concurrency: usize,

    /// Deadline for a whole jail summary pass
    pub aggregate_timeout_secs: u64,

    /// Split a legacy monolithic jail.local into jail.d/ files on startup
    pub migrate_legacy_jails: bool,

    /// URL the callback action posts ban/unban events to
    pub callback_url: Option<String>,

    /// Advisory lock taken by mutating CLI commands
    pub lock_file: String,

    pub servers: Vec<Server>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            fail2ban_dir: DEFAULT_FAIL2BAN_DIR.to_string(),
            command_timeout_secs: 30,
            aggregate_concurrency: DEFAULT_CONCURRENCY,
            aggregate_timeout_secs: 15,
            migrate_legacy_jails: false,
            callback_url: None,
            lock_file: DEFAULT_LOCK_FILE.to_string(),
            servers: vec![Server::local()],
        }
    }
}

impl Settings {
    /// Load settings from YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;
        let settings: Settings = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path.as_ref()))?;

        settings.validate()?;

        Ok(settings)
    }

    /// Load settings, or fall back to the defaults if the file does not exist.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Validate settings values
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.command_timeout_secs == 0 {
            return Err(JailctlError::Config(
                "command_timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.aggregate_concurrency == 0 {
            return Err(JailctlError::Config(
                "aggregate_concurrency must be at least 1".to_string(),
            ));
        }
        if self.aggregate_timeout_secs == 0 {
            return Err(JailctlError::Config(
                "aggregate_timeout_secs must be at least 1".to_string(),
            ));
        }
        if !self.fail2ban_dir.starts_with('/') {
            return Err(JailctlError::Config(format!(
                "fail2ban_dir must be absolute: '{}'",
                self.fail2ban_dir
            )));
        }

        let mut ids = HashSet::new();
        for server in &self.servers {
            server.validate()?;
            if !ids.insert(server.id.as_str()) {
                return Err(JailctlError::Config(format!(
                    "Duplicate server id '{}'",
                    server.id
                )));
            }
        }

        let defaults: Vec<&str> = self
            .servers
            .iter()
            .filter(|s| s.enabled && s.is_default)
            .map(|s| s.id.as_str())
            .collect();
        if defaults.len() > 1 {
            return Err(JailctlError::Config(format!(
                "Only one enabled server may be the default, found: {}",
                defaults.join(", ")
            )));
        }

        if let Some(url) = &self.callback_url {
            validate_callback_url(url)?;
        }
        Ok(())
    }

    /// Save settings to YAML file atomically
    ///
    /// Uses tempfile + rename pattern to prevent corruption on crash.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        use std::io::Write;
        use std::os::unix::fs::PermissionsExt;
        use tempfile::NamedTempFile;

        let path = path.as_ref();
        let content =
            serde_yaml::to_string(self).with_context(|| "Failed to serialize settings")?;

        // Create temporary file in the same directory for atomic rename
        let parent_dir = path.parent().unwrap_or(Path::new("/etc/jailctl"));
        std::fs::create_dir_all(parent_dir)
            .with_context(|| format!("Failed to create {:?}", parent_dir))?;
        let mut temp_file = NamedTempFile::new_in(parent_dir)
            .context("Failed to create temporary file for settings")?;

        temp_file.write_all(content.as_bytes())?;
        temp_file.as_file().sync_all()?;
        // Agent secrets may live in this file
        std::fs::set_permissions(temp_file.path(), std::fs::Permissions::from_mode(0o600))?;

        temp_file
            .persist(path)
            .with_context(|| format!("Failed to persist settings file: {:?}", path))?;

        Ok(())
    }

    pub fn enabled_servers(&self) -> impl Iterator<Item = &Server> {
        self.servers.iter().filter(|s| s.enabled)
    }

    pub fn get_server(&self, id: &str) -> Option<&Server> {
        self.servers.iter().find(|s| s.id == id)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn aggregate_options(&self) -> AggregateOptions {
        AggregateOptions {
            concurrency: self.aggregate_concurrency,
            deadline: Duration::from_secs(self.aggregate_timeout_secs),
        }
    }
}

/// The callback URL ends up inside a shell command in the action file, so
/// only a conservative character set is accepted.
pub fn validate_callback_url(url: &str) -> crate::error::Result<()> {
    let scheme_ok = url.starts_with("https://") || url.starts_with("http://");
    let chars_ok = url
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "-._~:/?#[]@!&()*+,;=%".contains(c));
    if !scheme_ok || !chars_ok {
        return Err(JailctlError::Config(format!(
            "Invalid callback_url '{}'. Use an http(s) URL without quotes or spaces",
            url
        )));
    }
    Ok(())
}
