//! Connector for fail2ban on a remote host, driven over the system `ssh`
//! binary.
//!
//! Every call is one non-interactive `ssh` invocation. Remote commands are
//! shell-quoted word by word, and run through `sudo -n` when the login user
//! is not root. Config files are edited through a
//! [`ShellFileSystem`] on the same transport.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

use super::host::{HostConnector, HostOptions};
use crate::cmd_abstraction::{
    describe, CommandExecutor, CommandOutput, RealCommandExecutor, Transport,
};
use crate::config::{Server, Settings};
use crate::config_engine::{ConfigEngine, Fail2banLayout};
use crate::error::{JailctlError, Result};
use crate::fs_abstraction::ShellFileSystem;
use crate::lock::JailLocks;
use crate::utils::{shell_join, truncate};

/// Exit status ssh itself uses for connection and authentication errors
const SSH_FAILURE_EXIT: i32 = 255;

/// Upper bound for the TCP connect phase
const MAX_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Runs commands on a remote host through `ssh`.
#[derive(Clone)]
pub struct SshTransport {
    executor: Arc<dyn CommandExecutor>,
    destination: String,
    options: Vec<String>,
    sudo: bool,
}

impl SshTransport {
    pub fn new(server: &Server, executor: Arc<dyn CommandExecutor>, connect_timeout_secs: u64) -> Self {
        let mut options = vec![
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", connect_timeout_secs.clamp(1, MAX_CONNECT_TIMEOUT_SECS)),
            "-o".to_string(),
            "StrictHostKeyChecking=accept-new".to_string(),
            "-p".to_string(),
            server.port.to_string(),
        ];
        if let Some(key) = server.ssh_key_path.as_deref().filter(|k| !k.is_empty()) {
            options.push("-i".to_string());
            options.push(key.to_string());
        }

        Self {
            executor,
            destination: format!("{}@{}", server.ssh_user, server.host),
            options,
            sudo: server.ssh_user != "root",
        }
    }

    /// The remote command line for `program args...`.
    pub fn remote_command(&self, program: &str, args: &[String]) -> String {
        let line = shell_join(program, args);
        if self.sudo {
            format!("sudo -n {}", line)
        } else {
            line
        }
    }

    /// Full argument vector handed to the local `ssh` binary.
    pub fn ssh_args(&self, program: &str, args: &[String]) -> Vec<String> {
        let mut out = self.options.clone();
        out.push("--".to_string());
        out.push(self.destination.clone());
        out.push(self.remote_command(program, args));
        out
    }
}

#[async_trait]
impl Transport for SshTransport {
    async fn run(&self, program: &str, args: &[String], stdin: Option<&str>) -> Result<CommandOutput> {
        let ssh_args = self.ssh_args(program, args);
        let output = match stdin {
            Some(data) => self.executor.execute_with_stdin("ssh", &ssh_args, data).await,
            None => self.executor.execute("ssh", &ssh_args).await,
        }
        .map_err(|e| match e {
            // Replace the local command line with the remote one
            JailctlError::Transport { kind, message, .. } => JailctlError::Transport {
                kind,
                context: format!("{}: {}", self.label(), describe(program, args)),
                message,
            },
            other => other,
        })?;

        if output.code == Some(SSH_FAILURE_EXIT) {
            return Err(JailctlError::transport(
                self.label(),
                truncate(output.stderr.trim(), 512),
            ));
        }
        Ok(output)
    }

    fn label(&self) -> String {
        format!("ssh {}", self.destination)
    }
}

pub type SshConnector = HostConnector<SshTransport>;

impl SshConnector {
    pub fn new(server: Server, settings: &Settings, locks: Arc<JailLocks>) -> Result<Self> {
        if server.host.is_empty() {
            return Err(JailctlError::Config(format!(
                "Server '{}' has no ssh host",
                server.id
            )));
        }
        let executor = Arc::new(RealCommandExecutor::new(settings.command_timeout()));
        let transport = Arc::new(SshTransport::new(
            &server,
            executor,
            settings.command_timeout_secs,
        ));
        let root = PathBuf::from(
            server
                .fail2ban_dir
                .clone()
                .unwrap_or_else(|| settings.fail2ban_dir.clone()),
        );
        let fs = Arc::new(ShellFileSystem::new(transport.clone()));
        let engine = ConfigEngine::new(fs, Fail2banLayout::new(root), locks, server.id.clone());
        let options = HostOptions {
            aggregate: settings.aggregate_options(),
        };
        Ok(Self::from_parts(server, transport, engine, options))
    }
}
