//! Command execution abstraction for testability.
//!
//! This module provides a trait-based abstraction over process execution,
//! allowing unit tests to mock `fail2ban-client`, `systemctl` and `ssh`
//! calls without actually running them.
//!
//! The real executor runs every child under a deadline and with
//! `kill_on_drop`, so a cancelled or timed-out caller never leaks a process.

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::error::{JailctlError, Result};
use crate::utils::truncate;

#[cfg(test)]
use mockall::automock;

/// Default per-command deadline
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Output from command execution
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    /// Standard output from the command
    pub stdout: String,
    /// Standard error from the command
    pub stderr: String,
    /// Whether the command succeeded (exit code 0)
    pub success: bool,
    /// The exit code, if available
    pub code: Option<i32>,
}

impl CommandOutput {
    /// Convenience constructor for a successful run.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            success: true,
            code: Some(0),
        }
    }

    /// Convenience constructor for a failed run.
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            success: false,
            code: Some(code),
        }
    }

    /// Turn a nonzero exit into a transport error carrying `context`.
    pub fn into_checked(self, context: &str) -> Result<String> {
        if self.success {
            return Ok(self.stdout);
        }
        let detail = if self.stderr.trim().is_empty() {
            self.stdout.trim()
        } else {
            self.stderr.trim()
        };
        Err(JailctlError::transport(
            context,
            format!(
                "exit code {}: {}",
                self.code.map_or_else(|| "none".to_string(), |c| c.to_string()),
                truncate(detail, 512)
            ),
        ))
    }
}

/// Trait for command execution, allowing dependency injection for testing.
///
/// The real implementation spawns processes with tokio, while tests use the
/// generated `MockCommandExecutor` to control command behavior.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Execute a command with the given arguments.
    ///
    /// # Arguments
    /// * `cmd` - The command to execute (e.g., "fail2ban-client")
    /// * `args` - The arguments to pass to the command
    ///
    /// # Returns
    /// A `CommandOutput` with stdout, stderr and exit status. A nonzero exit
    /// is not an error at this level; failing to spawn or exceeding the
    /// deadline is.
    async fn execute(&self, cmd: &str, args: &[String]) -> Result<CommandOutput>;

    /// Execute a command with stdin input.
    async fn execute_with_stdin(
        &self,
        cmd: &str,
        args: &[String],
        stdin: &str,
    ) -> Result<CommandOutput>;
}

/// Real implementation of CommandExecutor that runs actual system commands.
#[derive(Debug, Clone)]
pub struct RealCommandExecutor {
    timeout: Duration,
}

impl Default for RealCommandExecutor {
    fn default() -> Self {
        Self::new(DEFAULT_COMMAND_TIMEOUT)
    }
}

impl RealCommandExecutor {
    /// Create a new RealCommandExecutor with the given per-command deadline
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn run(&self, cmd: &str, args: &[String], stdin: Option<&str>) -> Result<CommandOutput> {
        let context = describe(cmd, args);
        debug!("exec: {}", context);

        let mut command = Command::new(cmd);
        command
            .args(args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command
            .spawn()
            .map_err(|e| JailctlError::transport(&context, format!("failed to spawn: {}", e)))?;

        let stdin_data = stdin.map(|s| s.to_string());
        let mut child_stdin = child.stdin.take();

        let io = async move {
            if let (Some(mut pipe), Some(data)) = (child_stdin.take(), stdin_data) {
                pipe.write_all(data.as_bytes()).await?;
                pipe.shutdown().await?;
                drop(pipe);
            }
            child.wait_with_output().await
        };

        // On timeout the future is dropped, which drops the child and kills it.
        let output = tokio::time::timeout(self.timeout, io)
            .await
            .map_err(|_| {
                JailctlError::timeout(
                    &context,
                    format!("no result after {}s", self.timeout.as_secs()),
                )
            })?
            .map_err(|e| JailctlError::transport(&context, e.to_string()))?;

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            success: output.status.success(),
            code: output.status.code(),
        })
    }
}

#[async_trait]
impl CommandExecutor for RealCommandExecutor {
    async fn execute(&self, cmd: &str, args: &[String]) -> Result<CommandOutput> {
        self.run(cmd, args, None).await
    }

    async fn execute_with_stdin(
        &self,
        cmd: &str,
        args: &[String],
        stdin_data: &str,
    ) -> Result<CommandOutput> {
        self.run(cmd, args, Some(stdin_data)).await
    }
}

/// Where a connector's commands actually run: this host, or the far end of
/// an SSH session.
///
/// Implementations decide how `program args...` reaches the target and with
/// which privileges; callers only see the resulting [`CommandOutput`].
#[async_trait]
pub trait Transport: Send + Sync {
    /// Run `program` with `args` on the target, feeding `stdin` if given.
    async fn run(&self, program: &str, args: &[String], stdin: Option<&str>)
        -> Result<CommandOutput>;

    /// Label used in logs and error context (e.g. `local`, `ssh root@web1`).
    fn label(&self) -> String;
}

/// Run a POSIX shell script on a transport. `params` become `$1..$n`.
pub async fn run_script(
    transport: &dyn Transport,
    script: &str,
    params: &[&str],
    stdin: Option<&str>,
) -> Result<CommandOutput> {
    let mut args = vec!["-c".to_string(), script.to_string(), "sh".to_string()];
    args.extend(params.iter().map(|p| p.to_string()));
    transport.run("sh", &args, stdin).await
}

/// Short human-readable form of a command line, used as error context.
pub fn describe(cmd: &str, args: &[String]) -> String {
    let mut out = cmd.to_string();
    for arg in args {
        out.push(' ');
        out.push_str(arg);
    }
    truncate(&out, 160)
}

/// Helper function to convert a slice of &str to Vec<String>.
///
/// This is needed because mockall has issues with lifetimes in `&[&str]`,
/// so we use `&[String]` in the trait signature instead.
pub fn args_to_strings(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}
