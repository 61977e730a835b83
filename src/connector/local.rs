//! Connector for the fail2ban instance on this machine.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

use super::host::{HostConnector, HostOptions};
use crate::cmd_abstraction::{CommandExecutor, CommandOutput, RealCommandExecutor, Transport};
use crate::config::{Server, Settings};
use crate::config_engine::{ConfigEngine, Fail2banLayout};
use crate::error::Result;
use crate::fs_abstraction::RealFileSystem;
use crate::lock::JailLocks;

/// Runs commands directly with the privileges of this process.
#[derive(Clone)]
pub struct LocalTransport {
    executor: Arc<dyn CommandExecutor>,
}

impl LocalTransport {
    pub fn new(executor: Arc<dyn CommandExecutor>) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl Transport for LocalTransport {
    async fn run(&self, program: &str, args: &[String], stdin: Option<&str>) -> Result<CommandOutput> {
        match stdin {
            Some(data) => self.executor.execute_with_stdin(program, args, data).await,
            None => self.executor.execute(program, args).await,
        }
    }

    fn label(&self) -> String {
        "local".to_string()
    }
}

pub type LocalConnector = HostConnector<LocalTransport>;

impl LocalConnector {
    pub fn new(server: Server, settings: &Settings, locks: Arc<JailLocks>) -> Self {
        let executor = Arc::new(RealCommandExecutor::new(settings.command_timeout()));
        let root = PathBuf::from(
            server
                .fail2ban_dir
                .clone()
                .unwrap_or_else(|| settings.fail2ban_dir.clone()),
        );
        let engine = ConfigEngine::new(
            Arc::new(RealFileSystem),
            Fail2banLayout::new(root),
            locks,
            server.id.clone(),
        );
        let options = HostOptions {
            aggregate: settings.aggregate_options(),
        };
        Self::from_parts(server, Arc::new(LocalTransport::new(executor)), engine, options)
    }
}
