//! CLI command implementations.

pub mod action_files;
pub mod defaults;
pub mod filter;
pub mod integrity;
pub mod jail;
pub mod jails;
pub mod logpath;
pub mod migrate;
pub mod servers;
pub mod service;

use anyhow::{Context as _, Result};
use serde::Serialize;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::config::Settings;
use crate::connector::Connector;
use crate::lock::LockGuard;
use crate::manager::Manager;

/// Global options shared by every command.
#[derive(Debug, Clone)]
pub struct Context {
    pub config_path: PathBuf,
    pub server: Option<String>,
    pub json: bool,
}

impl Context {
    /// Load the settings file, or the built-in defaults if it is missing.
    pub fn settings(&self) -> Result<Settings> {
        Settings::load_or_default(&self.config_path)
            .with_context(|| format!("Failed to load settings from {:?}", self.config_path))
    }

    /// Build the connector registry from the settings file.
    pub async fn manager(&self) -> Result<(Settings, Manager)> {
        let settings = self.settings()?;
        let manager = Manager::from_settings(&settings)
            .await
            .context("Failed to build server connectors")?;
        Ok((settings, manager))
    }

    /// The connector selected by `--server`, or the default one.
    pub async fn connect(&self) -> Result<(Settings, Arc<dyn Connector>)> {
        let (settings, manager) = self.manager().await?;
        let connector = manager.resolve(self.server.as_deref())?;
        debug!(
            "Using server {} ({})",
            connector.server().id,
            connector.server().server_type
        );
        Ok((settings, connector))
    }

    /// Take the process lock that serializes mutating commands.
    pub fn lock(&self, settings: &Settings) -> Result<LockGuard> {
        LockGuard::acquire(Path::new(&settings.lock_file))
    }

    /// Print `value` as pretty JSON when `--json` is set; otherwise run `text`.
    pub fn emit<T: Serialize>(&self, value: &T, text: impl FnOnce(&T)) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            text(value);
        }
        Ok(())
    }
}

/// Read command input from `file`, or stdin if none is given.
pub fn read_input(file: Option<&Path>) -> Result<String> {
    match file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display())),
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read stdin")?;
            Ok(buf)
        }
    }
}
