//! # jailctl - fail2ban control plane
//!
//! Drives one or more fail2ban instances through a single capability set:
//! jail summaries, bans, reloads, and edits to jail, filter and action files.
//! Servers are reached on this machine, over SSH, or through an HTTP agent.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        jailctl                              │
//! ├─────────────────────────────────────────────────────────────┤
//! │  CLI (clap)                                                 │
//! │    └── Commands: jails, ban, jail, filter, defaults...     │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Manager                                                    │
//! │    └── server id -> Arc<dyn Connector>, swapped atomically  │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Connector (trait)                                          │
//! │    ├── LocalConnector  (tokio::process)                     │
//! │    ├── SshConnector    (system ssh, sudo -n)                │
//! │    └── AgentConnector  (reqwest + rustls)                   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Config engine                                              │
//! │    ├── jail_config: pure section/key text edits             │
//! │    ├── config_engine: jail.d/, filter.d/, jail.local        │
//! │    └── migration: legacy jail.local split                   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Aggregator (futures::buffer_unordered)                     │
//! │    └── bounded per-jail fan-out with a shared deadline      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example Usage
//!
//! ```no_run
//! use jailctl::config::Settings;
//! use jailctl::manager::Manager;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load("/etc/jailctl/config.yaml")?;
//!     let manager = Manager::from_settings(&settings).await?;
//!
//!     let connector = manager.default_connector()?;
//!     for jail in connector.get_jail_infos().await? {
//!         println!("{}: {} banned", jail.jail_name, jail.total_banned);
//!     }
//!
//!     connector.ban_ip("sshd", "203.0.113.7").await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Security
//!
//! - **Input Validation** - jail/filter names, IPs and config values are
//!   checked before any command, file write or request
//! - **No shell interpolation** - remote commands are quoted word by word
//! - **Atomic writes** - config files are written to a temp file and renamed
//! - **Credential Protection** - agent secrets can come from the environment
//!   and are zeroed on drop
//!
//! ## Modules
//!
//! - [`action_file`] - Ban/unban callback action rendering
//! - [`aggregator`] - Concurrent per-jail ban collection
//! - [`cli`] - Command-line interface definitions
//! - [`cmd_abstraction`] - Command execution and transports
//! - [`commands`] - CLI command implementations
//! - [`config`] - Settings file parsing and validation
//! - [`config_engine`] - Jail and filter file operations
//! - [`connector`] - Local, SSH and agent connectors
//! - [`error`] - Error taxonomy
//! - [`fs_abstraction`] - Local and shell-backed file access
//! - [`jail_config`] - fail2ban config text manipulation
//! - [`lock`] - Per-jail locks and the process lock file
//! - [`manager`] - Connector registry
//! - [`migration`] - Legacy `jail.local` migration
//! - [`utils`] - Common utility functions
//! - [`validation`] - Input validation

pub mod action_file;
pub mod aggregator;
pub mod cli;
pub mod cmd_abstraction;
pub mod commands;
pub mod config;
pub mod config_engine;
pub mod connector;
pub mod error;
pub mod fs_abstraction;
pub mod jail_config;
pub mod lock;
pub mod manager;
pub mod migration;
pub mod utils;
pub mod validation;

pub use cli::{Cli, Commands};
pub use config::Settings;
pub use connector::Connector;
pub use error::{JailctlError, Result};
pub use manager::Manager;
