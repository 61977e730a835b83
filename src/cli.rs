//! CLI argument parsing with clap.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::{CONFIG_ENV, DEFAULT_CONFIG_PATH};

#[derive(Parser)]
#[command(name = "jailctl")]
#[command(author, version, about = "Control plane for local, SSH and agent-managed fail2ban")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file path
    #[arg(short, long, env = CONFIG_ENV, default_value = DEFAULT_CONFIG_PATH, global = true)]
    pub config: PathBuf,

    /// Server ID to act on (default: the server flagged is_default)
    #[arg(short, long, global = true)]
    pub server: Option<String>,

    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    /// Quiet mode (errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose mode (debug output)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List configured servers
    Servers {
        /// Contact every enabled server and report whether it answers
        #[arg(long)]
        check: bool,
    },

    /// Show jails with their current bans
    Jails {
        /// List every configured jail, including inactive ones
        #[arg(long)]
        all: bool,
    },

    /// Ban an IP in a jail
    Ban {
        jail: String,
        ip: String,
    },

    /// Unban an IP from a jail
    Unban {
        jail: String,
        ip: String,
    },

    /// Reload fail2ban configuration (keeps bans)
    Reload,

    /// Restart fail2ban (falls back to reload without systemd)
    Restart,

    /// Manage jail configuration files
    Jail {
        #[command(subcommand)]
        action: JailAction,
    },

    /// Manage filter files
    Filter {
        #[command(subcommand)]
        action: FilterAction,
    },

    /// Update the [DEFAULT] section of jail.local
    Defaults(DefaultsArgs),

    /// Check the structure of jail.local
    Integrity {
        /// Create or adopt a managed jail.local if needed
        #[arg(long)]
        ensure: bool,
    },

    /// Resolve a log path and list the files it matches
    Logpath {
        /// Log path pattern, e.g. "%(sshd_log)s" or "/var/log/nginx/*.log"
        logpath: String,
    },

    /// Push the ban/unban callback action to remote servers
    ActionFiles {
        /// Callback URL (default: callback_url from the config file)
        #[arg(long)]
        url: Option<String>,
    },

    /// Split a legacy monolithic jail.local into jail.d/ files
    Migrate,

    /// Show version
    Version,
}

#[derive(Subcommand)]
pub enum JailAction {
    /// Print the effective config of a jail
    Show { name: String },
    /// Replace a jail config (reads stdin unless --file is given)
    Set {
        name: String,
        #[arg(long)]
        file: Option<PathBuf>,
        /// Do not reload fail2ban afterwards
        #[arg(long)]
        no_reload: bool,
    },
    /// Create a new jail (disabled unless the content enables it)
    Create {
        name: String,
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Delete a jail's files
    Delete { name: String },
    /// Enable a jail and reload
    Enable {
        name: String,
        #[arg(long)]
        no_reload: bool,
    },
    /// Disable a jail and reload
    Disable {
        name: String,
        #[arg(long)]
        no_reload: bool,
    },
}

#[derive(Subcommand)]
pub enum FilterAction {
    /// List available filters
    List,
    /// Print a filter file
    Show { name: String },
    /// Replace a filter (reads stdin unless --file is given)
    Set {
        name: String,
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Create a new filter
    Create {
        name: String,
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Delete a filter
    Delete { name: String },
    /// Run a filter over sample log lines (reads stdin unless --file is given)
    Test {
        name: String,
        #[arg(long)]
        file: Option<PathBuf>,
    },
}

#[derive(Args, Debug, Default)]
pub struct DefaultsArgs {
    #[arg(long)]
    pub bantime: Option<String>,
    #[arg(long)]
    pub findtime: Option<String>,
    #[arg(long)]
    pub maxretry: Option<u32>,
    /// Addresses never banned; repeat for several
    #[arg(long)]
    pub ignoreip: Vec<String>,
    #[arg(long)]
    pub banaction: Option<String>,
    #[arg(long)]
    pub banaction_allports: Option<String>,
    #[arg(long)]
    pub destemail: Option<String>,
    #[arg(long)]
    pub backend: Option<String>,
}
