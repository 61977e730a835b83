//! jailctl - control plane for local, SSH and agent-managed fail2ban.

use anyhow::{bail, Result};
use clap::Parser;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use jailctl::cli::{Cli, Commands};
use jailctl::commands::{self, Context};

async fn dispatch(command: Commands, ctx: &Context) -> Result<()> {
    match command {
        Commands::Servers { check } => commands::servers::run(ctx, check).await,
        Commands::Jails { all } => commands::jails::run(ctx, all).await,
        Commands::Ban { jail, ip } => commands::jails::ban(ctx, &jail, &ip).await,
        Commands::Unban { jail, ip } => commands::jails::unban(ctx, &jail, &ip).await,
        Commands::Reload => commands::service::reload(ctx).await,
        Commands::Restart => commands::service::restart(ctx).await,
        Commands::Jail { action } => commands::jail::run(ctx, action).await,
        Commands::Filter { action } => commands::filter::run(ctx, action).await,
        Commands::Defaults(args) => commands::defaults::run(ctx, args).await,
        Commands::Integrity { ensure } => commands::integrity::run(ctx, ensure).await,
        Commands::Logpath { logpath } => commands::logpath::run(ctx, &logpath).await,
        Commands::ActionFiles { url } => commands::action_files::run(ctx, url).await,
        Commands::Migrate => commands::migrate::run(ctx).await,
        Commands::Version => {
            println!("jailctl {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    let log_level = if cli.verbose {
        Level::DEBUG
    } else if cli.quiet {
        Level::ERROR
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .without_time()
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let ctx = Context {
        config_path: cli.config,
        server: cli.server,
        json: cli.json,
    };

    // Dropping the command future kills any child process it is waiting on
    tokio::select! {
        result = dispatch(cli.command, &ctx) => result,
        _ = tokio::signal::ctrl_c() => bail!("Interrupted"),
    }
}
