//! Reload and restart command implementations.

use anyhow::Result;
use tracing::info;

use super::Context;
use crate::connector::RestartMode;

/// Run the reload command
pub async fn reload(ctx: &Context) -> Result<()> {
    let (_, connector) = ctx.connect().await?;
    info!("Reloading fail2ban on {}...", connector.server().id);
    connector.reload().await?;
    println!("[OK] fail2ban reloaded");
    Ok(())
}

/// Run the restart command
pub async fn restart(ctx: &Context) -> Result<()> {
    let (_, connector) = ctx.connect().await?;
    info!("Restarting fail2ban on {}...", connector.server().id);
    match connector.restart_with_mode().await? {
        RestartMode::Restart => println!("[OK] fail2ban restarted"),
        RestartMode::Reload => {
            println!("[OK] fail2ban reloaded (systemd not available, restart skipped)")
        }
    }
    Ok(())
}
