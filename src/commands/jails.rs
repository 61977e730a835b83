//! Jails, ban and unban command implementations.

use anyhow::Result;

use super::Context;
use crate::utils::format_count;

/// Run the jails command
pub async fn run(ctx: &Context, all: bool) -> Result<()> {
    let (_, connector) = ctx.connect().await?;
    let jails = if all {
        connector.get_all_jails().await?
    } else {
        connector.get_jail_infos().await?
    };

    ctx.emit(&jails, |jails| {
        println!();
        println!("Server: {}", connector.server().display_name());
        if jails.is_empty() {
            println!("No jails found");
            println!();
            return;
        }
        if all {
            for jail in jails {
                let state = if jail.enabled { "enabled" } else { "disabled" };
                println!("  {:<28} {}", jail.jail_name, state);
            }
        } else {
            println!("  {:<28} {:>8} {:>10}", "JAIL", "BANNED", "LAST HOUR");
            for jail in jails {
                println!(
                    "  {:<28} {:>8} {:>10}",
                    jail.jail_name,
                    format_count(jail.total_banned),
                    jail.new_in_last_hour
                );
            }
            let total: usize = jails.iter().map(|j| j.total_banned).sum();
            println!();
            println!("Total banned: {}", format_count(total));
        }
        println!();
    })
}

/// Run the ban command
pub async fn ban(ctx: &Context, jail: &str, ip: &str) -> Result<()> {
    let (_, connector) = ctx.connect().await?;
    connector.ban_ip(jail, ip).await?;
    println!("[OK] Banned {} in {}", ip, jail);
    Ok(())
}

/// Run the unban command
pub async fn unban(ctx: &Context, jail: &str, ip: &str) -> Result<()> {
    let (_, connector) = ctx.connect().await?;
    connector.unban_ip(jail, ip).await?;
    println!("[OK] Unbanned {} from {}", ip, jail);
    Ok(())
}
