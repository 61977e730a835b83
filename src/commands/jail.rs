//! Jail command implementation.

use anyhow::Result;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

use super::{read_input, Context};
use crate::cli::JailAction;
use crate::connector::{reload_after_jail_edit, Connector};

/// Run the jail command
pub async fn run(ctx: &Context, action: JailAction) -> Result<()> {
    match action {
        JailAction::Show { name } => show(ctx, &name).await,
        JailAction::Set {
            name,
            file,
            no_reload,
        } => set(ctx, &name, file.as_deref(), no_reload).await,
        JailAction::Create { name, file } => create(ctx, &name, file.as_deref()).await,
        JailAction::Delete { name } => delete(ctx, &name).await,
        JailAction::Enable { name, no_reload } => set_enabled(ctx, &name, true, no_reload).await,
        JailAction::Disable { name, no_reload } => set_enabled(ctx, &name, false, no_reload).await,
    }
}

async fn show(ctx: &Context, name: &str) -> Result<()> {
    let (_, connector) = ctx.connect().await?;
    let content = connector.get_jail_config(name).await?;
    print!("{}", content);
    Ok(())
}

/// Reload after an edit, reporting a jail that had to be switched off.
async fn reload_after_edit(connector: &dyn Connector, name: &str) -> Result<()> {
    let report = reload_after_jail_edit(connector, name).await?;
    match report.auto_disabled {
        Some(disabled) => {
            println!(
                "[WARN] fail2ban rejected the new config; jail {} was disabled",
                disabled.jail
            );
            println!("       {}", disabled.cause);
        }
        None => println!("[OK] fail2ban reloaded"),
    }
    Ok(())
}

async fn set(ctx: &Context, name: &str, file: Option<&Path>, no_reload: bool) -> Result<()> {
    let content = read_input(file)?;
    let (settings, connector) = ctx.connect().await?;
    let _lock = ctx.lock(&settings)?;

    connector.set_jail_config(name, &content).await?;
    println!("[OK] Updated jail {}", name);

    if !no_reload {
        reload_after_edit(connector.as_ref(), name).await?;
    }
    Ok(())
}

async fn create(ctx: &Context, name: &str, file: Option<&Path>) -> Result<()> {
    let content = match file {
        Some(_) => read_input(file)?,
        None => String::new(),
    };
    let (settings, connector) = ctx.connect().await?;
    let _lock = ctx.lock(&settings)?;

    connector.create_jail(name, &content).await?;
    println!("[OK] Created jail {}", name);
    println!("     Run 'jailctl jail enable {}' to activate it", name);
    Ok(())
}

async fn delete(ctx: &Context, name: &str) -> Result<()> {
    let (settings, connector) = ctx.connect().await?;
    let _lock = ctx.lock(&settings)?;

    connector.delete_jail(name).await?;
    println!("[OK] Deleted jail {}", name);
    connector.reload().await?;
    Ok(())
}

async fn set_enabled(ctx: &Context, name: &str, enabled: bool, no_reload: bool) -> Result<()> {
    let (settings, connector) = ctx.connect().await?;
    let _lock = ctx.lock(&settings)?;

    let mut states = BTreeMap::new();
    states.insert(name.to_string(), enabled);
    connector.update_jail_enabled_states(&states).await?;
    info!("Set enabled = {} for {}", enabled, name);
    println!(
        "[OK] Jail {} {}",
        name,
        if enabled { "enabled" } else { "disabled" }
    );

    if no_reload {
        return Ok(());
    }
    if enabled {
        reload_after_edit(connector.as_ref(), name).await
    } else {
        connector.reload().await?;
        println!("[OK] fail2ban reloaded");
        Ok(())
    }
}
