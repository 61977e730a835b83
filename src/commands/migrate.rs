//! Migrate command implementation.

use anyhow::{bail, Result};
use std::sync::Arc;

use super::Context;
use crate::config::{Server, ServerType};
use crate::connector::LocalConnector;
use crate::lock::JailLocks;
use crate::migration::migrate_legacy_jails;

/// Run the migrate command
///
/// Only the local server is migrated; remote servers migrate themselves
/// when their own jailctl instance starts with migration enabled.
pub async fn run(ctx: &Context) -> Result<()> {
    let settings = ctx.settings()?;
    let server = match ctx.server.as_deref() {
        Some(id) => match settings.get_server(id) {
            Some(s) if s.server_type == ServerType::Local => s.clone(),
            Some(_) => bail!("Server '{}' is not local; migration runs on the fail2ban host", id),
            None => bail!("Unknown server '{}'", id),
        },
        None => settings
            .servers
            .iter()
            .find(|s| s.server_type == ServerType::Local)
            .cloned()
            .unwrap_or_else(Server::local),
    };
    let _lock = ctx.lock(&settings)?;

    let connector = LocalConnector::new(server, &settings, Arc::new(JailLocks::new()));
    let report = migrate_legacy_jails(connector.engine()).await?;

    ctx.emit(&report, |report| {
        if report.is_noop() {
            println!("[OK] Nothing to migrate");
            return;
        }
        if let Some(backup) = &report.backup {
            println!("Backup: {}", backup);
        }
        for jail in &report.migrated {
            println!("[OK] Migrated {} to jail.d/{}.local (disabled)", jail, jail);
        }
        for jail in &report.skipped_existing {
            println!("[SKIP] {}: jail.d file already exists, legacy section commented out", jail);
        }
        for name in &report.skipped_invalid {
            println!("[SKIP] {}: not a valid jail name, left in jail.local", name);
        }
    })
}
