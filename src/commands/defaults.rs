//! Defaults command implementation.

use anyhow::{bail, Result};

use super::Context;
use crate::cli::DefaultsArgs;
use crate::config_engine::DefaultSettings;

impl From<DefaultsArgs> for DefaultSettings {
    fn from(args: DefaultsArgs) -> Self {
        Self {
            bantime: args.bantime,
            findtime: args.findtime,
            maxretry: args.maxretry,
            ignoreip: (!args.ignoreip.is_empty()).then_some(args.ignoreip),
            banaction: args.banaction,
            banaction_allports: args.banaction_allports,
            destemail: args.destemail,
            backend: args.backend,
        }
    }
}

/// Run the defaults command
pub async fn run(ctx: &Context, args: DefaultsArgs) -> Result<()> {
    let settings = DefaultSettings::from(args);
    if settings.is_empty() {
        bail!("Nothing to change. Pass at least one option, e.g. --bantime 1h");
    }
    // Fail fast before connecting
    settings.validate()?;

    let (app_settings, connector) = ctx.connect().await?;
    let _lock = ctx.lock(&app_settings)?;
    connector.update_default_settings(&settings).await?;

    for (key, value) in settings.entries() {
        println!("[OK] {} = {}", key, value);
    }
    println!("     Run 'jailctl reload' to apply changes");
    Ok(())
}
