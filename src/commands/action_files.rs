//! Action-files command implementation.

use anyhow::{bail, Context as _, Result};

use super::Context;
use crate::manager::{ActionFileStatus, ActionFileUpdate};

/// Run the action-files command
pub async fn run(ctx: &Context, url: Option<String>) -> Result<()> {
    let (settings, manager) = ctx.manager().await?;
    let url = match url.or_else(|| settings.callback_url.clone()) {
        Some(url) => url,
        None => bail!("No callback URL. Pass --url or set callback_url in the config file"),
    };
    let _lock = ctx.lock(&settings)?;

    let updates: Vec<ActionFileUpdate> = match ctx.server.as_deref() {
        Some(id) => vec![manager
            .update_action_file_for_server(id, &url)
            .await
            .with_context(|| format!("Failed to update callback action on {}", id))?],
        None => manager.update_action_files(&url).await?,
    };

    ctx.emit(&updates, |updates| {
        if updates.is_empty() {
            println!("No remote servers configured");
        }
        for update in updates {
            match &update.status {
                ActionFileStatus::Updated => println!("[OK] {}: updated", update.server_id),
                ActionFileStatus::Unchanged => println!("[OK] {}: unchanged", update.server_id),
                ActionFileStatus::Failed { error } => {
                    println!("[FAIL] {}: {}", update.server_id, error)
                }
            }
        }
    })?;

    let failed = updates.iter().filter(|u| u.is_failed()).count();
    if failed > 0 {
        bail!("{} of {} servers failed", failed, updates.len());
    }
    Ok(())
}
