//! Filter command implementation.

use anyhow::{bail, Result};
use std::path::Path;

use super::{read_input, Context};
use crate::cli::FilterAction;

/// Run the filter command
pub async fn run(ctx: &Context, action: FilterAction) -> Result<()> {
    match action {
        FilterAction::List => list(ctx).await,
        FilterAction::Show { name } => show(ctx, &name).await,
        FilterAction::Set { name, file } => write(ctx, &name, file.as_deref(), false).await,
        FilterAction::Create { name, file } => write(ctx, &name, file.as_deref(), true).await,
        FilterAction::Delete { name } => delete(ctx, &name).await,
        FilterAction::Test { name, file } => test(ctx, &name, file.as_deref()).await,
    }
}

async fn list(ctx: &Context) -> Result<()> {
    let (_, connector) = ctx.connect().await?;
    let filters = connector.get_filters().await?;
    ctx.emit(&filters, |filters| {
        for name in filters {
            println!("{}", name);
        }
    })
}

async fn show(ctx: &Context, name: &str) -> Result<()> {
    let (_, connector) = ctx.connect().await?;
    print!("{}", connector.get_filter_config(name).await?);
    Ok(())
}

async fn write(ctx: &Context, name: &str, file: Option<&Path>, create: bool) -> Result<()> {
    let content = read_input(file)?;
    if content.trim().is_empty() {
        bail!("Refusing to write an empty filter");
    }
    let (settings, connector) = ctx.connect().await?;
    let _lock = ctx.lock(&settings)?;

    if create {
        connector.create_filter(name, &content).await?;
        println!("[OK] Created filter {}", name);
    } else {
        connector.set_filter_config(name, &content).await?;
        println!("[OK] Updated filter {}", name);
    }
    Ok(())
}

async fn delete(ctx: &Context, name: &str) -> Result<()> {
    let (settings, connector) = ctx.connect().await?;
    let _lock = ctx.lock(&settings)?;
    connector.delete_filter(name).await?;
    println!("[OK] Deleted filter {}", name);
    Ok(())
}

async fn test(ctx: &Context, name: &str, file: Option<&Path>) -> Result<()> {
    let input = read_input(file)?;
    let lines: Vec<String> = input
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(String::from)
        .collect();
    let (_, connector) = ctx.connect().await?;
    let result = connector.test_filter(name, &lines).await?;

    ctx.emit(&result, |result| {
        println!(
            "{} of {} lines matched filter {}",
            result.matched_lines.len(),
            lines.len(),
            name
        );
        for line in &result.matched_lines {
            println!("  {}", line);
        }
    })
}
