//! Integrity command implementation.

use anyhow::Result;

use super::Context;
use crate::config_engine::StructureOutcome;

/// Run the integrity command
pub async fn run(ctx: &Context, ensure: bool) -> Result<()> {
    let (settings, connector) = ctx.connect().await?;

    if ensure {
        let _lock = ctx.lock(&settings)?;
        let outcome = connector.ensure_jail_local_structure().await?;
        ctx.emit(&outcome, |outcome| match outcome {
            StructureOutcome::Created => println!("[OK] Created managed jail.local"),
            StructureOutcome::AlreadyManaged => println!("[OK] jail.local is already managed"),
            StructureOutcome::Adopted { backup } => {
                println!("[OK] Adopted existing jail.local");
                println!("     Backup: {}", backup);
            }
        })?;
    }

    let report = connector.check_jail_local_integrity().await?;
    ctx.emit(&report, |report| {
        println!();
        println!("jail.local on {}", connector.server().display_name());
        println!("  Exists:          {}", report.exists);
        println!("  Managed:         {}", report.managed);
        if let Some(version) = report.marker_version {
            println!("  Marker version:  {}", version);
        }
        println!("  [DEFAULT]:       {}", report.has_default_section);
        if !report.legacy_jail_sections.is_empty() {
            println!();
            println!(
                "  Legacy jail sections: {}",
                report.legacy_jail_sections.join(", ")
            );
            println!("  Run 'jailctl migrate' to move them to jail.d/");
        }
        println!();
    })
}
