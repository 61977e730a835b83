//! One-time split of a legacy monolithic `jail.local` into per-jail files.
//!
//! Older installs keep every jail in `jail.local`. Migration moves each
//! active jail section into `jail.d/<name>.local` (marked as managed and
//! disabled, so nothing starts banning unexpectedly) and rewrites
//! `jail.local` down to its preamble, `[DEFAULT]`, `[INCLUDES]` and
//! commented-out sections. A byte-exact backup is taken before anything
//! is written.

use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::config_engine::{ConfigEngine, JAIL_LOCAL_RESOURCE};
use crate::error::Result;
use crate::jail_config::{
    comment_out, join_blocks, managed_marker, marker_version, set_jail_enabled, split_blocks,
    Block, BlockKind,
};
use crate::validation::{is_reserved_section, validate_jail_name};

/// Environment variable that opts into migration (`1`, `true` or `yes`)
pub const MIGRATE_ENV: &str = "JAILCTL_MIGRATE_LEGACY";

/// True if [`MIGRATE_ENV`] is set to an affirmative value.
pub fn migration_requested_by_env() -> bool {
    migration_requested_by(std::env::var(MIGRATE_ENV).ok().as_deref())
}

/// True if `value` is an affirmative flag (`1`, `true` or `yes`, any case).
pub fn migration_requested_by(value: Option<&str>) -> bool {
    value.is_some_and(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
}

/// Outcome of a migration run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationReport {
    /// Backup of the original `jail.local`, if one was taken
    pub backup: Option<String>,
    /// Jails moved to `jail.d/<name>.local`
    pub migrated: Vec<String>,
    /// Jails that already had a per-jail file; their legacy section was
    /// commented out instead
    pub skipped_existing: Vec<String>,
    /// Sections whose name is not a valid jail name, left in place
    pub skipped_invalid: Vec<String>,
}

impl MigrationReport {
    /// True if nothing was found to migrate.
    pub fn is_noop(&self) -> bool {
        self.backup.is_none()
    }
}

/// Run the migration once per process.
///
/// A failed attempt is not remembered, so the next call tries again.
#[derive(Debug, Default)]
pub struct LegacyMigration {
    done: OnceCell<MigrationReport>,
}

impl LegacyMigration {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn run_once(&self, engine: &ConfigEngine) -> Result<&MigrationReport> {
        self.done
            .get_or_try_init(|| migrate_legacy_jails(engine))
            .await
    }

    /// Report of the completed run, if any.
    pub fn report(&self) -> Option<&MigrationReport> {
        self.done.get()
    }
}

fn is_active_jail(block: &Block) -> Option<&str> {
    match &block.kind {
        BlockKind::Section(name) if !is_reserved_section(name) => Some(name),
        _ => None,
    }
}

/// Move active jail sections out of `jail.local`.
///
/// The rewritten `jail.local` keeps the preamble comments, `[DEFAULT]`,
/// `[INCLUDES]`, the commented-out sections and any section whose name is
/// not a valid jail name. Only valid active jail sections leave the file.
pub async fn migrate_legacy_jails(engine: &ConfigEngine) -> Result<MigrationReport> {
    let _guard = engine.lock(JAIL_LOCAL_RESOURCE).await;
    let layout = engine.layout();
    let fs = engine.fs();
    let jail_local = layout.jail_local();

    let Some(content) = engine.read_optional(&jail_local).await? else {
        return Ok(MigrationReport::default());
    };
    let blocks = split_blocks(&content);
    if !blocks.iter().any(|b| is_active_jail(b).is_some()) {
        return Ok(MigrationReport::default());
    }

    let mut report = MigrationReport {
        backup: Some(engine.backup(&jail_local).await?.display().to_string()),
        ..Default::default()
    };

    let mut kept: Vec<Block> = Vec::with_capacity(blocks.len());
    for block in blocks {
        let Some(name) = is_active_jail(&block).map(String::from) else {
            kept.push(block);
            continue;
        };

        if validate_jail_name(&name).is_err() {
            warn!("Leaving section [{}] in jail.local: not a valid jail name", name);
            report.skipped_invalid.push(name);
            kept.push(block);
            continue;
        }

        let target = layout.jail_file(&name, "local");
        if fs.exists(&target).await? {
            warn!(
                "{} already exists, commenting out legacy [{}]",
                target.display(),
                name
            );
            kept.push(comment_out(&block));
            report.skipped_existing.push(name);
            continue;
        }

        let body = set_jail_enabled(&block.text(), &name, false);
        fs.create_dir_all(&layout.jail_d()).await?;
        fs.write_atomic(&target, &format!("{}\n{}", managed_marker(), body))
            .await?;
        info!("Migrated jail {} to {}", name, target.display());
        report.migrated.push(name);
    }

    let mut rewritten = join_blocks(&kept);
    if marker_version(&rewritten).is_none() {
        rewritten = format!("{}\n{}", managed_marker(), rewritten);
    }
    fs.write_atomic(&jail_local, &rewritten).await?;

    info!(
        "Legacy migration done: {} migrated, {} already split, {} invalid",
        report.migrated.len(),
        report.skipped_existing.len(),
        report.skipped_invalid.len()
    );
    Ok(report)
}
