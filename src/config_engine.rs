//! Filesystem-backed jail and filter configuration.
//!
//! [`ConfigEngine`] applies the pure text rules of [`crate::jail_config`] to
//! the files of one fail2ban installation. It only talks to a
//! [`FileSystem`], so the same engine serves the local host
//! ([`crate::fs_abstraction::RealFileSystem`]) and SSH hosts
//! ([`crate::fs_abstraction::ShellFileSystem`]).
//!
//! Every mutation holds the `(server, resource)` lock from [`JailLocks`]
//! for its whole read-modify-write cycle.

use chrono::Local;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info};

use crate::error::{JailctlError, Result};
use crate::fs_abstraction::FileSystem;
use crate::jail_config::{
    extract_logpath_from_jail_config, has_section, jail_skeleton, managed_marker, marker_version,
    normalize_jail_header, parse_jail_sections, section_values, set_jail_enabled,
    set_key_in_section, JailSection,
};
use crate::lock::JailLocks;
use crate::validation::{
    validate_config_value, validate_filter_name, validate_ip_or_cidr, validate_jail_name,
    validate_log_pattern, validate_time_value,
};

/// Default fail2ban configuration directory
pub const DEFAULT_FAIL2BAN_DIR: &str = "/etc/fail2ban";

/// Maximum `[INCLUDES]` nesting followed when loading variables
const MAX_INCLUDE_DEPTH: usize = 5;

/// Maximum `%(var)s` substitution rounds
const MAX_INTERPOLATION_DEPTH: usize = 10;

/// Backends accepted in `[DEFAULT] backend`
const KNOWN_BACKENDS: &[&str] = &["auto", "pyinotify", "gamin", "polling", "systemd"];

/// Lock resource shared by every `jail.local` mutation
pub(crate) const JAIL_LOCAL_RESOURCE: &str = "jail.local";

/// Paths of a fail2ban installation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fail2banLayout {
    root: PathBuf,
}

impl Default for Fail2banLayout {
    fn default() -> Self {
        Self::new(DEFAULT_FAIL2BAN_DIR)
    }
}

impl Fail2banLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn jail_local(&self) -> PathBuf {
        self.root.join("jail.local")
    }

    pub fn jail_conf(&self) -> PathBuf {
        self.root.join("jail.conf")
    }

    pub fn jail_d(&self) -> PathBuf {
        self.root.join("jail.d")
    }

    pub fn filter_d(&self) -> PathBuf {
        self.root.join("filter.d")
    }

    pub fn action_d(&self) -> PathBuf {
        self.root.join("action.d")
    }

    /// `jail.d/<name>.<ext>`
    pub fn jail_file(&self, name: &str, ext: &str) -> PathBuf {
        self.jail_d().join(format!("{}.{}", name, ext))
    }

    /// `filter.d/<name>.<ext>`
    pub fn filter_file(&self, name: &str, ext: &str) -> PathBuf {
        self.filter_d().join(format!("{}.{}", name, ext))
    }
}

/// Settings applied to the `[DEFAULT]` section of `jail.local`.
///
/// `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultSettings {
    pub bantime: Option<String>,
    pub findtime: Option<String>,
    pub maxretry: Option<u32>,
    pub ignoreip: Option<Vec<String>>,
    pub banaction: Option<String>,
    pub banaction_allports: Option<String>,
    pub destemail: Option<String>,
    pub backend: Option<String>,
}

impl DefaultSettings {
    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// Check every value before anything is written.
    pub fn validate(&self) -> Result<()> {
        if let Some(v) = &self.bantime {
            validate_time_value("bantime", v)?;
        }
        if let Some(v) = &self.findtime {
            validate_time_value("findtime", v)?;
        }
        if self.maxretry == Some(0) {
            return Err(JailctlError::validation("maxretry must be at least 1"));
        }
        for entry in self.ignoreip.iter().flatten() {
            validate_ip_or_cidr(entry)?;
        }
        for (key, value) in [
            ("banaction", &self.banaction),
            ("banaction_allports", &self.banaction_allports),
        ] {
            if let Some(v) = value {
                validate_config_value(key, v)?;
                if v.is_empty() || v.contains(char::is_whitespace) {
                    return Err(JailctlError::validation(format!(
                        "Invalid {} '{}'",
                        key, v
                    )));
                }
            }
        }
        if let Some(v) = &self.destemail {
            validate_config_value("destemail", v)?;
            let valid = v
                .split_once('@')
                .is_some_and(|(user, domain)| !user.is_empty() && domain.contains('.'));
            if !valid || v.contains(char::is_whitespace) {
                return Err(JailctlError::validation(format!(
                    "Invalid destemail '{}'",
                    v
                )));
            }
        }
        if let Some(v) = &self.backend {
            if !KNOWN_BACKENDS.contains(&v.as_str()) {
                return Err(JailctlError::validation(format!(
                    "Unknown backend '{}'. Expected one of: {}",
                    v,
                    KNOWN_BACKENDS.join(", ")
                )));
            }
        }
        Ok(())
    }

    /// `(key, value)` pairs for every field that is set, in a fixed order.
    pub fn entries(&self) -> Vec<(&'static str, String)> {
        let mut out = Vec::new();
        let mut push = |key: &'static str, value: Option<String>| {
            if let Some(v) = value {
                out.push((key, v));
            }
        };
        push("bantime", self.bantime.clone());
        push("findtime", self.findtime.clone());
        push("maxretry", self.maxretry.map(|m| m.to_string()));
        push("ignoreip", self.ignoreip.as_ref().map(|ips| ips.join(" ")));
        push("banaction", self.banaction.clone());
        push("banaction_allports", self.banaction_allports.clone());
        push("destemail", self.destemail.clone());
        push("backend", self.backend.clone());
        out
    }
}

/// Marker and structure report for `jail.local`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JailLocalIntegrity {
    pub exists: bool,
    pub managed: bool,
    pub marker_version: Option<u32>,
    pub has_default_section: bool,
    /// Active jail sections still living in `jail.local`
    pub legacy_jail_sections: Vec<String>,
}

/// What [`ConfigEngine::ensure_jail_local_structure`] did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum StructureOutcome {
    /// No file existed; a managed one was written
    Created,
    /// The file already carried the marker
    AlreadyManaged,
    /// An unmanaged file was backed up and marked
    Adopted { backup: String },
}

/// One log path pattern after variable resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogpathTest {
    /// The pattern as written
    pub pattern: String,
    /// The pattern with `%(var)s` references substituted
    pub resolved: String,
    /// Existing files matching `resolved`
    pub files: Vec<String>,
}

/// Config operations on one fail2ban installation.
#[derive(Clone)]
pub struct ConfigEngine {
    fs: Arc<dyn FileSystem>,
    layout: Fail2banLayout,
    locks: Arc<JailLocks>,
    scope: String,
}

impl ConfigEngine {
    /// `scope` is the server ID used as the first half of every lock key.
    pub fn new(
        fs: Arc<dyn FileSystem>,
        layout: Fail2banLayout,
        locks: Arc<JailLocks>,
        scope: impl Into<String>,
    ) -> Self {
        Self {
            fs,
            layout,
            locks,
            scope: scope.into(),
        }
    }

    pub fn layout(&self) -> &Fail2banLayout {
        &self.layout
    }

    pub fn fs(&self) -> &Arc<dyn FileSystem> {
        &self.fs
    }

    pub(crate) async fn lock(&self, resource: &str) -> OwnedMutexGuard<()> {
        self.locks.lock(&self.scope, resource).await
    }

    /// File content, or `None` if it does not exist.
    pub(crate) async fn read_optional(&self, path: &Path) -> Result<Option<String>> {
        match self.fs.read_to_string(path).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Write `content` unless the file already holds exactly that.
    /// Returns true if the file changed.
    pub(crate) async fn write_if_changed(&self, path: &Path, content: &str) -> Result<bool> {
        if self.read_optional(path).await?.as_deref() == Some(content) {
            return Ok(false);
        }
        if let Some(parent) = path.parent() {
            self.fs.create_dir_all(parent).await?;
        }
        self.fs.write_atomic(path, content).await?;
        Ok(true)
    }

    /// First free `<file>.<YYYYmmdd-HHMMSS>.bak` path next to `path`.
    pub(crate) async fn next_backup_path(&self, path: &Path) -> Result<PathBuf> {
        let stamp = Local::now().format("%Y%m%d-%H%M%S").to_string();
        let base = path.display().to_string();
        let mut candidate = PathBuf::from(format!("{}.{}.bak", base, stamp));
        let mut n = 1;
        while self.fs.exists(&candidate).await? {
            candidate = PathBuf::from(format!("{}.{}-{}.bak", base, stamp, n));
            n += 1;
        }
        Ok(candidate)
    }

    /// Byte copy of `path` to a fresh backup file; returns the backup path.
    pub(crate) async fn backup(&self, path: &Path) -> Result<PathBuf> {
        let backup = self.next_backup_path(path).await?;
        self.fs.copy(path, &backup).await?;
        info!("Backed up {} to {}", path.display(), backup.display());
        Ok(backup)
    }

    // =========================================================================
    // Jails
    // =========================================================================

    /// Effective per-jail config: `.local`, then `.conf`, then a skeleton.
    pub async fn get_jail_config(&self, name: &str) -> Result<String> {
        validate_jail_name(name)?;
        for ext in ["local", "conf"] {
            if let Some(content) = self.read_optional(&self.layout.jail_file(name, ext)).await? {
                return Ok(content);
            }
        }
        Ok(jail_skeleton(name))
    }

    /// Replace the jail's `.local` file with `content`, header-normalized.
    pub async fn set_jail_config(&self, name: &str, content: &str) -> Result<()> {
        validate_jail_name(name)?;
        let _guard = self.lock(&jail_resource(name)).await;

        let normalized = normalize_jail_header(name, content);
        let path = self.layout.jail_file(name, "local");
        self.fs.create_dir_all(&self.layout.jail_d()).await?;
        self.fs.write_atomic(&path, &normalized).await?;
        info!("Wrote {}", path.display());
        Ok(())
    }

    /// Make sure `jail.d/<name>.local` exists, seeding it from `.conf` or a
    /// skeleton, and return its content. Caller holds the jail lock.
    async fn ensure_jail_local(&self, name: &str) -> Result<String> {
        let local = self.layout.jail_file(name, "local");
        if let Some(content) = self.read_optional(&local).await? {
            return Ok(content);
        }
        let seed = match self.read_optional(&self.layout.jail_file(name, "conf")).await? {
            Some(conf) => conf,
            None => jail_skeleton(name),
        };
        self.fs.create_dir_all(&self.layout.jail_d()).await?;
        self.fs.write_atomic(&local, &seed).await?;
        debug!("Created {}", local.display());
        Ok(seed)
    }

    /// Set `enabled` for each jail, in name order.
    ///
    /// Every name is validated before the first file is touched. An I/O
    /// error part way through stops the batch; jails before it stay updated.
    pub async fn update_jail_enabled_states(&self, states: &BTreeMap<String, bool>) -> Result<()> {
        for name in states.keys() {
            validate_jail_name(name)?;
        }
        for (name, enabled) in states {
            let _guard = self.lock(&jail_resource(name)).await;

            let content = self.ensure_jail_local(name).await?;
            let updated = set_jail_enabled(&content, name, *enabled);
            if updated != content {
                self.fs
                    .write_atomic(&self.layout.jail_file(name, "local"), &updated)
                    .await?;
            }
            info!("Jail {} enabled = {}", name, enabled);
        }
        Ok(())
    }

    /// Create `jail.d/<name>.local`. Refuses to touch an existing jail.
    pub async fn create_jail(&self, name: &str, content: &str) -> Result<()> {
        validate_jail_name(name)?;
        let _guard = self.lock(&jail_resource(name)).await;

        for ext in ["local", "conf"] {
            if self.fs.exists(&self.layout.jail_file(name, ext)).await? {
                return Err(JailctlError::validation(format!(
                    "Jail '{}' already exists",
                    name
                )));
            }
        }

        let body = if content.trim().is_empty() {
            format!("[{}]\nenabled = false\n", name)
        } else {
            normalize_jail_header(name, content)
        };
        let file = with_marker(&body);

        self.fs.create_dir_all(&self.layout.jail_d()).await?;
        self.fs
            .write_atomic(&self.layout.jail_file(name, "local"), &file)
            .await?;
        info!("Created jail {}", name);
        Ok(())
    }

    /// Remove the jail's `.local` and `.conf` from `jail.d/`.
    pub async fn delete_jail(&self, name: &str) -> Result<()> {
        validate_jail_name(name)?;
        let _guard = self.lock(&jail_resource(name)).await;

        let mut removed = false;
        for ext in ["local", "conf"] {
            let path = self.layout.jail_file(name, ext);
            if self.fs.exists(&path).await? {
                self.fs.remove_file(&path).await?;
                removed = true;
            }
        }
        if !removed {
            return Err(JailctlError::not_found(format!("jail '{}'", name)));
        }
        info!("Deleted jail {}", name);
        Ok(())
    }

    /// Every jail section defined under `jail.d/`, sorted by name.
    ///
    /// `.conf` files are read before `.local` files, so a `.local`
    /// definition of the same jail wins.
    pub async fn discover_jails_from_files(&self) -> Result<Vec<JailSection>> {
        let files = self.fs.list_dir(&self.layout.jail_d()).await?;
        let mut jails: BTreeMap<String, bool> = BTreeMap::new();

        for ext in [".conf", ".local"] {
            for file in files.iter().filter(|f| f.ends_with(ext)) {
                let path = self.layout.jail_d().join(file);
                let Some(content) = self.read_optional(&path).await? else {
                    continue;
                };
                for section in parse_jail_sections(&content) {
                    jails.insert(section.name, section.enabled);
                }
            }
        }

        Ok(jails
            .into_iter()
            .map(|(name, enabled)| JailSection { name, enabled })
            .collect())
    }

    // =========================================================================
    // Filters
    // =========================================================================

    pub async fn get_filter_config(&self, name: &str) -> Result<String> {
        validate_filter_name(name)?;
        for ext in ["local", "conf"] {
            if let Some(content) = self.read_optional(&self.layout.filter_file(name, ext)).await? {
                return Ok(content);
            }
        }
        Err(JailctlError::not_found(format!("filter '{}'", name)))
    }

    /// Write `filter.d/<name>.local`.
    pub async fn set_filter_config(&self, name: &str, content: &str) -> Result<()> {
        validate_filter_name(name)?;
        let _guard = self.lock(&filter_resource(name)).await;

        self.fs.create_dir_all(&self.layout.filter_d()).await?;
        self.fs
            .write_atomic(&self.layout.filter_file(name, "local"), &ensure_newline(content))
            .await?;
        info!("Wrote filter {}", name);
        Ok(())
    }

    pub async fn create_filter(&self, name: &str, content: &str) -> Result<()> {
        validate_filter_name(name)?;
        let _guard = self.lock(&filter_resource(name)).await;

        for ext in ["local", "conf"] {
            if self.fs.exists(&self.layout.filter_file(name, ext)).await? {
                return Err(JailctlError::validation(format!(
                    "Filter '{}' already exists",
                    name
                )));
            }
        }
        self.fs.create_dir_all(&self.layout.filter_d()).await?;
        self.fs
            .write_atomic(&self.layout.filter_file(name, "local"), &with_marker(content))
            .await?;
        info!("Created filter {}", name);
        Ok(())
    }

    /// Remove the filter's `.local` and, if jailctl created it, its `.conf`.
    /// Stock `.conf` files shipped with fail2ban are never deleted.
    pub async fn delete_filter(&self, name: &str) -> Result<()> {
        validate_filter_name(name)?;
        let _guard = self.lock(&filter_resource(name)).await;

        let local = self.layout.filter_file(name, "local");
        let conf = self.layout.filter_file(name, "conf");
        let mut removed = false;

        if self.fs.exists(&local).await? {
            self.fs.remove_file(&local).await?;
            removed = true;
        }
        if let Some(content) = self.read_optional(&conf).await? {
            if marker_version(&content).is_some() {
                self.fs.remove_file(&conf).await?;
                removed = true;
            } else if !removed {
                return Err(JailctlError::validation(format!(
                    "Filter '{}' is shipped with fail2ban and cannot be deleted",
                    name
                )));
            }
        }
        if !removed {
            return Err(JailctlError::not_found(format!("filter '{}'", name)));
        }
        info!("Deleted filter {}", name);
        Ok(())
    }

    /// Unique filter names under `filter.d/`, sorted.
    pub async fn get_filters(&self) -> Result<Vec<String>> {
        let files = self.fs.list_dir(&self.layout.filter_d()).await?;
        let names: BTreeSet<String> = files
            .iter()
            .filter_map(|f| f.strip_suffix(".conf").or_else(|| f.strip_suffix(".local")))
            .map(String::from)
            .collect();
        Ok(names.into_iter().collect())
    }

    /// Path to hand to `fail2ban-regex`. The `.conf` is preferred because
    /// fail2ban-regex reads the sibling `.local` on its own.
    pub async fn filter_path(&self, name: &str) -> Result<PathBuf> {
        validate_filter_name(name)?;
        for ext in ["conf", "local"] {
            let path = self.layout.filter_file(name, ext);
            if self.fs.exists(&path).await? {
                return Ok(path);
            }
        }
        Err(JailctlError::not_found(format!("filter '{}'", name)))
    }

    // =========================================================================
    // jail.local
    // =========================================================================

    pub async fn check_jail_local_integrity(&self) -> Result<JailLocalIntegrity> {
        let Some(content) = self.read_optional(&self.layout.jail_local()).await? else {
            return Ok(JailLocalIntegrity::default());
        };
        let version = marker_version(&content);
        Ok(JailLocalIntegrity {
            exists: true,
            managed: version.is_some(),
            marker_version: version,
            has_default_section: has_section(&content, "DEFAULT"),
            legacy_jail_sections: parse_jail_sections(&content)
                .into_iter()
                .map(|s| s.name)
                .collect(),
        })
    }

    /// Create a managed `jail.local`, or adopt an existing unmanaged one.
    ///
    /// Adoption backs the file up, prepends the marker and adds a
    /// `[DEFAULT]` section if missing. No existing line is removed.
    pub async fn ensure_jail_local_structure(&self) -> Result<StructureOutcome> {
        let _guard = self.lock(JAIL_LOCAL_RESOURCE).await;
        let path = self.layout.jail_local();

        let Some(content) = self.read_optional(&path).await? else {
            self.fs.create_dir_all(self.layout.root()).await?;
            self.fs
                .write_atomic(&path, &format!("{}\n[DEFAULT]\n", managed_marker()))
                .await?;
            info!("Created {}", path.display());
            return Ok(StructureOutcome::Created);
        };

        if marker_version(&content).is_some() {
            if !has_section(&content, "DEFAULT") {
                let updated = format!("{}\n[DEFAULT]\n", content.trim_end_matches('\n'));
                self.fs.write_atomic(&path, &updated).await?;
            }
            return Ok(StructureOutcome::AlreadyManaged);
        }

        let backup = self.backup(&path).await?;
        let mut adopted = managed_marker();
        adopted.push('\n');
        if !has_section(&content, "DEFAULT") {
            adopted.push_str("[DEFAULT]\n\n");
        }
        adopted.push_str(&ensure_newline(&content));
        self.fs.write_atomic(&path, &adopted).await?;
        info!("Adopted unmanaged {}", path.display());

        Ok(StructureOutcome::Adopted {
            backup: backup.display().to_string(),
        })
    }

    /// Apply `settings` to `[DEFAULT]` in `jail.local`. Nothing is written
    /// if any value is invalid.
    pub async fn update_default_settings(&self, settings: &DefaultSettings) -> Result<()> {
        settings.validate()?;
        let entries = settings.entries();
        if entries.is_empty() {
            return Ok(());
        }

        let _guard = self.lock(JAIL_LOCAL_RESOURCE).await;
        let path = self.layout.jail_local();
        let original = self
            .read_optional(&path)
            .await?
            .unwrap_or_else(|| format!("{}\n[DEFAULT]\n", managed_marker()));

        let updated = entries
            .iter()
            .fold(original.clone(), |content, (key, value)| {
                set_key_in_section(&content, "DEFAULT", key, value)
            });

        if updated != original {
            self.fs.create_dir_all(self.layout.root()).await?;
            self.fs.write_atomic(&path, &updated).await?;
            info!("Updated {} default setting(s)", entries.len());
        }
        Ok(())
    }

    /// Write the callback action file; true if it changed.
    pub async fn write_action_file(&self, file_name: &str, content: &str) -> Result<bool> {
        let _guard = self.lock(&format!("action:{}", file_name)).await;
        self.write_if_changed(&self.layout.action_d().join(file_name), content)
            .await
    }

    // =========================================================================
    // Log paths
    // =========================================================================

    /// Resolve `%(var)s` references in `logpath` and glob every pattern.
    ///
    /// `logpath` is either a raw value (one or more whitespace separated
    /// patterns) or a whole jail config, in which case its `logpath` key is
    /// used.
    pub async fn test_logpath_with_resolution(&self, logpath: &str) -> Result<Vec<LogpathTest>> {
        let raw = if logpath.contains('[') && logpath.contains("logpath") {
            extract_logpath_from_jail_config(logpath)
        } else {
            logpath.to_string()
        };
        let patterns: Vec<&str> = raw.split_whitespace().collect();
        if patterns.is_empty() {
            return Err(JailctlError::validation("No log path given"));
        }

        let vars = self.load_variables().await?;
        let mut results = Vec::with_capacity(patterns.len());

        for pattern in patterns {
            let resolved = interpolate(pattern, &vars);
            if resolved.contains("%(") {
                return Err(JailctlError::validation(format!(
                    "Log path '{}' references an undefined variable",
                    pattern
                )));
            }
            // Variables may expand to several paths
            for part in resolved.split_whitespace() {
                validate_log_pattern(part)?;
                let files = self.fs.glob(part).await?;
                results.push(LogpathTest {
                    pattern: pattern.to_string(),
                    resolved: part.to_string(),
                    files,
                });
            }
        }
        Ok(results)
    }

    /// Variables visible to a jail: the include chain of `jail.conf`, its
    /// `[DEFAULT]`, then the include chain and `[DEFAULT]` of `jail.local`.
    async fn load_variables(&self) -> Result<HashMap<String, String>> {
        let mut vars = HashMap::new();
        self.load_file_variables(self.layout.jail_conf(), &mut vars, 0)
            .await?;
        self.load_file_variables(self.layout.jail_local(), &mut vars, 0)
            .await?;
        Ok(vars)
    }

    fn load_file_variables<'a>(
        &'a self,
        path: PathBuf,
        vars: &'a mut HashMap<String, String>,
        depth: usize,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            if depth > MAX_INCLUDE_DEPTH {
                debug!("Include depth exceeded at {}", path.display());
                return Ok(());
            }
            let Some(content) = self.read_optional(&path).await? else {
                return Ok(());
            };
            let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
            let includes = section_values(&content, "INCLUDES");

            for include in include_files(&includes, "before") {
                self.load_file_variables(dir.join(include), vars, depth + 1)
                    .await?;
            }
            for (key, value) in section_values(&content, "DEFAULT") {
                vars.insert(key, value);
            }
            for include in include_files(&includes, "after") {
                self.load_file_variables(dir.join(include), vars, depth + 1)
                    .await?;
            }
            Ok(())
        })
    }
}

fn jail_resource(name: &str) -> String {
    format!("jail:{}", name)
}

fn filter_resource(name: &str) -> String {
    format!("filter:{}", name)
}

fn ensure_newline(content: &str) -> String {
    if content.ends_with('\n') {
        content.to_string()
    } else {
        format!("{}\n", content)
    }
}

/// Prepend the managed marker unless a marker is already present.
fn with_marker(content: &str) -> String {
    if marker_version(content).is_some() {
        ensure_newline(content)
    } else {
        format!("{}\n{}", managed_marker(), ensure_newline(content))
    }
}

/// Relative include file names listed under `key`. Absolute paths and
/// parent references are ignored.
fn include_files(includes: &[(String, String)], key: &str) -> Vec<String> {
    includes
        .iter()
        .filter(|(k, _)| k == key)
        .flat_map(|(_, v)| v.split_whitespace().map(String::from).collect::<Vec<_>>())
        .filter(|f| !f.starts_with('/') && !f.contains(".."))
        .collect()
}

/// Substitute `%(name)s` references from `vars`, repeatedly, up to a fixed
/// depth. Unknown references are left in place.
///
/// # Examples
/// ```
/// use std::collections::HashMap;
/// use jailctl::config_engine::interpolate;
///
/// let mut vars = HashMap::new();
/// vars.insert("logdir".to_string(), "/var/log".to_string());
/// vars.insert("auth".to_string(), "%(logdir)s/auth.log".to_string());
/// assert_eq!(interpolate("%(auth)s", &vars), "/var/log/auth.log");
/// assert_eq!(interpolate("%(missing)s", &vars), "%(missing)s");
/// ```
pub fn interpolate(value: &str, vars: &HashMap<String, String>) -> String {
    let mut current = value.to_string();
    for _ in 0..MAX_INTERPOLATION_DEPTH {
        let next = substitute_once(&current, vars);
        if next == current {
            break;
        }
        current = next;
    }
    current
}

fn substitute_once(value: &str, vars: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find("%(") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find(")s") {
            Some(end) => {
                let name = &after[..end];
                match vars.get(name) {
                    Some(v) => out.push_str(v),
                    None => out.push_str(&rest[start..start + 2 + end + 2]),
                }
                rest = &after[end + 2..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}
