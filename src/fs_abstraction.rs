//! Filesystem abstraction layer for testability and remote hosts.
//!
//! The config engine only ever talks to a [`FileSystem`]. Two production
//! implementations exist:
//! - [`RealFileSystem`] for the machine jailctl runs on (tokio + tempfile)
//! - [`ShellFileSystem`] for anything reachable through a [`Transport`],
//!   i.e. SSH hosts, using small POSIX shell scripts
//!
//! Writes are always atomic: content goes to a sibling temp file which is
//! then renamed over the target.

use async_trait::async_trait;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cmd_abstraction::{run_script, Transport};
use crate::error::{JailctlError, Result};

#[cfg(test)]
use mockall::automock;

/// Mode for files written by jailctl (fail2ban runs as root but tooling
/// like `fail2ban-regex` is often run by operators)
pub const CONFIG_FILE_MODE: u32 = 0o644;

/// Exit code used by the shell scripts to signal a missing path
const MISSING_EXIT_CODE: i32 = 44;

/// Trait abstracting filesystem operations for dependency injection.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Read file contents as a string. Missing files yield `NotFound`.
    async fn read_to_string(&self, path: &Path) -> Result<String>;

    /// Replace `path` atomically with `contents`.
    async fn write_atomic(&self, path: &Path, contents: &str) -> Result<()>;

    /// Check if a path exists.
    async fn exists(&self, path: &Path) -> Result<bool>;

    /// Create a directory and all parent directories.
    async fn create_dir_all(&self, path: &Path) -> Result<()>;

    /// Byte-for-byte copy of a file.
    async fn copy(&self, from: &Path, to: &Path) -> Result<()>;

    /// Remove a file. Missing files yield `NotFound`.
    async fn remove_file(&self, path: &Path) -> Result<()>;

    /// Names of the regular files directly inside `dir`, sorted. A missing
    /// directory is an empty listing.
    async fn list_dir(&self, dir: &Path) -> Result<Vec<String>>;

    /// Existing paths matching a shell glob pattern, sorted.
    async fn glob(&self, pattern: &str) -> Result<Vec<String>>;
}

fn display(path: &Path) -> String {
    path.display().to_string()
}

/// Real filesystem implementation for the local host.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealFileSystem;

fn write_atomic_blocking(path: &Path, contents: &str) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    use tempfile::NamedTempFile;

    let parent_dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp_file = NamedTempFile::new_in(parent_dir)?;

    temp_file.write_all(contents.as_bytes())?;
    temp_file.as_file().sync_all()?;
    std::fs::set_permissions(
        temp_file.path(),
        std::fs::Permissions::from_mode(CONFIG_FILE_MODE),
    )?;

    temp_file.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[async_trait]
impl FileSystem for RealFileSystem {
    async fn read_to_string(&self, path: &Path) -> Result<String> {
        tokio::fs::read_to_string(path)
            .await
            .map_err(|e| JailctlError::io(display(path), e))
    }

    async fn write_atomic(&self, path: &Path, contents: &str) -> Result<()> {
        let target = path.to_path_buf();
        let data = contents.to_string();
        tokio::task::spawn_blocking(move || write_atomic_blocking(&target, &data))
            .await
            .map_err(|e| JailctlError::transport(display(path), e.to_string()))?
            .map_err(|e| JailctlError::io(display(path), e))
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        tokio::fs::try_exists(path)
            .await
            .map_err(|e| JailctlError::io(display(path), e))
    }

    async fn create_dir_all(&self, path: &Path) -> Result<()> {
        tokio::fs::create_dir_all(path)
            .await
            .map_err(|e| JailctlError::io(display(path), e))
    }

    async fn copy(&self, from: &Path, to: &Path) -> Result<()> {
        tokio::fs::copy(from, to)
            .await
            .map(|_| ())
            .map_err(|e| JailctlError::io(display(from), e))
    }

    async fn remove_file(&self, path: &Path) -> Result<()> {
        tokio::fs::remove_file(path)
            .await
            .map_err(|e| JailctlError::io(display(path), e))
    }

    async fn list_dir(&self, dir: &Path) -> Result<Vec<String>> {
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(JailctlError::io(display(dir), e)),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| JailctlError::io(display(dir), e))?
        {
            let is_file = entry
                .file_type()
                .await
                .map(|t| t.is_file())
                .unwrap_or(false);
            if is_file {
                names.push(entry.file_name().to_string_lossy().to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    async fn glob(&self, pattern: &str) -> Result<Vec<String>> {
        let owned = pattern.to_string();
        let matches = tokio::task::spawn_blocking(move || -> Result<Vec<String>> {
            let paths = glob::glob(&owned).map_err(|e| {
                JailctlError::validation(format!("Invalid glob pattern '{}': {}", owned, e))
            })?;
            let mut found: Vec<String> = paths
                .filter_map(|p| p.ok())
                .map(|p: PathBuf| p.display().to_string())
                .collect();
            found.sort();
            Ok(found)
        })
        .await
        .map_err(|e| JailctlError::transport(pattern, e.to_string()))??;
        Ok(matches)
    }
}

const READ_SCRIPT: &str = r#"[ -e "$1" ] || exit 44; cat -- "$1""#;
const WRITE_SCRIPT: &str = r#"tmp=$(mktemp "$(dirname -- "$1")/.jailctl.XXXXXX") || exit 1
if cat > "$tmp" && chmod 644 "$tmp" && mv -f -- "$tmp" "$1"; then exit 0; fi
rm -f -- "$tmp"; exit 1"#;
const EXISTS_SCRIPT: &str = r#"[ -e "$1" ]"#;
const MKDIR_SCRIPT: &str = r#"mkdir -p -- "$1""#;
const COPY_SCRIPT: &str = r#"[ -e "$1" ] || exit 44; cp -p -- "$1" "$2""#;
const REMOVE_SCRIPT: &str = r#"[ -e "$1" ] || exit 44; rm -f -- "$1""#;
const LIST_SCRIPT: &str = r#"[ -d "$1" ] || exit 0
for f in "$1"/*; do [ -f "$f" ] && printf '%s\n' "${f##*/}"; done; exit 0"#;
const GLOB_SCRIPT: &str = r#"for f in $1; do [ -e "$f" ] && printf '%s\n' "$f"; done; exit 0"#;

/// Filesystem operations executed as shell scripts over a [`Transport`].
///
/// Paths are always passed as positional parameters, never interpolated
/// into the script text. The one exception is [`FileSystem::glob`], which
/// needs the shell to expand the pattern; callers validate patterns with
/// [`crate::validation::validate_log_pattern`] first.
#[derive(Clone)]
pub struct ShellFileSystem {
    transport: Arc<dyn Transport>,
}

impl ShellFileSystem {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    async fn script(&self, script: &str, params: &[&str], stdin: Option<&str>, path: &Path) -> Result<String> {
        let output = run_script(self.transport.as_ref(), script, params, stdin).await?;
        if output.code == Some(MISSING_EXIT_CODE) {
            return Err(JailctlError::not_found(display(path)));
        }
        output.into_checked(&format!("{} {}", self.transport.label(), display(path)))
    }
}

fn lines(output: &str) -> Vec<String> {
    let mut out: Vec<String> = output
        .lines()
        .map(str::trim_end)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect();
    out.sort();
    out
}

#[async_trait]
impl FileSystem for ShellFileSystem {
    async fn read_to_string(&self, path: &Path) -> Result<String> {
        let p = display(path);
        self.script(READ_SCRIPT, &[&p], None, path).await
    }

    async fn write_atomic(&self, path: &Path, contents: &str) -> Result<()> {
        let p = display(path);
        self.script(WRITE_SCRIPT, &[&p], Some(contents), path)
            .await
            .map(|_| ())
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        let p = display(path);
        let output = run_script(self.transport.as_ref(), EXISTS_SCRIPT, &[&p], None).await?;
        match output.code {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            _ => output
                .into_checked(&format!("{} test -e {}", self.transport.label(), p))
                .map(|_| false),
        }
    }

    async fn create_dir_all(&self, path: &Path) -> Result<()> {
        let p = display(path);
        self.script(MKDIR_SCRIPT, &[&p], None, path).await.map(|_| ())
    }

    async fn copy(&self, from: &Path, to: &Path) -> Result<()> {
        let f = display(from);
        let t = display(to);
        self.script(COPY_SCRIPT, &[&f, &t], None, from).await.map(|_| ())
    }

    async fn remove_file(&self, path: &Path) -> Result<()> {
        let p = display(path);
        self.script(REMOVE_SCRIPT, &[&p], None, path).await.map(|_| ())
    }

    async fn list_dir(&self, dir: &Path) -> Result<Vec<String>> {
        let p = display(dir);
        let output = self.script(LIST_SCRIPT, &[&p], None, dir).await?;
        Ok(lines(&output))
    }

    async fn glob(&self, pattern: &str) -> Result<Vec<String>> {
        let output = self
            .script(GLOB_SCRIPT, &[pattern], None, Path::new(pattern))
            .await?;
        Ok(lines(&output))
    }
}
