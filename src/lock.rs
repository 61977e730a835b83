//! Locking for config mutations.
//!
//! Two layers:
//! - [`JailLocks`] serializes edits to the same `(server, resource)` pair
//!   inside one process, so two requests editing `sshd` on `web1` cannot
//!   interleave their read-modify-write cycles.
//! - [`LockGuard`] is an flock-style advisory lock that keeps two jailctl
//!   processes from mutating configuration at the same time.

use anyhow::{Context, Result};
use fs2::FileExt;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::OwnedMutexGuard;

type Key = (String, String);

/// Registry of per-(server, resource) async mutexes.
#[derive(Debug, Default)]
pub struct JailLocks {
    inner: Mutex<HashMap<Key, Arc<tokio::sync::Mutex<()>>>>,
}

impl JailLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `resource` on `server`.
    ///
    /// The guard releases the lock when dropped. Entries nobody holds or
    /// waits on are pruned on every call.
    pub async fn lock(&self, server: &str, resource: &str) -> OwnedMutexGuard<()> {
        let mutex = {
            let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            map.retain(|_, m| Arc::strong_count(m) > 1);
            map.entry((server.to_string(), resource.to_string()))
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        mutex.lock_owned().await
    }

    /// Number of live lock entries.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A guard that holds an exclusive lock on the jailctl lock file.
/// The lock is automatically released when the guard is dropped.
pub struct LockGuard {
    _file: File,
    path: PathBuf,
}

impl LockGuard {
    /// Attempt to acquire an exclusive lock on `lock_path`.
    /// Returns an error if another instance is already holding it.
    ///
    /// Uses OpenOptions with create+read+write to avoid TOCTOU race
    /// between file creation and lock acquisition.
    pub fn acquire(lock_path: &Path) -> Result<Self> {
        if let Some(parent) = lock_path.parent() {
            fs::create_dir_all(parent).ok();
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(lock_path)
            .with_context(|| format!("Failed to open lock file: {}", lock_path.display()))?;

        fs::set_permissions(lock_path, fs::Permissions::from_mode(0o600))
            .context("Failed to set lock file permissions")?;

        file.try_lock_exclusive().map_err(|_| {
            anyhow::anyhow!(
                "Another jailctl instance is modifying configuration.\n\
                 If you believe this is an error, remove the lock file: {}",
                lock_path.display()
            )
        })?;

        Ok(Self {
            _file: file,
            path: lock_path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

// Lock is automatically released when file is closed (on drop)
