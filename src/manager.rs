//! Registry of connectors, keyed by server ID.
//!
//! The map is rebuilt from [`Settings`] as a whole and swapped in under a
//! short write lock. Readers clone the current `Arc` and never observe a
//! partially built registry.

use futures::future::join_all;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, error, info, warn};

use crate::config::{validate_callback_url, ServerType, Settings};
use crate::connector::{create_connector, Connector, LocalConnector};
use crate::error::{JailctlError, Result};
use crate::lock::JailLocks;
use crate::migration::{migration_requested_by_env, LegacyMigration, MigrationReport};

/// One immutable generation of the connector map.
#[derive(Default)]
struct Registry {
    connectors: HashMap<String, Arc<dyn Connector>>,
    default_id: Option<String>,
}

impl Registry {
    fn from_connectors(connectors: Vec<Arc<dyn Connector>>) -> Self {
        let default_id = connectors
            .iter()
            .map(|c| c.server())
            .find(|s| s.enabled && s.is_default)
            .map(|s| s.id.clone());
        Self {
            connectors: connectors
                .into_iter()
                .map(|c| (c.server().id.clone(), c))
                .collect(),
            default_id,
        }
    }
}

/// What happened to one server's callback action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ActionFileStatus {
    Updated,
    Unchanged,
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionFileUpdate {
    pub server_id: String,
    #[serde(flatten)]
    pub status: ActionFileStatus,
}

impl ActionFileUpdate {
    pub fn is_failed(&self) -> bool {
        matches!(self.status, ActionFileStatus::Failed { .. })
    }
}

/// Process-wide owner of all connectors.
pub struct Manager {
    registry: RwLock<Arc<Registry>>,
    locks: Arc<JailLocks>,
    migration: LegacyMigration,
}

impl Default for Manager {
    fn default() -> Self {
        Self::new()
    }
}

impl Manager {
    /// An empty manager; call [`Manager::reload_from_settings`] to populate it.
    pub fn new() -> Self {
        Self {
            registry: RwLock::new(Arc::new(Registry::default())),
            locks: Arc::new(JailLocks::new()),
            migration: LegacyMigration::new(),
        }
    }

    pub async fn from_settings(settings: &Settings) -> Result<Self> {
        let manager = Self::new();
        manager.reload_from_settings(settings).await?;
        Ok(manager)
    }

    fn current(&self) -> Arc<Registry> {
        match self.registry.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    fn swap(&self, next: Registry) {
        let next = Arc::new(next);
        match self.registry.write() {
            Ok(mut guard) => *guard = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
    }

    /// The connector for `id`.
    pub fn connector(&self, id: &str) -> Result<Arc<dyn Connector>> {
        self.current()
            .connectors
            .get(id)
            .cloned()
            .ok_or_else(|| JailctlError::not_found(format!("server '{}'", id)))
    }

    /// The connector of the enabled server flagged as default.
    pub fn default_connector(&self) -> Result<Arc<dyn Connector>> {
        let registry = self.current();
        let id = registry
            .default_id
            .as_deref()
            .ok_or_else(|| JailctlError::not_found("No default server configured"))?;
        registry
            .connectors
            .get(id)
            .cloned()
            .ok_or_else(|| JailctlError::not_found(format!("server '{}'", id)))
    }

    /// The connector for `id`, or the default one.
    pub fn resolve(&self, id: Option<&str>) -> Result<Arc<dyn Connector>> {
        match id {
            Some(id) => self.connector(id),
            None => self.default_connector(),
        }
    }

    /// All connectors, sorted by server ID.
    pub fn connectors(&self) -> Vec<Arc<dyn Connector>> {
        let mut all: Vec<_> = self.current().connectors.values().cloned().collect();
        all.sort_by(|a, b| a.server().id.cmp(&b.server().id));
        all
    }

    pub fn locks(&self) -> &Arc<JailLocks> {
        &self.locks
    }

    /// Report of the legacy migration, if it has run in this process.
    pub fn migration_report(&self) -> Option<&MigrationReport> {
        self.migration.report()
    }

    /// Rebuild every connector from `settings`, then swap the map in.
    ///
    /// Disabled servers get no connector. If any connector fails to build,
    /// the current map stays in place.
    pub async fn reload_from_settings(&self, settings: &Settings) -> Result<()> {
        settings.validate()?;
        let migrate = settings.migrate_legacy_jails || migration_requested_by_env();

        let mut connectors: Vec<Arc<dyn Connector>> = Vec::new();
        let mut locals: Vec<Arc<LocalConnector>> = Vec::new();
        for server in settings.enabled_servers() {
            if server.server_type == ServerType::Local {
                let local = Arc::new(LocalConnector::new(
                    server.clone(),
                    settings,
                    Arc::clone(&self.locks),
                ));
                locals.push(Arc::clone(&local));
                connectors.push(local);
            } else {
                connectors.push(create_connector(server, settings, Arc::clone(&self.locks))?);
            }
        }

        if migrate {
            if let Some(local) = locals.first() {
                match self.migration.run_once(local.engine()).await {
                    Ok(report) if report.is_noop() => debug!("No legacy jails to migrate"),
                    Ok(report) => info!(
                        "Migrated {} legacy jails from jail.local",
                        report.migrated.len()
                    ),
                    // Retried on the next rebuild
                    Err(e) => error!("Legacy jail migration failed: {}", e),
                }
            }
        }

        let count = connectors.len();
        self.swap(Registry::from_connectors(connectors));
        info!("Loaded {} server connectors", count);
        Ok(())
    }

    /// Push the callback action to every ssh and agent server.
    ///
    /// Results are sorted by server ID. Per-server failures are reported,
    /// not returned; an invalid URL fails the whole call.
    pub async fn update_action_files(&self, callback_url: &str) -> Result<Vec<ActionFileUpdate>> {
        validate_callback_url(callback_url)?;
        let remotes: Vec<_> = self
            .connectors()
            .into_iter()
            .filter(|c| c.server().server_type != ServerType::Local)
            .collect();

        Ok(join_all(remotes.iter().map(|c| push_action_file(c.as_ref(), callback_url))).await)
    }

    /// Push the callback action to one ssh or agent server.
    pub async fn update_action_file_for_server(
        &self,
        id: &str,
        callback_url: &str,
    ) -> Result<ActionFileUpdate> {
        validate_callback_url(callback_url)?;
        let connector = self.connector(id)?;
        if connector.server().server_type == ServerType::Local {
            return Err(JailctlError::validation(format!(
                "Server '{}' is local; the callback action is only pushed to remote servers",
                id
            )));
        }
        Ok(push_action_file(connector.as_ref(), callback_url).await)
    }
}

async fn push_action_file(connector: &dyn Connector, callback_url: &str) -> ActionFileUpdate {
    let server_id = connector.server().id.clone();
    let status = match connector.update_action_file(callback_url).await {
        Ok(true) => {
            info!("Updated callback action on {}", server_id);
            ActionFileStatus::Updated
        }
        Ok(false) => ActionFileStatus::Unchanged,
        Err(e) => {
            warn!("Could not update callback action on {}: {}", server_id, e);
            ActionFileStatus::Failed {
                error: e.to_string(),
            }
        }
    };
    ActionFileUpdate { server_id, status }
}
