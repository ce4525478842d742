//! Command dispatcher: install, update, sync and list against one registry.

use std::{fs::File, sync::Arc, time::Duration};

use {
    bazaar_config::{BazaarConfig, SyncPolicy},
    serde::Serialize,
    tracing::{debug, info, warn},
};

use crate::{
    error::{Error, Result},
    fetch::{HttpFetcher, TarballFetcher},
    host_registry::{HostRegistry, HostRegistryUpdate},
    install::{InstalledPlugin, Installer},
    registry::{Registry, Resolved},
    store::{CacheMirror, InstalledEntry, PluginStore, validate_segment},
};

/// Outcome of a single install.
#[derive(Debug, Clone)]
pub struct InstallReport {
    pub plugin: InstalledPlugin,
    /// `None` when no host registry is configured.
    pub host: Option<HostRegistryUpdate>,
}

#[derive(Debug, Clone)]
pub enum UpdateOutcome {
    AlreadyCurrent {
        name: String,
        version: String,
    },
    Updated {
        /// Marker value before the update, `unknown` if there was none.
        previous: String,
        report: InstallReport,
    },
}

#[derive(Debug)]
pub struct SyncFailure {
    pub name: String,
    pub error: Error,
}

#[derive(Debug, Default)]
pub struct SyncReport {
    pub updated: Vec<InstallReport>,
    pub current: Vec<String>,
    pub failed: Vec<SyncFailure>,
}

impl SyncReport {
    pub fn installs(&self) -> usize {
        self.updated.len()
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AvailablePlugin {
    pub name: String,
    pub latest: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Listing {
    pub available: Vec<AvailablePlugin>,
    pub installed: Vec<InstalledEntry>,
}

/// One marketplace: a registry, a plugin store, a cache mirror and
/// optionally a host registry, all taken from configuration.
pub struct Marketplace {
    config: BazaarConfig,
    store: PluginStore,
    installer: Installer,
    host: Option<HostRegistry>,
}

impl Marketplace {
    /// Marketplace downloading over HTTP(S) and `file://`.
    pub fn new(config: BazaarConfig) -> Result<Self> {
        let timeout = config.install.download_timeout_secs.map(Duration::from_secs);
        let fetcher = HttpFetcher::new(timeout)?;
        Self::with_fetcher(config, Arc::new(fetcher))
    }

    pub fn with_fetcher(config: BazaarConfig, fetcher: Arc<dyn TarballFetcher>) -> Result<Self> {
        let cache_dir = config.paths.cache_dir.clone().ok_or_else(|| {
            Error::MissingDependency("no cache directory configured".into())
        })?;
        let store = PluginStore::new(&config.paths.plugins_dir);
        let cache = CacheMirror::new(cache_dir, &config.marketplace.name);
        let host = config
            .host
            .registry
            .as_ref()
            .map(|path| HostRegistry::new(path, &config.marketplace.name, &config.host.scope));

        Ok(Self {
            installer: Installer::new(store.clone(), cache, fetcher),
            store,
            host,
            config,
        })
    }

    pub fn config(&self) -> &BazaarConfig {
        &self.config
    }

    pub fn store(&self) -> &PluginStore {
        &self.store
    }

    pub fn registry(&self) -> Result<Registry> {
        Registry::load(&self.config.marketplace.registry)
    }

    /// Install `name` at `version`, or at the registry's latest.
    pub async fn install(&self, name: &str, version: Option<&str>) -> Result<InstallReport> {
        let resolved = self.registry()?.resolve(name, version)?;
        validate_resolved(&resolved)?;

        let mut lock = self.lock_file()?;
        let _guard = self.acquire(lock.as_mut())?;
        self.install_resolved(&resolved).await
    }

    /// Bring `name` to the registry's latest version if it is not already.
    pub async fn update(&self, name: &str) -> Result<UpdateOutcome> {
        let registry = self.registry()?;
        let resolved = registry.resolve(name, None)?;
        validate_resolved(&resolved)?;

        if let Some(current) = self.current(&resolved) {
            return Ok(current);
        }

        // `update_locked` repeats the check under the lock.
        let mut lock = self.lock_file()?;
        let _guard = self.acquire(lock.as_mut())?;
        self.update_locked(&registry, name).await
    }

    /// Update every registry plugin in order using the configured policy.
    pub async fn sync(&self) -> Result<SyncReport> {
        self.sync_with(self.config.sync.on_error).await
    }

    pub async fn sync_with(&self, policy: SyncPolicy) -> Result<SyncReport> {
        let registry = self.registry()?;
        let mut lock = self.lock_file()?;
        let _guard = self.acquire(lock.as_mut())?;

        let mut report = SyncReport::default();
        for name in registry.names() {
            match self.update_locked(&registry, name).await {
                Ok(UpdateOutcome::AlreadyCurrent { name, .. }) => report.current.push(name),
                Ok(UpdateOutcome::Updated { report: install, .. }) => report.updated.push(install),
                Err(error) => match policy {
                    SyncPolicy::FailFast => return Err(error),
                    SyncPolicy::Continue => {
                        warn!(plugin = %name, error = %error, "sync failed for plugin, continuing");
                        report.failed.push(SyncFailure {
                            name: name.to_string(),
                            error,
                        });
                    },
                },
            }
        }

        info!(
            updated = report.updated.len(),
            current = report.current.len(),
            failed = report.failed.len(),
            "sync finished"
        );
        Ok(report)
    }

    /// Registry contents and what is installed. Read-only.
    pub fn list(&self) -> Result<Listing> {
        list(&self.config)
    }

    async fn update_locked(&self, registry: &Registry, name: &str) -> Result<UpdateOutcome> {
        let resolved = registry.resolve(name, None)?;
        validate_resolved(&resolved)?;

        if let Some(current) = self.current(&resolved) {
            return Ok(current);
        }

        let current = self.store.installed_version(name);
        info!(plugin = %name, from = %current, to = %resolved.version, "updating plugin");
        let report = self.install_resolved(&resolved).await?;
        Ok(UpdateOutcome::Updated {
            previous: current,
            report,
        })
    }

    /// `AlreadyCurrent` when the store marker matches the resolved version.
    fn current(&self, resolved: &Resolved) -> Option<UpdateOutcome> {
        let installed = self.store.installed_version(&resolved.name);
        if installed != resolved.version {
            return None;
        }
        debug!(plugin = %resolved.name, version = %installed, "already current");
        Some(UpdateOutcome::AlreadyCurrent {
            name: resolved.name.clone(),
            version: installed,
        })
    }

    async fn install_resolved(&self, resolved: &Resolved) -> Result<InstallReport> {
        let plugin = self.installer.install(resolved).await?;
        let host = match &self.host {
            Some(host) => Some(host.update(&plugin.name, &plugin.version, &plugin.cache_path)?),
            None => None,
        };
        Ok(InstallReport { plugin, host })
    }

    fn lock_file(&self) -> Result<Option<fd_lock::RwLock<File>>> {
        if !self.config.install.lock {
            return Ok(None);
        }
        self.store.lock_file().map(Some)
    }

    fn acquire<'a>(
        &self,
        lock: Option<&'a mut fd_lock::RwLock<File>>,
    ) -> Result<Option<fd_lock::RwLockWriteGuard<'a, File>>> {
        let guard = lock.map(|lock| self.store.try_lock(lock)).transpose()?;
        if guard.is_some() {
            let removed = self.store.sweep_staging()?;
            if removed > 0 {
                debug!(removed, "removed leftover staging directories");
            }
        }
        Ok(guard)
    }
}

/// Registry contents and what is installed, without building a
/// [`Marketplace`]. Needs neither a cache dir nor an HTTP client.
pub fn list(config: &BazaarConfig) -> Result<Listing> {
    let registry = Registry::load(&config.marketplace.registry)?;
    let available = registry
        .plugins
        .iter()
        .map(|(name, entry)| AvailablePlugin {
            name: name.clone(),
            latest: entry.latest.clone(),
            description: entry.description.clone(),
        })
        .collect();

    Ok(Listing {
        available,
        installed: PluginStore::new(&config.paths.plugins_dir).installed()?,
    })
}

fn validate_resolved(resolved: &Resolved) -> Result<()> {
    validate_segment("plugin name", &resolved.name)?;
    validate_segment("version", &resolved.version)
}
