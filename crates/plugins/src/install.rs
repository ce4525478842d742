//! Install pipeline: download, extract, mark, swap into place, mirror.

use std::{path::PathBuf, sync::Arc};

use {serde::Serialize, tracing::info};

use crate::{
    archive,
    error::{Error, Result},
    fetch::TarballFetcher,
    registry::Resolved,
    store::{self, CacheMirror, PluginStore, validate_segment},
};

/// Name of the downloaded archive inside the staging directory.
const DOWNLOAD_FILE: &str = "download.tar.gz";
const EXTRACT_DIR: &str = "extract";

/// A plugin as it sits on disk after a successful install.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstalledPlugin {
    pub name: String,
    pub version: String,
    pub install_path: PathBuf,
    pub cache_path: PathBuf,
}

pub struct Installer {
    store: PluginStore,
    cache: CacheMirror,
    fetcher: Arc<dyn TarballFetcher>,
}

impl Installer {
    pub fn new(store: PluginStore, cache: CacheMirror, fetcher: Arc<dyn TarballFetcher>) -> Self {
        Self {
            store,
            cache,
            fetcher,
        }
    }

    /// Replace-install a resolved plugin version.
    ///
    /// Everything up to the final rename happens in a staging directory that
    /// is removed when this returns or its future is dropped. The previous
    /// install stays in place until the new tree is complete.
    pub async fn install(&self, resolved: &Resolved) -> Result<InstalledPlugin> {
        validate_segment("plugin name", &resolved.name)?;
        validate_segment("version", &resolved.version)?;

        let staging = self.store.staging()?;
        let download = staging.path().join(DOWNLOAD_FILE);
        let bytes = self.fetcher.fetch(&resolved.tarball, &download).await?;

        let extract_dir = staging.path().join(EXTRACT_DIR);
        let root = tokio::task::spawn_blocking(move || {
            archive::extract_tarball(&download, &extract_dir)
        })
        .await
        .map_err(|e| Error::ExtractFailed(format!("extraction task failed: {e}")))??;

        store::write_marker(&root, &resolved.version)?;
        let install_path = self.store.swap_in(&resolved.name, &root, staging.path())?;

        let cache = self.cache.clone();
        let (source, name, version) = (
            install_path.clone(),
            resolved.name.clone(),
            resolved.version.clone(),
        );
        let cache_path =
            tokio::task::spawn_blocking(move || cache.mirror(&source, &name, &version))
                .await
                .map_err(|e| {
                    Error::fs("cache mirror task failed", std::io::Error::other(e))
                })??;

        info!(
            plugin = %resolved.name,
            version = %resolved.version,
            bytes,
            path = %install_path.display(),
            "installed plugin"
        );

        Ok(InstalledPlugin {
            name: resolved.name.clone(),
            version: resolved.version.clone(),
            install_path,
            cache_path,
        })
    }
}
