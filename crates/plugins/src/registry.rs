//! Registry Store: the JSON manifest of installable plugins.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use {
    serde::{Deserialize, Serialize},
    tracing::debug,
};

use crate::error::{Error, Result};

/// Parsed registry document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Registry {
    #[serde(default)]
    pub plugins: BTreeMap<String, PluginEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginEntry {
    pub latest: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub versions: BTreeMap<String, VersionEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionEntry {
    pub tarball: String,
}

/// Concrete version picked for an install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub name: String,
    pub version: String,
    pub tarball: String,
}

impl Registry {
    /// Read and parse the registry at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| Error::Registry {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let registry = Self::from_json(&raw).map_err(|e| match e {
            Error::Registry { reason, .. } => Error::Registry {
                path: path.to_path_buf(),
                reason,
            },
            other => other,
        })?;
        debug!(path = %path.display(), plugins = registry.plugins.len(), "loaded registry");
        Ok(registry)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| Error::Registry {
            path: PathBuf::new(),
            reason: e.to_string(),
        })
    }

    pub fn get(&self, name: &str) -> Option<&PluginEntry> {
        self.plugins.get(name)
    }

    /// Plugin names in iteration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.plugins.keys().map(String::as_str)
    }

    /// Resolve `name` and an optional explicit version to a tarball URL.
    ///
    /// Without a version the entry's `latest` is used. Pure lookup.
    pub fn resolve(&self, name: &str, version: Option<&str>) -> Result<Resolved> {
        let entry = self.get(name).ok_or_else(|| Error::PluginNotFound {
            name: name.to_string(),
        })?;
        let version = version.unwrap_or(&entry.latest);
        let found = entry
            .versions
            .get(version)
            .ok_or_else(|| Error::VersionNotFound {
                name: name.to_string(),
                version: version.to_string(),
            })?;

        Ok(Resolved {
            name: name.to_string(),
            version: version.to_string(),
            tarball: found.tarball.clone(),
        })
    }
}
