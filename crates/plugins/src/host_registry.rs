//! Host Registry Updater: keeps the host application's installed-plugins
//! ledger in step with what this tool installs.
//!
//! The ledger belongs to the host. Only the `<plugin>@<marketplace>` entry is
//! rewritten; every other key is carried through untouched. A missing ledger
//! means the host is not set up, which is a warning rather than a failure.

use std::{
    io::Write,
    path::{Path, PathBuf},
};

use {
    serde::{Deserialize, Serialize},
    serde_json::{Map, Value},
    time::{OffsetDateTime, format_description::well_known::Rfc3339},
    tracing::{info, warn},
};

use crate::error::{Error, Result};

/// One install record in the host ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostRegistryRecord {
    pub scope: String,
    pub install_path: String,
    pub version: String,
    pub installed_at: String,
    pub last_updated: String,
    pub is_local: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostRegistryUpdate {
    /// The ledger file does not exist.
    Skipped { path: PathBuf },
    Updated {
        key: String,
        record: HostRegistryRecord,
    },
}

#[derive(Debug, Clone)]
pub struct HostRegistry {
    path: PathBuf,
    marketplace: String,
    scope: String,
}

impl HostRegistry {
    pub fn new(
        path: impl Into<PathBuf>,
        marketplace: impl Into<String>,
        scope: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            marketplace: marketplace.into(),
            scope: scope.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn key(&self, name: &str) -> String {
        format!("{name}@{}", self.marketplace)
    }

    /// Record `name` at `version` installed under `install_path`, stamped now.
    pub fn update(
        &self,
        name: &str,
        version: &str,
        install_path: &Path,
    ) -> Result<HostRegistryUpdate> {
        self.update_at(name, version, install_path, OffsetDateTime::now_utc())
    }

    /// Same as [`Self::update`] with an explicit clock.
    pub fn update_at(
        &self,
        name: &str,
        version: &str,
        install_path: &Path,
        now: OffsetDateTime,
    ) -> Result<HostRegistryUpdate> {
        if !self.path.exists() {
            warn!(path = %self.path.display(), "host registry not found, skipping");
            return Ok(HostRegistryUpdate::Skipped {
                path: self.path.clone(),
            });
        }

        let mut doc = self.read()?;
        let now = now.format(&Rfc3339).map_err(|e| self.invalid(e))?;
        let key = self.key(name);

        let plugins = doc
            .entry("plugins")
            .or_insert_with(|| Value::Object(Map::new()))
            .as_object_mut()
            .ok_or_else(|| self.invalid("`plugins` is not an object"))?;

        let installed_at = plugins
            .get(&key)
            .and_then(Value::as_array)
            .and_then(|records| records.first())
            .and_then(|record| record.get("installedAt"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| now.clone());

        let record = HostRegistryRecord {
            scope: self.scope.clone(),
            install_path: install_path.to_string_lossy().into_owned(),
            version: version.to_string(),
            installed_at,
            last_updated: now,
            is_local: true,
        };
        let value = serde_json::to_value(&record).map_err(|e| self.invalid(e))?;
        plugins.insert(key.clone(), Value::Array(vec![value]));

        self.write(&doc)?;
        info!(key = %key, version = %version, path = %self.path.display(), "updated host registry");
        Ok(HostRegistryUpdate::Updated { key, record })
    }

    /// The current record for `name`, if the ledger has one.
    pub fn record(&self, name: &str) -> Result<Option<HostRegistryRecord>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let doc = self.read()?;
        let Some(first) = doc
            .get("plugins")
            .and_then(|plugins| plugins.get(self.key(name)))
            .and_then(Value::as_array)
            .and_then(|records| records.first())
        else {
            return Ok(None);
        };
        serde_json::from_value(first.clone())
            .map(Some)
            .map_err(|e| self.invalid(e))
    }

    fn read(&self) -> Result<Map<String, Value>> {
        let raw = std::fs::read_to_string(&self.path)
            .map_err(|e| Error::fs(format!("read {}", self.path.display()), e))?;
        match serde_json::from_str::<Value>(&raw).map_err(|e| self.invalid(e))? {
            Value::Object(map) => Ok(map),
            _ => Err(self.invalid("top level is not an object")),
        }
    }

    /// Write through a sibling temp file renamed over the ledger.
    fn write(&self, doc: &Map<String, Value>) -> Result<()> {
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut body = serde_json::to_string_pretty(doc).map_err(|e| self.invalid(e))?;
        body.push('\n');

        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .map_err(|e| Error::fs(format!("create temp file in {}", dir.display()), e))?;
        tmp.write_all(body.as_bytes())
            .map_err(|e| Error::fs(format!("write {}", tmp.path().display()), e))?;
        // Temp files start out owner-only; keep the ledger's own mode.
        if let Ok(meta) = std::fs::metadata(&self.path) {
            tmp.as_file().set_permissions(meta.permissions()).map_err(|e| {
                Error::fs(format!("set permissions on {}", tmp.path().display()), e)
            })?;
        }
        tmp.persist(&self.path)
            .map_err(|e| Error::fs(format!("replace {}", self.path.display()), e.error))?;
        Ok(())
    }

    fn invalid(&self, reason: impl std::fmt::Display) -> Error {
        Error::HostRegistry {
            path: self.path.clone(),
            reason: reason.to_string(),
        }
    }
}
