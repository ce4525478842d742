//! Local Plugin Store and Cache Mirror layout on disk.
//!
//! ```text
//! <plugins_dir>/<name>/.version          installed plugin + marker
//! <plugins_dir>/.staging-XXXX/           per-operation scratch (hidden)
//! <plugins_dir>/.bazaar.lock             advisory store lock
//! <cache_dir>/<marketplace>/<name>/<version>/
//! ```

use std::{
    fs::{self, File},
    io,
    path::{Path, PathBuf},
};

use {
    serde::Serialize,
    tempfile::TempDir,
    tracing::{debug, warn},
    walkdir::WalkDir,
};

use crate::error::{Error, IoContext, Result};

/// File inside each plugin directory recording the installed version.
pub const VERSION_MARKER: &str = ".version";

/// Reported when a plugin directory has no readable marker.
pub const UNKNOWN_VERSION: &str = "unknown";

pub const LOCK_FILE: &str = ".bazaar.lock";

const STAGING_PREFIX: &str = ".staging-";

/// Reject names that would not stay a single path segment.
pub fn validate_segment(kind: &'static str, value: &str) -> Result<()> {
    let invalid = value.is_empty()
        || value.starts_with('.')
        || value.contains(['/', '\\', '\0']);
    if invalid {
        return Err(Error::InvalidName {
            kind,
            value: value.to_string(),
        });
    }
    Ok(())
}

/// A plugin directory found in the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstalledEntry {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone)]
pub struct PluginStore {
    root: PathBuf,
}

impl PluginStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn plugin_dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Installed version of `name`, or [`UNKNOWN_VERSION`].
    pub fn installed_version(&self, name: &str) -> String {
        read_marker(&self.plugin_dir(name)).unwrap_or_else(|| UNKNOWN_VERSION.to_string())
    }

    /// Every non-hidden plugin directory, sorted by name.
    pub fn installed(&self) -> Result<Vec<InstalledEntry>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::fs(format!("read {}", self.root.display()), e)),
        };

        let mut installed = Vec::new();
        for entry in entries {
            let entry = entry.fs_context(|| format!("read {}", self.root.display()))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') || !entry.path().is_dir() {
                continue;
            }
            let version =
                read_marker(&entry.path()).unwrap_or_else(|| UNKNOWN_VERSION.to_string());
            installed.push(InstalledEntry { name, version });
        }

        installed.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(installed)
    }

    /// Fresh hidden scratch directory inside the store, removed on drop.
    ///
    /// Living under the store root keeps the final rename on one filesystem.
    pub fn staging(&self) -> Result<TempDir> {
        fs::create_dir_all(&self.root).fs_context(|| format!("create {}", self.root.display()))?;
        tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(&self.root)
            .fs_context(|| format!("create staging dir in {}", self.root.display()))
    }

    /// Remove `.staging-*` directories left behind by interrupted runs.
    ///
    /// Only call this while holding the store lock, or a concurrent
    /// operation's scratch space may be removed from under it.
    pub fn sweep_staging(&self) -> Result<usize> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(Error::fs(format!("read {}", self.root.display()), e)),
        };

        let mut removed = 0;
        for entry in entries {
            let entry = entry.fs_context(|| format!("read {}", self.root.display()))?;
            if !entry.file_name().to_string_lossy().starts_with(STAGING_PREFIX) {
                continue;
            }
            let path = entry.path();
            fs::remove_dir_all(&path).fs_context(|| format!("remove {}", path.display()))?;
            removed += 1;
        }
        Ok(removed)
    }

    /// Replace `<root>/<name>` with `staged_root`.
    ///
    /// The previous install is parked inside `staging` (and dropped with it);
    /// it is moved back if the new tree cannot be renamed into place.
    pub fn swap_in(&self, name: &str, staged_root: &Path, staging: &Path) -> Result<PathBuf> {
        let target = self.plugin_dir(name);
        let parked = staging.join("previous");

        let had_previous = match fs::symlink_metadata(&target) {
            Ok(_) => {
                fs::rename(&target, &parked).fs_context(|| {
                    format!("move {} out of the way", target.display())
                })?;
                true
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => false,
            Err(e) => return Err(Error::fs(format!("stat {}", target.display()), e)),
        };

        if let Err(e) = fs::rename(staged_root, &target) {
            if had_previous && let Err(restore) = fs::rename(&parked, &target) {
                warn!(
                    plugin = %name,
                    error = %restore,
                    "failed to restore previous install"
                );
            }
            return Err(Error::fs(format!("move new install to {}", target.display()), e));
        }

        debug!(plugin = %name, path = %target.display(), replaced = had_previous, "swapped plugin into place");
        Ok(target)
    }

    /// Open (creating if needed) the store lock file.
    pub fn lock_file(&self) -> Result<fd_lock::RwLock<File>> {
        fs::create_dir_all(&self.root).fs_context(|| format!("create {}", self.root.display()))?;
        let path = self.root.join(LOCK_FILE);
        let file = fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .fs_context(|| format!("open {}", path.display()))?;
        Ok(fd_lock::RwLock::new(file))
    }

    /// Take the exclusive store lock without waiting.
    pub fn try_lock<'a>(
        &self,
        lock: &'a mut fd_lock::RwLock<File>,
    ) -> Result<fd_lock::RwLockWriteGuard<'a, File>> {
        let path = self.root.join(LOCK_FILE);
        lock.try_write().map_err(|e| {
            if e.kind() == io::ErrorKind::WouldBlock {
                Error::Locked { path }
            } else {
                Error::fs(format!("lock {}", path.display()), e)
            }
        })
    }
}

/// Read a plugin directory's version marker. Empty or unreadable is `None`.
pub fn read_marker(plugin_dir: &Path) -> Option<String> {
    let path = plugin_dir.join(VERSION_MARKER);
    match fs::read_to_string(&path) {
        Ok(raw) => {
            let version = raw.trim();
            (!version.is_empty()).then(|| version.to_string())
        },
        Err(e) => {
            if e.kind() != io::ErrorKind::NotFound {
                debug!(path = %path.display(), error = %e, "unreadable version marker");
            }
            None
        },
    }
}

/// Write the version string exactly, with no trailing newline.
pub fn write_marker(plugin_dir: &Path, version: &str) -> Result<()> {
    let path = plugin_dir.join(VERSION_MARKER);
    fs::write(&path, version).fs_context(|| format!("write {}", path.display()))
}

/// Secondary copy of installed plugins, one directory per version.
#[derive(Debug, Clone)]
pub struct CacheMirror {
    root: PathBuf,
    marketplace: String,
}

impl CacheMirror {
    pub fn new(root: impl Into<PathBuf>, marketplace: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            marketplace: marketplace.into(),
        }
    }

    pub fn path_for(&self, name: &str, version: &str) -> PathBuf {
        self.root.join(&self.marketplace).join(name).join(version)
    }

    /// Copy `source` to the cache slot for `name`/`version`, replacing that slot.
    pub fn mirror(&self, source: &Path, name: &str, version: &str) -> Result<PathBuf> {
        let dest = self.path_for(name, version);
        if dest.exists() {
            fs::remove_dir_all(&dest).fs_context(|| format!("remove {}", dest.display()))?;
        }
        copy_dir(source, &dest)?;
        debug!(plugin = %name, version = %version, path = %dest.display(), "mirrored into cache");
        Ok(dest)
    }
}

/// Recursively copy `src` to `dst`. Symlinks are recreated, not followed.
pub fn copy_dir(src: &Path, dst: &Path) -> Result<()> {
    for entry in WalkDir::new(src) {
        let entry = entry.map_err(|e| {
            let context = format!("walk {}", src.display());
            Error::fs(context, e.into())
        })?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| Error::fs(format!("walk {}", src.display()), io::Error::other(e)))?;
        let target = dst.join(rel);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&target).fs_context(|| format!("create {}", target.display()))?;
        } else if file_type.is_symlink() {
            copy_symlink(entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target).fs_context(|| {
                format!("copy {} to {}", entry.path().display(), target.display())
            })?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn copy_symlink(src: &Path, dst: &Path) -> Result<()> {
    let link = fs::read_link(src).fs_context(|| format!("read link {}", src.display()))?;
    std::os::unix::fs::symlink(&link, dst).fs_context(|| format!("symlink {}", dst.display()))
}

#[cfg(not(unix))]
fn copy_symlink(src: &Path, dst: &Path) -> Result<()> {
    fs::copy(src, dst)
        .map(|_| ())
        .fs_context(|| format!("copy {} to {}", src.display(), dst.display()))
}
