//! Config discovery, parsing and path resolution.

use std::path::{Path, PathBuf};

use {
    anyhow::{Context, Result},
    tracing::debug,
};

use crate::schema::BazaarConfig;

/// File name looked up in the working directory and the platform config dir.
pub const CONFIG_FILE_NAME: &str = "bazaar.toml";

/// Locate the config file to use.
///
/// An explicit path always wins, even if it does not exist (loading reports
/// that). Otherwise `./bazaar.toml`, then `<config dir>/bazaar.toml`.
pub fn discover_config_file(explicit: Option<&Path>, cwd: &Path) -> Option<PathBuf> {
    discover_in(explicit, cwd, user_config_dir().as_deref())
}

fn discover_in(explicit: Option<&Path>, cwd: &Path, user_dir: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(resolve_path(path, cwd));
    }

    let local = cwd.join(CONFIG_FILE_NAME);
    if local.is_file() {
        return Some(local);
    }

    user_dir
        .map(|dir| dir.join(CONFIG_FILE_NAME))
        .filter(|path| path.is_file())
}

/// Load the effective configuration with every path made absolute.
pub fn load_config(explicit: Option<&Path>) -> Result<BazaarConfig> {
    let cwd = std::env::current_dir().context("cannot determine working directory")?;
    let file = discover_config_file(explicit, &cwd);
    load_from(file.as_deref(), &cwd)
}

fn load_from(file: Option<&Path>, cwd: &Path) -> Result<BazaarConfig> {
    let (mut config, base) = match file {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config {}", path.display()))?;
            let config: BazaarConfig = toml::from_str(&raw)
                .with_context(|| format!("invalid config {}", path.display()))?;
            debug!(path = %path.display(), "loaded config file");
            let base = path.parent().map(Path::to_path_buf).unwrap_or_else(|| cwd.to_path_buf());
            (config, base)
        },
        None => {
            debug!("no config file found, using defaults");
            (BazaarConfig::default(), cwd.to_path_buf())
        },
    };

    resolve_paths(&mut config, &base)?;
    Ok(config)
}

/// Make every configured path absolute against `base` and fill in the cache dir.
pub fn resolve_paths(config: &mut BazaarConfig, base: &Path) -> Result<()> {
    config.marketplace.registry = resolve_path(&config.marketplace.registry, base);
    config.paths.plugins_dir = resolve_path(&config.paths.plugins_dir, base);
    config.paths.cache_dir = match config.paths.cache_dir.take() {
        Some(dir) => Some(resolve_path(&dir, base)),
        None => Some(default_cache_dir().context("cannot determine a cache directory")?),
    };
    config.host.registry = config.host.registry.take().map(|p| resolve_path(&p, base));
    Ok(())
}

/// Expand `~` and join relative paths onto `base`.
pub fn resolve_path(path: &Path, base: &Path) -> PathBuf {
    let expanded = expand_home(path);
    if expanded.is_absolute() {
        expanded
    } else {
        base.join(expanded)
    }
}

/// Replace a leading `~` with the user's home directory.
pub fn expand_home(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };

    match directories::BaseDirs::new() {
        Some(base_dirs) => base_dirs.home_dir().join(rest),
        None => path.to_path_buf(),
    }
}

fn user_config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "bazaar").map(|d| d.config_dir().to_path_buf())
}

fn default_cache_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "bazaar").map(|d| d.cache_dir().to_path_buf())
}
