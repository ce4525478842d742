//! Config schema types for `bazaar.toml`.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BazaarConfig {
    pub marketplace: MarketplaceConfig,
    pub paths: PathsConfig,
    pub install: InstallConfig,
    pub sync: SyncConfig,
    pub host: HostConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketplaceConfig {
    /// Marketplace name, used for cache layout and host registry keys.
    pub name: String,
    /// Path to the registry JSON document.
    pub registry: PathBuf,
}

impl Default for MarketplaceConfig {
    fn default() -> Self {
        Self {
            name: "bazaar".into(),
            registry: PathBuf::from("registry.json"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Local plugin store, one subdirectory per installed plugin.
    pub plugins_dir: PathBuf,
    /// Cache mirror root. Filled from the platform cache dir when unset.
    pub cache_dir: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            plugins_dir: PathBuf::from("plugins"),
            cache_dir: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallConfig {
    /// Per-download timeout. `None` waits indefinitely.
    pub download_timeout_secs: Option<u64>,
    /// Take an advisory lock on the plugin store while mutating it.
    pub lock: bool,
}

impl Default for InstallConfig {
    fn default() -> Self {
        Self {
            download_timeout_secs: None,
            lock: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub on_error: SyncPolicy,
}

/// What `sync` does when a single plugin fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPolicy {
    /// Abort on the first failure.
    #[default]
    FailFast,
    /// Keep going and report every failure at the end.
    #[serde(alias = "continue_on_error")]
    Continue,
}

impl std::fmt::Display for SyncPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FailFast => write!(f, "fail_fast"),
            Self::Continue => write!(f, "continue"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Host application's installed-plugins ledger. Not touched when unset.
    pub registry: Option<PathBuf>,
    /// `scope` written into host registry records.
    pub scope: String,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            registry: None,
            scope: "user".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BazaarConfig::default();
        assert_eq!(config.marketplace.name, "bazaar");
        assert_eq!(config.marketplace.registry, PathBuf::from("registry.json"));
        assert_eq!(config.paths.plugins_dir, PathBuf::from("plugins"));
        assert!(config.paths.cache_dir.is_none());
        assert!(config.install.lock);
        assert!(config.install.download_timeout_secs.is_none());
        assert_eq!(config.sync.on_error, SyncPolicy::FailFast);
        assert_eq!(config.host.scope, "user");
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: BazaarConfig = toml::from_str(
            r#"
            [marketplace]
            name = "acme"

            [sync]
            on_error = "continue"
            "#,
        )
        .unwrap();
        assert_eq!(config.marketplace.name, "acme");
        assert_eq!(config.marketplace.registry, PathBuf::from("registry.json"));
        assert_eq!(config.sync.on_error, SyncPolicy::Continue);
        assert!(config.install.lock);
    }

    #[test]
    fn test_sync_policy_alias() {
        let config: SyncConfig = toml::from_str("on_error = \"continue_on_error\"").unwrap();
        assert_eq!(config.on_error, SyncPolicy::Continue);
        assert_eq!(SyncPolicy::FailFast.to_string(), "fail_fast");
    }
}
