//! Configuration for the bazaar marketplace tool.
//!
//! Config is read from `bazaar.toml` (explicit path, working directory, or the
//! platform config dir) and every path in it is resolved to an absolute path
//! before the rest of the workspace sees it.

pub mod loader;
pub mod schema;

pub use {
    loader::{
        CONFIG_FILE_NAME, discover_config_file, expand_home, load_config, resolve_path,
        resolve_paths,
    },
    schema::{
        BazaarConfig, HostConfig, InstallConfig, MarketplaceConfig, PathsConfig, SyncConfig,
        SyncPolicy,
    },
};
