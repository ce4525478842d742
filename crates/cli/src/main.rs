mod commands;
mod status;

use std::{path::PathBuf, process::ExitCode};

use {
    anyhow::{Context, Result},
    clap::{Parser, Subcommand},
    tracing_subscriber::EnvFilter,
};

use bazaar_config::{BazaarConfig, load_config, resolve_path};

#[derive(Parser)]
#[command(
    name = "bazaar",
    version,
    about = "Install, update and list plugins from a marketplace registry"
)]
struct Cli {
    /// Config file (default: ./bazaar.toml, then the user config dir).
    #[arg(long, global = true, env = "BAZAAR_CONFIG")]
    config: Option<PathBuf>,

    /// Registry JSON document.
    #[arg(long, global = true, env = "BAZAAR_REGISTRY")]
    registry: Option<PathBuf>,

    /// Local plugin store.
    #[arg(long, global = true, env = "BAZAAR_PLUGINS_DIR")]
    plugins_dir: Option<PathBuf>,

    /// Cache mirror root.
    #[arg(long, global = true, env = "BAZAAR_CACHE_DIR")]
    cache_dir: Option<PathBuf>,

    /// Host application's installed-plugins ledger to keep in step.
    #[arg(long, global = true, env = "BAZAAR_HOST_REGISTRY")]
    host_registry: Option<PathBuf>,

    /// Marketplace name used for cache layout and host registry keys.
    #[arg(long, global = true, env = "BAZAAR_MARKETPLACE")]
    marketplace: Option<String>,

    /// Debug logging on stderr.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Install a plugin, replacing any installed version.
    Install {
        name: String,
        /// Defaults to the registry's latest version.
        version: Option<String>,
    },
    /// Update a plugin to the registry's latest version.
    Update { name: String },
    /// List registry plugins and installed plugins.
    List {
        #[arg(long)]
        json: bool,
    },
    /// Update every plugin in the registry.
    Sync {
        /// Keep going after a plugin fails and report failures at the end.
        #[arg(long)]
        continue_on_error: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    tokio::select! {
        result = run(cli) => match result {
            Ok(code) => code,
            Err(e) => {
                status::error(format!("{e:#}"));
                ExitCode::FAILURE
            },
        },
        _ = tokio::signal::ctrl_c() => {
            // Dropping the command future removes its staging directory.
            status::error("interrupted");
            ExitCode::from(130)
        },
    }
}

/// Filter used when `RUST_LOG` is unset.
fn default_filter(verbose: bool) -> &'static str {
    if verbose {
        "warn,bazaar=debug,bazaar_plugins=debug,bazaar_config=debug"
    } else {
        "warn"
    }
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbose)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config = build_config(&cli)?;
    tracing::debug!(?config, "effective configuration");

    match cli.command {
        Commands::Install { name, version } => {
            commands::install(config, &name, version.as_deref()).await
        },
        Commands::Update { name } => commands::update(config, &name).await,
        Commands::List { json } => commands::list(config, json),
        Commands::Sync { continue_on_error } => commands::sync(config, continue_on_error).await,
    }
}

/// Config file values, overridden by flags resolved against the working dir.
fn build_config(cli: &Cli) -> Result<BazaarConfig> {
    let mut config = load_config(cli.config.as_deref())?;
    let cwd = std::env::current_dir().context("cannot determine working directory")?;

    if let Some(path) = &cli.registry {
        config.marketplace.registry = resolve_path(path, &cwd);
    }
    if let Some(path) = &cli.plugins_dir {
        config.paths.plugins_dir = resolve_path(path, &cwd);
    }
    if let Some(path) = &cli.cache_dir {
        config.paths.cache_dir = Some(resolve_path(path, &cwd));
    }
    if let Some(path) = &cli.host_registry {
        config.host.registry = Some(resolve_path(path, &cwd));
    }
    if let Some(name) = &cli.marketplace {
        config.marketplace.name = name.clone();
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use {super::*, clap::CommandFactory};

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_default_filter_shows_warnings() {
        assert_eq!(default_filter(false), "warn");
        assert!(default_filter(true).starts_with("warn,"));
        assert!(default_filter(true).contains("bazaar_plugins=debug"));
    }

    #[test]
    fn test_install_with_optional_version() {
        let cli = Cli::try_parse_from(["bazaar", "install", "demo"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Install { ref name, version: None } if name == "demo"
        ));

        let cli = Cli::try_parse_from(["bazaar", "install", "demo", "1.0.0"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Install { version: Some(ref v), .. } if v == "1.0.0"
        ));
    }

    #[test]
    fn test_missing_argument_and_unknown_command_rejected() {
        assert!(Cli::try_parse_from(["bazaar", "update"]).is_err());
        assert!(Cli::try_parse_from(["bazaar", "explode"]).is_err());
        assert!(Cli::try_parse_from(["bazaar"]).is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "bazaar",
            "sync",
            "--continue-on-error",
            "--plugins-dir",
            "/tmp/plugins",
            "--marketplace",
            "acme",
        ])
        .unwrap();
        assert!(matches!(cli.command, Commands::Sync { continue_on_error: true }));
        assert_eq!(cli.plugins_dir, Some(PathBuf::from("/tmp/plugins")));
        assert_eq!(cli.marketplace.as_deref(), Some("acme"));
    }

    #[test]
    fn test_flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("bazaar.toml");
        std::fs::write(
            &file,
            "[marketplace]\nname = \"from-file\"\n\n[paths]\ncache_dir = \"cache\"\n",
        )
        .unwrap();
        let cli = Cli::try_parse_from([
            "bazaar",
            "list",
            "--config",
            file.to_str().unwrap(),
            "--registry",
            "/abs/registry.json",
            "--host-registry",
            "/abs/host.json",
        ])
        .unwrap();

        let config = build_config(&cli).unwrap();
        assert_eq!(config.marketplace.name, "from-file");
        assert_eq!(config.marketplace.registry, PathBuf::from("/abs/registry.json"));
        assert_eq!(config.paths.cache_dir, Some(dir.path().join("cache")));
        assert_eq!(config.host.registry, Some(PathBuf::from("/abs/host.json")));
    }
}
