//! Command handlers: drive the marketplace and report through status lines.

use std::process::ExitCode;

use {
    anyhow::Result,
    bazaar_config::{BazaarConfig, SyncPolicy},
    bazaar_plugins::{
        Listing, Marketplace, UpdateOutcome, host_registry::HostRegistryUpdate,
        service::{self, InstallReport},
    },
};

use crate::status;

pub async fn install(config: BazaarConfig, name: &str, version: Option<&str>) -> Result<ExitCode> {
    let market = Marketplace::new(config)?;
    match version {
        Some(version) => status::info(format!("installing {name} {version}")),
        None => status::info(format!("installing {name} (latest)")),
    }

    let report = market.install(name, version).await?;
    report_install(&report);
    Ok(ExitCode::SUCCESS)
}

pub async fn update(config: BazaarConfig, name: &str) -> Result<ExitCode> {
    let market = Marketplace::new(config)?;
    match market.update(name).await? {
        UpdateOutcome::AlreadyCurrent { name, version } => {
            status::success(format!("{name} is already current ({version})"));
        },
        UpdateOutcome::Updated { previous, report } => {
            status::info(format!(
                "{} updated from {previous} to {}",
                report.plugin.name, report.plugin.version
            ));
            report_install(&report);
        },
    }
    Ok(ExitCode::SUCCESS)
}

pub async fn sync(config: BazaarConfig, continue_on_error: bool) -> Result<ExitCode> {
    let policy = if continue_on_error {
        SyncPolicy::Continue
    } else {
        config.sync.on_error
    };
    let market = Marketplace::new(config)?;
    status::info(format!("syncing all plugins ({policy})"));

    let report = market.sync_with(policy).await?;
    for name in &report.current {
        status::success(format!("{name} is already current"));
    }
    for install in &report.updated {
        report_install(install);
    }
    for failure in &report.failed {
        status::error(format!("{}: {}", failure.name, failure.error));
    }

    if report.is_success() {
        status::success(format!(
            "sync complete: {} updated, {} current",
            report.updated.len(),
            report.current.len()
        ));
        Ok(ExitCode::SUCCESS)
    } else {
        status::error(format!(
            "sync finished with {} failure(s)",
            report.failed.len()
        ));
        Ok(ExitCode::FAILURE)
    }
}

pub fn list(config: BazaarConfig, json: bool) -> Result<ExitCode> {
    let listing = service::list(&config)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&listing)?);
    } else {
        print!("{}", render_listing(&listing));
    }
    Ok(ExitCode::SUCCESS)
}

fn report_install(report: &InstallReport) {
    let plugin = &report.plugin;
    status::success(format!(
        "installed {} {} to {}",
        plugin.name,
        plugin.version,
        plugin.install_path.display()
    ));
    status::info(format!("cached at {}", plugin.cache_path.display()));

    match &report.host {
        Some(HostRegistryUpdate::Updated { key, .. }) => {
            status::info(format!("recorded {key} in host registry"));
        },
        Some(HostRegistryUpdate::Skipped { path }) => {
            status::warning(format!(
                "host registry {} not found, skipped",
                path.display()
            ));
        },
        None => {},
    }
}

fn render_listing(listing: &Listing) -> String {
    let mut out = String::from("Available plugins:\n");
    if listing.available.is_empty() {
        out.push_str("  (none)\n");
    }
    let width = listing
        .available
        .iter()
        .map(|p| p.name.len())
        .max()
        .unwrap_or(0);
    for plugin in &listing.available {
        out.push_str(&format!(
            "  {:<width$}  {:<10}  {}\n",
            plugin.name, plugin.latest, plugin.description
        ));
    }

    out.push_str("\nInstalled plugins:\n");
    if listing.installed.is_empty() {
        out.push_str("  (none)\n");
    }
    let width = listing
        .installed
        .iter()
        .map(|p| p.name.len())
        .max()
        .unwrap_or(0);
    for plugin in &listing.installed {
        out.push_str(&format!("  {:<width$}  {}\n", plugin.name, plugin.version));
    }
    out
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        bazaar_plugins::{service::AvailablePlugin, store::InstalledEntry},
    };

    #[test]
    fn test_render_listing() {
        let listing = Listing {
            available: vec![
                AvailablePlugin {
                    name: "demo".into(),
                    latest: "1.2.0".into(),
                    description: "x".into(),
                },
                AvailablePlugin {
                    name: "longer".into(),
                    latest: "0.1.0".into(),
                    description: "y".into(),
                },
            ],
            installed: vec![InstalledEntry {
                name: "demo".into(),
                version: "unknown".into(),
            }],
        };

        let rendered = render_listing(&listing);
        assert_eq!(
            rendered,
            "Available plugins:\n  demo    1.2.0       x\n  longer  0.1.0       y\n\nInstalled plugins:\n  demo  unknown\n"
        );
    }

    #[test]
    fn test_render_empty_listing() {
        let listing = Listing {
            available: vec![],
            installed: vec![],
        };
        assert_eq!(
            render_listing(&listing),
            "Available plugins:\n  (none)\n\nInstalled plugins:\n  (none)\n"
        );
    }
}
