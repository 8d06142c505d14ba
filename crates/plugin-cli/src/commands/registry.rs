//! Registry commands: browse, search and refresh-registry

use colored::Colorize;
use plugin_registry::{RegistryPlugin, TrustLevel};
use serde::Serialize;

use crate::context::Context;
use crate::error::{CliError, Result};
use crate::output;

#[derive(Debug, Serialize)]
struct Listed<'a> {
    #[serde(flatten)]
    plugin: &'a RegistryPlugin,
    installed: bool,
}

fn print_plugins(ctx: &Context, plugins: &[RegistryPlugin], json: bool) -> Result<()> {
    let installed = |plugin: &RegistryPlugin| {
        plugin.uuid.as_deref().is_some_and(|uuid| {
            ctx.manager.plugins().iter().any(|p| p.uuid() == Some(uuid))
        })
    };

    if json {
        let listed: Vec<Listed<'_>> = plugins
            .iter()
            .map(|plugin| Listed {
                plugin,
                installed: installed(plugin),
            })
            .collect();
        return output::json(&listed);
    }

    if plugins.is_empty() {
        println!("{}", "No plugins found".dimmed());
        return Ok(());
    }
    for plugin in plugins {
        let marker = if installed(plugin) {
            "installed".green()
        } else {
            "".normal()
        };
        println!(
            "  {:<24} {:<10} {}",
            plugin.id.cyan(),
            output::trust_label(plugin.trust()),
            marker
        );
        if let Some(description) = &plugin.description {
            println!("  {:<24} {}", "", description.dimmed());
        }
    }
    println!();
    println!("Install with {}.", "plugins install <id>".cyan());
    Ok(())
}

/// Run the browse command
pub fn run_browse(
    ctx: &mut Context,
    category: Option<&str>,
    trust: Option<&str>,
    json: bool,
) -> Result<()> {
    let trust = trust
        .map(|t| t.parse::<TrustLevel>().map_err(CliError::user))
        .transpose()?;
    let plugins = ctx.manager.registry().list_plugins(category, trust);
    if ctx.manager.registry().fetch_failed() {
        output::warning("The plugin registry could not be loaded");
    }
    if !json {
        output::heading("Registry Plugins");
    }
    print_plugins(ctx, &plugins, json)
}

/// Run the search command
pub fn run_search(ctx: &mut Context, query: &str, json: bool) -> Result<()> {
    let plugins = ctx.manager.registry().search(query);
    if ctx.manager.registry().fetch_failed() {
        output::warning("The plugin registry could not be loaded");
    }
    print_plugins(ctx, &plugins, json)
}

/// Run the refresh-registry command
pub fn run_refresh_registry(ctx: &mut Context) -> Result<()> {
    let registry = ctx.manager.registry();
    registry.refresh()?;
    let Some(info) = registry.get_registry_info() else {
        return Err(CliError::user("Registry returned no data"));
    };
    output::success(format!("Registry refreshed from {}", info.registry_url.cyan()));
    output::info(format!("{} plugin(s)", info.plugin_count));
    if let Some(api_version) = &info.api_version {
        output::info(format!("API version {api_version}"));
    }
    let blacklist = registry.get_blacklist_types();
    if !blacklist.is_empty() {
        output::info(format!(
            "blacklist rules by {}",
            blacklist.into_iter().collect::<Vec<_>>().join(", ")
        ));
    }
    let pruned = ctx.manager.prune_refs_cache()?;
    if pruned > 0 {
        output::info(format!("{pruned} stale refs cache entries removed"));
    }
    Ok(())
}
