//! Commands on installed plugins: list, info, enable, disable, remove and
//! clean-config

use colored::Colorize;
use plugin_core::{FailedPlugin, PluginMetadata, PluginState};
use plugin_registry::TrustLevel;
use serde::Serialize;

use crate::context::Context;
use crate::error::{CliError, Result};
use crate::output;

/// One installed plugin as shown by `list` and `info`.
#[derive(Debug, Serialize)]
struct PluginRow {
    plugin_id: String,
    name: String,
    version: String,
    uuid: Option<String>,
    state: &'static str,
    #[serde(skip)]
    plugin_state: PluginState,
    trust: TrustLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<PluginMetadata>,
}

#[derive(Debug, Serialize)]
struct ListOutput<'a> {
    plugins: Vec<PluginRow>,
    failed: &'a [FailedPlugin],
}

fn row(ctx: &mut Context, plugin_id: &str) -> Result<PluginRow> {
    let source = ctx.manager.plugin_metadata(plugin_id)?;
    let trust = match &source {
        Some(metadata) if !metadata.url.is_empty() => {
            ctx.manager.registry().get_trust_level(&metadata.url)
        }
        _ => TrustLevel::Unregistered,
    };
    let plugin = ctx
        .manager
        .plugin(plugin_id)
        .ok_or_else(|| CliError::user(format!("Plugin not found: {plugin_id}")))?;
    Ok(PluginRow {
        plugin_id: plugin.plugin_id.clone(),
        name: plugin.name().to_string(),
        version: plugin.version().to_string(),
        uuid: plugin.uuid().map(str::to_string),
        state: plugin.state.as_str(),
        plugin_state: plugin.state,
        trust,
        source,
    })
}

/// Run the list command
pub fn run_list(ctx: &mut Context, json: bool) -> Result<()> {
    let ids: Vec<String> = ctx
        .manager
        .plugins()
        .iter()
        .map(|p| p.plugin_id.clone())
        .collect();
    let rows = ids
        .iter()
        .map(|id| row(ctx, id))
        .collect::<Result<Vec<_>>>()?;

    if json {
        return output::json(&ListOutput {
            plugins: rows,
            failed: ctx.manager.failed_plugins(),
        });
    }

    if rows.is_empty() {
        println!("{}", "No plugins installed".dimmed());
        println!();
        println!("Run {} to find plugins.", "plugins browse".cyan());
    } else {
        output::heading("Installed Plugins");
        for row in &rows {
            let git_ref = row
                .source
                .as_ref()
                .map(|m| m.git_ref.as_str())
                .filter(|r| !r.is_empty())
                .unwrap_or("-");
            println!(
                "  {:<30} {:<10} {:<10} {:<12} {}",
                row.name.cyan(),
                row.version,
                output::state_label(row.plugin_state),
                output::trust_label(row.trust),
                git_ref.dimmed()
            );
        }
    }

    for failed in ctx.manager.failed_plugins() {
        println!(
            "  {} {} ({})",
            "!".red().bold(),
            failed.path.display(),
            failed.error
        );
    }
    Ok(())
}

/// Run the info command
pub fn run_info(ctx: &mut Context, identifier: &str, json: bool) -> Result<()> {
    let plugin_id = ctx.find_plugin(identifier)?;
    let row = row(ctx, &plugin_id)?;
    let registry_id = row.uuid.as_deref().and_then(|uuid| {
        let url = row.source.as_ref().map(|m| m.url.as_str());
        ctx.manager.registry().get_registry_id(url, Some(uuid))
    });
    let has_options = row
        .uuid
        .as_deref()
        .is_some_and(|uuid| ctx.manager.plugin_has_saved_options(uuid));

    if json {
        #[derive(Serialize)]
        struct Info<'a> {
            #[serde(flatten)]
            plugin: &'a PluginRow,
            registry_id: Option<String>,
            path: String,
            saved_options: bool,
            manifest: Option<&'a plugin_core::Manifest>,
        }
        let plugin = ctx
            .manager
            .plugin(&plugin_id)
            .ok_or_else(|| CliError::user(format!("Plugin not found: {plugin_id}")))?;
        return output::json(&Info {
            plugin: &row,
            registry_id,
            path: plugin.path.display().to_string(),
            saved_options: has_options,
            manifest: plugin.manifest.as_ref(),
        });
    }

    let Some(plugin) = ctx.manager.plugin(&plugin_id) else {
        return Err(CliError::user(format!("Plugin not found: {plugin_id}")));
    };
    output::heading(&row.name);
    output::field("Id", &row.plugin_id);
    output::field("UUID", row.uuid.as_deref().unwrap_or("-"));
    output::field("Version", &row.version);
    output::field("State", output::state_label(row.plugin_state));
    output::field("Trust", output::trust_label(row.trust));
    output::field("Path", plugin.path.display());
    if let Some(registry_id) = &registry_id {
        output::field("Registry id", registry_id);
    }
    if let Some(manifest) = &plugin.manifest {
        output::field("API", manifest.api.join(", "));
        if !manifest.authors.is_empty() {
            output::field("Authors", manifest.authors.join(", "));
        }
        if let Some(license) = &manifest.license {
            output::field("License", license);
        }
        if let Some(homepage) = &manifest.homepage {
            output::field("Homepage", homepage);
        }
        if !manifest.description.is_empty() {
            println!();
            println!("{}", manifest.description);
        }
    }
    if let Some(source) = &row.source {
        println!();
        output::field("Source", &source.url);
        output::field(
            "Ref",
            format!(
                "{} ({})",
                source.git_ref,
                source.ref_type.as_deref().unwrap_or("unknown")
            ),
        );
        output::field("Commit", &source.commit);
        if let Some(original) = &source.original_url {
            output::field("Moved from", original);
        }
    }
    if has_options {
        output::field("Options", "saved");
    }
    Ok(())
}

/// Run the enable command
pub fn run_enable(ctx: &mut Context, identifier: &str) -> Result<()> {
    let plugin_id = ctx.find_plugin(identifier)?;
    ctx.manager.enable_plugin(&plugin_id)?;
    output::success(format!("Enabled {}", plugin_id.cyan()));
    Ok(())
}

/// Run the disable command
pub fn run_disable(ctx: &mut Context, identifier: &str) -> Result<()> {
    let plugin_id = ctx.find_plugin(identifier)?;
    ctx.manager.disable_plugin(&plugin_id)?;
    output::success(format!("Disabled {}", plugin_id.cyan()));
    Ok(())
}

/// Run the remove command
pub fn run_remove(ctx: &mut Context, identifier: &str, purge: bool) -> Result<()> {
    let plugin_id = ctx.find_plugin(identifier)?;
    let prompt = if purge {
        format!("Remove {plugin_id} and its saved options?")
    } else {
        format!("Remove {plugin_id}?")
    };
    ctx.require(&prompt)?;

    ctx.manager.uninstall_plugin(&plugin_id, purge)?;
    output::success(format!("Removed {}", plugin_id.cyan()));
    if !purge {
        output::info("Saved options were kept; use --purge to delete them");
    }
    Ok(())
}

/// Run the clean-config command
pub fn run_clean_config(ctx: &mut Context, uuid: Option<&str>) -> Result<()> {
    let targets = match uuid {
        Some(uuid) => {
            if let Some(plugin) = ctx.manager.plugins().iter().find(|p| p.uuid() == Some(uuid)) {
                return Err(CliError::user(format!(
                    "Plugin {} is installed; use `plugins remove --purge` instead",
                    plugin.plugin_id
                )));
            }
            if !ctx.manager.plugin_has_saved_options(uuid) {
                println!("No saved options for {uuid}");
                return Ok(());
            }
            vec![uuid.to_string()]
        }
        None => ctx.manager.orphaned_configs(),
    };

    if targets.is_empty() {
        println!("No orphaned plugin options");
        return Ok(());
    }

    println!("Saved options without an installed plugin:");
    for uuid in &targets {
        output::info(uuid);
    }
    ctx.require(&format!("Delete options of {} plugin(s)?", targets.len()))?;

    for uuid in &targets {
        ctx.manager.clean_plugin_config(uuid)?;
    }
    output::success(format!("Deleted options of {} plugin(s)", targets.len()));
    Ok(())
}
