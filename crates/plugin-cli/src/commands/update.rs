//! Update, ref switching and ref listing commands

use colored::Colorize;
use plugin_core::{UpdateOutcome, UpdateResult};
use plugin_git::short_id;

use crate::context::Context;
use crate::error::{CliError, Result};
use crate::output;

fn print_result(result: &UpdateResult) {
    if !result.changed() {
        output::success(format!("{} is up to date", result.plugin_id.cyan()));
        return;
    }
    output::success(format!(
        "Updated {} {} -> {}",
        result.plugin_id.cyan(),
        result.old_version,
        result.new_version.green()
    ));
    output::info(format!(
        "{} ({}) -> {} ({}), committed {}",
        result.old_ref,
        short_id(&result.old_commit),
        result.new_ref,
        short_id(&result.new_commit),
        result.commit_date.format("%Y-%m-%d")
    ));
}

/// Run the update command
pub fn run_update(ctx: &mut Context, identifier: &str, discard_changes: bool) -> Result<()> {
    let plugin_id = ctx.find_plugin(identifier)?;
    let result = ctx.with_discard_retry(discard_changes, |manager, discard| {
        manager.update_plugin(&plugin_id, discard)
    })?;
    print_result(&result);
    Ok(())
}

/// Run the update-all command
///
/// Fails when any plugin failed to update; skipped plugins do not count.
pub fn run_update_all(ctx: &mut Context, discard_changes: bool) -> Result<()> {
    let outcomes = ctx.manager.update_all_plugins(discard_changes);
    if outcomes.is_empty() {
        println!("No plugins installed");
        return Ok(());
    }

    let mut failed = 0;
    for (plugin_id, outcome) in &outcomes {
        match outcome {
            UpdateOutcome::Updated(result) => print_result(result),
            UpdateOutcome::Skipped(reason) => {
                println!("{} {}: {}", "-".dimmed(), plugin_id.cyan(), reason.dimmed());
            }
            UpdateOutcome::Failed(error) => {
                failed += 1;
                eprintln!("{} {}: {}", "✗".red(), plugin_id.cyan(), error);
            }
        }
    }

    if failed > 0 {
        return Err(CliError::user(format!(
            "{failed} of {} plugin(s) failed to update",
            outcomes.len()
        )));
    }
    Ok(())
}

/// Run the check-updates command
pub fn run_check_updates(ctx: &mut Context, json: bool) -> Result<()> {
    let checks = ctx.manager.check_updates();
    if json {
        return output::json(&checks);
    }
    if checks.is_empty() {
        output::success("All plugins are up to date");
        return Ok(());
    }

    output::heading("Updates Available");
    for check in &checks {
        let target = match &check.latest_ref {
            Some(tag) => format!("{} -> {}", check.current_ref, tag.green()),
            None => format!(
                "{} {} -> {}",
                check.current_ref,
                short_id(&check.current_commit),
                short_id(&check.latest_commit).green()
            ),
        };
        let date = check
            .commit_date
            .map(|d| format!(" ({})", d.format("%Y-%m-%d")))
            .unwrap_or_default();
        println!("  {:<30} {target}{date}", check.plugin_id.cyan());
    }
    println!();
    println!("Run {} to install them.", "plugins update-all".cyan());
    Ok(())
}

/// Run the switch-ref command
pub fn run_switch_ref(
    ctx: &mut Context,
    identifier: &str,
    reference: &str,
    discard_changes: bool,
) -> Result<()> {
    let plugin_id = ctx.find_plugin(identifier)?;
    let result = ctx.with_discard_retry(discard_changes, |manager, discard| {
        manager.switch_ref(&plugin_id, reference, discard)
    })?;
    output::success(format!(
        "Switched {} to {} ({})",
        plugin_id.cyan(),
        result.new_ref.green(),
        short_id(&result.new_commit)
    ));
    if result.old_version != result.new_version {
        output::info(format!("version {} -> {}", result.old_version, result.new_version));
    }
    Ok(())
}

/// Run the list-refs command
pub fn run_list_refs(ctx: &mut Context, target: &str, refresh: bool, json: bool) -> Result<()> {
    let listing = ctx.manager.list_refs(target, refresh)?;
    if json {
        return output::json(&listing);
    }

    if let Some(current) = &listing.current {
        output::field("Current", current.green());
        println!();
    }
    println!("{}:", "Branches".bold());
    if listing.branches.is_empty() {
        output::info("none".dimmed());
    }
    for branch in &listing.branches {
        let marker = if listing.current.as_deref() == Some(branch.as_str()) {
            "*".green()
        } else {
            " ".normal()
        };
        println!("  {marker} {branch}");
    }
    println!();
    println!("{}:", "Tags".bold());
    if listing.tags.is_empty() {
        output::info("none".dimmed());
    }
    for tag in &listing.tags {
        let marker = if listing.current.as_deref() == Some(tag.as_str()) {
            "*".green()
        } else {
            " ".normal()
        };
        println!("  {marker} {tag}");
    }
    Ok(())
}
