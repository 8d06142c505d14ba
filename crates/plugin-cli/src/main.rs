//! Plugin manager CLI
//!
//! The command-line front end for installing, updating and managing
//! git-hosted plugins.

mod cli;
mod commands;
mod context;
mod error;
mod logging;
mod output;

use std::error::Error as _;

use clap::Parser;
use colored::Colorize;

use cli::{Cli, Commands, GlobalArgs};
use commands::InstallArgs;
use context::Context;
use error::{CliError, Result};

fn main() {
    let cli = Cli::parse();
    if cli.global.no_color {
        colored::control::set_override(false);
    }
    logging::init(cli.global.verbose);

    if let Err(e) = run(&cli.global, cli.command) {
        eprintln!("{}: {}", "error".red().bold(), e);
        if let Some(hint) = e.hint() {
            eprintln!("{}: {}", "hint".cyan().bold(), hint);
        }
        if let CliError::UnknownPlugin { suggestions, .. } = &e
            && !suggestions.is_empty()
        {
            eprintln!("{}: {}", "did you mean".cyan().bold(), suggestions.join(", "));
        }
        if cli.global.verbose {
            let mut source = e.source();
            while let Some(cause) = source {
                eprintln!("  {} {}", "caused by:".dimmed(), cause);
                source = cause.source();
            }
        }
        std::process::exit(e.exit_code());
    }
}

fn run(global: &GlobalArgs, command: Option<Commands>) -> Result<()> {
    let Some(command) = command else {
        println!("{} Plugin manager CLI", "plugins".green().bold());
        println!();
        println!("Run {} for available commands.", "plugins --help".cyan());
        return Ok(());
    };

    // Commands that need no manager
    match &command {
        Commands::Validate { source, git_ref } => {
            return commands::run_validate(source, git_ref.as_deref());
        }
        Commands::Manifest { plugin: None } => {
            commands::run_manifest_template();
            return Ok(());
        }
        _ => {}
    }

    let mut ctx = Context::load(global)?;
    execute_command(&mut ctx, command)
}

fn execute_command(ctx: &mut Context, command: Commands) -> Result<()> {
    match command {
        Commands::List { json } => commands::run_list(ctx, json),
        Commands::Info { plugin, json } => commands::run_info(ctx, &plugin, json),
        Commands::Install {
            source,
            git_ref,
            reinstall,
            force_blacklisted,
            discard_changes,
            enable,
        } => commands::run_install(
            ctx,
            &source,
            InstallArgs {
                git_ref,
                reinstall,
                force_blacklisted,
                discard_changes,
                enable,
            },
        ),
        Commands::Remove { plugin, purge } => commands::run_remove(ctx, &plugin, purge),
        Commands::Enable { plugin } => commands::run_enable(ctx, &plugin),
        Commands::Disable { plugin } => commands::run_disable(ctx, &plugin),
        Commands::Update {
            plugin,
            discard_changes,
        } => commands::run_update(ctx, &plugin, discard_changes),
        Commands::UpdateAll { discard_changes } => commands::run_update_all(ctx, discard_changes),
        Commands::CheckUpdates { json } => commands::run_check_updates(ctx, json),
        Commands::SwitchRef {
            plugin,
            reference,
            discard_changes,
        } => commands::run_switch_ref(ctx, &plugin, &reference, discard_changes),
        Commands::ListRefs {
            target,
            refresh,
            json,
        } => commands::run_list_refs(ctx, &target, refresh, json),
        Commands::Validate { source, git_ref } => commands::run_validate(&source, git_ref.as_deref()),
        Commands::Manifest { plugin: Some(plugin) } => commands::run_manifest(ctx, &plugin),
        Commands::Manifest { plugin: None } => {
            commands::run_manifest_template();
            Ok(())
        }
        Commands::Browse {
            category,
            trust,
            json,
        } => commands::run_browse(ctx, category.as_deref(), trust.as_deref(), json),
        Commands::Search { query, json } => commands::run_search(ctx, &query, json),
        Commands::RefreshRegistry => commands::run_refresh_registry(ctx),
        Commands::CleanConfig { uuid } => commands::run_clean_config(ctx, uuid.as_deref()),
    }
}
