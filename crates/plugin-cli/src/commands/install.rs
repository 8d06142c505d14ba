//! Install and validate commands

use std::path::Path;

use colored::Colorize;
use plugin_core::{InstallOptions, MANIFEST_FILE, Manifest};
use plugin_git::{Git2Backend, GitBackend, switch_ref};
use plugin_registry::url::local_path;
use plugin_registry::{TrustLevel, normalize_git_url};
use tempfile::Builder;

use crate::context::{Context, MAX_SUGGESTIONS};
use crate::error::{CliError, Result};
use crate::output;

/// Flags of the install command
#[derive(Debug, Clone, Default)]
pub struct InstallArgs {
    pub git_ref: Option<String>,
    pub reinstall: bool,
    pub force_blacklisted: bool,
    pub discard_changes: bool,
    pub enable: bool,
}

/// Run the install command
///
/// Remote sources below `trusted` need confirmation first.
pub fn run_install(ctx: &mut Context, source: &str, args: InstallArgs) -> Result<()> {
    let requested = source;
    let source = ctx.manager.resolve_source(requested);
    if source == requested && local_path(&source).is_some_and(|path| !path.exists()) {
        let suggestions = ctx.manager.find_similar_plugin_ids(requested, MAX_SUGGESTIONS);
        if !suggestions.is_empty() {
            return Err(CliError::UnknownPlugin {
                source: plugin_core::Error::NotFound {
                    plugin_id: requested.to_string(),
                },
                suggestions,
            });
        }
    }

    if local_path(&source).is_none() {
        let url = normalize_git_url(&source);
        let trust = ctx.manager.registry().get_trust_level(&url);
        if matches!(trust, TrustLevel::Community | TrustLevel::Unregistered) {
            output::warning(format!(
                "{} is a {} plugin and has not been reviewed",
                url,
                output::trust_label(trust)
            ));
            ctx.require("Install it anyway?")?;
        }
    }

    println!("Installing {}...", source.cyan());
    let plugin_id = ctx.with_discard_retry(args.discard_changes, |manager, discard| {
        let mut options = InstallOptions::default()
            .reinstall(args.reinstall)
            .force_blacklisted(args.force_blacklisted)
            .discard_changes(discard)
            .enable(args.enable);
        if let Some(git_ref) = &args.git_ref {
            options = options.git_ref(git_ref.clone());
        }
        manager.install_plugin(&source, options)
    })?;

    let version = ctx
        .manager
        .plugin(&plugin_id)
        .map(|p| p.version().to_string())
        .unwrap_or_default();
    output::success(format!("Installed {} {}", plugin_id.cyan(), version));
    if let Some(metadata) = ctx.manager.plugin_metadata(&plugin_id)? {
        output::info(format!(
            "{} {} ({})",
            "at".dimmed(),
            metadata.git_ref,
            plugin_git::short_id(&metadata.commit)
        ));
    }
    if args.enable {
        output::info("enabled");
    } else {
        output::info(format!("run {} to enable it", format!("plugins enable {plugin_id}").cyan()));
    }
    Ok(())
}

/// Run the validate command
///
/// Git sources, bare local repositories included, are cloned into a
/// throwaway directory; a local directory that is not a repository is
/// checked in place.
pub fn run_validate(source: &str, git_ref: Option<&str>) -> Result<()> {
    let backend = Git2Backend::new();
    if let Some(path) = local_path(source)
        && path.is_dir()
        && backend.open(&path).is_err()
    {
        if git_ref.is_some() {
            return Err(CliError::user(format!(
                "{} is not a git repository, --ref cannot be used",
                path.display()
            )));
        }
        return report(&path, source);
    }

    let temp = Builder::new().prefix("plugin-validate-").tempdir()?;
    let checkout = temp.path().join("repo");
    tracing::debug!(source, path = %checkout.display(), "Cloning for validation");
    drop(backend.clone_repository(source, &checkout, None)?);
    if let Some(git_ref) = git_ref {
        switch_ref(&backend, &checkout, git_ref)?;
    }
    report(&checkout, source)
}

fn report(dir: &Path, source: &str) -> Result<()> {
    let manifest = Manifest::from_dir(dir)?;
    output::success(format!("{source} contains a valid {MANIFEST_FILE}"));
    output::field("Name", &manifest.name);
    output::field("UUID", &manifest.uuid);
    output::field("Version", manifest.version_or_default());
    output::field("API", manifest.api.join(", "));
    Ok(())
}
