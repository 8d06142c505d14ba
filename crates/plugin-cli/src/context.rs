//! Command context
//!
//! Builds the [`PluginManager`] from the global options and owns the
//! confirmation policy shared by every command.

use std::io::IsTerminal;

use dialoguer::Confirm;
use plugin_core::{ManagerConfig, PluginManager};

use crate::cli::GlobalArgs;
use crate::error::{CliError, Result};
use crate::output;

/// Most "did you mean" suggestions shown for an unknown identifier.
pub const MAX_SUGGESTIONS: usize = 10;

pub struct Context {
    pub manager: PluginManager,
    assume_yes: bool,
}

impl Context {
    /// Load configuration, create the manager and discover installed
    /// plugins.
    pub fn load(args: &GlobalArgs) -> Result<Self> {
        let mut config = ManagerConfig::load(args.config.as_deref())?;
        if let Some(dir) = &args.plugin_dir {
            config = config.with_primary_dir(dir.clone());
        }
        tracing::debug!(
            primary = %config.primary_dir().display(),
            settings = %config.settings_path.display(),
            "Loaded configuration"
        );

        let mut manager = PluginManager::new(config)?;
        let report = manager.init_plugins()?;
        for failed in &report.failed {
            output::warning(format!(
                "Skipping {}: {}",
                failed.path.display(),
                failed.error
            ));
        }
        for (plugin_id, error) in &report.enable_failures {
            output::warning(format!("Could not enable {plugin_id}: {error}"));
        }

        Ok(Self {
            manager,
            assume_yes: args.yes,
        })
    }

    /// Resolve a plugin identifier, offering close matches when nothing
    /// matches it.
    pub fn find_plugin(&mut self, identifier: &str) -> Result<String> {
        match self.manager.find_plugin(identifier) {
            Err(e) if e.is_not_found() => Err(CliError::UnknownPlugin {
                suggestions: self.manager.find_similar_plugin_ids(identifier, MAX_SUGGESTIONS),
                source: e,
            }),
            other => Ok(other?),
        }
    }

    /// Ask a yes/no question.
    ///
    /// `--yes` answers yes. Without a terminal to ask on, the answer is no.
    pub fn confirm(&self, prompt: &str) -> Result<bool> {
        if self.assume_yes {
            return Ok(true);
        }
        if !std::io::stdin().is_terminal() {
            tracing::debug!(prompt, "Not a terminal, declining");
            return Ok(false);
        }
        Ok(Confirm::new()
            .with_prompt(prompt)
            .default(false)
            .interact()?)
    }

    /// Like [`confirm`](Self::confirm), but a "no" cancels the command.
    pub fn require(&self, prompt: &str) -> Result<()> {
        if self.confirm(prompt)? {
            Ok(())
        } else {
            Err(CliError::Cancelled)
        }
    }

    /// Run a manager operation, offering to discard local changes and try
    /// again when it fails on a dirty working tree.
    ///
    /// Declining the offer cancels the command.
    pub fn with_discard_retry<T>(
        &mut self,
        discard_changes: bool,
        mut operation: impl FnMut(&mut PluginManager, bool) -> plugin_core::Result<T>,
    ) -> Result<T> {
        match operation(&mut self.manager, discard_changes) {
            Err(plugin_core::Error::Dirty { plugin_id, changes }) if !discard_changes => {
                output::warning(format!("{plugin_id} has local changes:"));
                for change in &changes {
                    output::info(change);
                }
                self.require("Discard local changes and retry?")?;
                Ok(operation(&mut self.manager, true)?)
            }
            other => Ok(other?),
        }
    }
}
