//! The plugin manager
//!
//! [`PluginManager`] owns every piece of mutable plugin state: the list of
//! discovered plugins, the enabled set, the UUID registry and handles to
//! settings, registry and git backend. Operations are split by concern:
//!
//! - `install`: cloning, validating and placing new plugins
//! - `update`: updates, update checks and ref switching
//! - `refs`: listing a plugin's branches and tags
//! - `lifecycle`: startup discovery, enable/disable and uninstall

mod install;
mod lifecycle;
mod refs;
mod update;

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use plugin_fs::RobustnessConfig;
use plugin_git::{Git2Backend, GitBackend};
use plugin_registry::{PluginQuery, PluginRegistry};

use crate::config::ManagerConfig;
use crate::hooks::{NoopHooks, PluginEvent, PluginHooks};
use crate::metadata::{MetadataStore, PluginMetadata};
use crate::plugin::Plugin;
use crate::refs_cache::RefsCache;
use crate::settings::{JsonSettings, SettingsStore};
use crate::uuid_registry::UuidRegistry;
use crate::{Error, Result};

/// Remote every plugin clone fetches from.
const ORIGIN: &str = "origin";

pub use install::InstallOptions;
pub use lifecycle::{FailedPlugin, InitReport};
pub use refs::RefListing;
pub use update::{UpdateCheck, UpdateOutcome, UpdateResult};

/// Installs, updates and tracks plugins.
pub struct PluginManager {
    config: ManagerConfig,
    backend: Box<dyn GitBackend>,
    registry: PluginRegistry,
    refs_cache: RefsCache,
    settings: Box<dyn SettingsStore>,
    hooks: Box<dyn PluginHooks>,
    plugins: Vec<Plugin>,
    /// UUIDs of plugins that should be enabled.
    enabled: BTreeSet<String>,
    uuids: UuidRegistry,
    failed: Vec<FailedPlugin>,
}

impl PluginManager {
    /// Manager backed by libgit2, the configured registry and a JSON
    /// settings file.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings file exists but cannot be parsed.
    pub fn new(config: ManagerConfig) -> Result<Self> {
        let settings = JsonSettings::open(&config.settings_path)?;
        let registry = PluginRegistry::new(config.registry.clone());
        Ok(Self::with_parts(
            config,
            Box::new(Git2Backend::new()),
            registry,
            Box::new(settings),
            Box::new(NoopHooks),
        ))
    }

    /// Assemble a manager from explicit parts.
    pub fn with_parts(
        config: ManagerConfig,
        backend: Box<dyn GitBackend>,
        registry: PluginRegistry,
        settings: Box<dyn SettingsStore>,
        hooks: Box<dyn PluginHooks>,
    ) -> Self {
        tracing::debug!(
            backend = backend.name(),
            primary_dir = %config.primary_dir().display(),
            "Creating plugin manager"
        );
        Self {
            refs_cache: RefsCache::new(&config.cache_dir),
            config,
            backend,
            registry,
            settings,
            hooks,
            plugins: Vec::new(),
            enabled: BTreeSet::new(),
            uuids: UuidRegistry::new(),
            failed: Vec::new(),
        }
    }

    /// Replace the host hooks.
    pub fn with_hooks(mut self, hooks: Box<dyn PluginHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn primary_dir(&self) -> &Path {
        self.config.primary_dir()
    }

    pub fn plugins(&self) -> &[Plugin] {
        &self.plugins
    }

    pub fn plugin(&self, plugin_id: &str) -> Option<&Plugin> {
        self.plugins.iter().find(|p| p.plugin_id == plugin_id)
    }

    pub fn registry(&mut self) -> &mut PluginRegistry {
        &mut self.registry
    }

    /// Cached branch and tag listings of remote repositories.
    pub fn refs_cache(&mut self) -> &mut RefsCache {
        &mut self.refs_cache
    }

    pub fn settings(&self) -> &dyn SettingsStore {
        self.settings.as_ref()
    }

    pub fn uuid_registry(&self) -> &UuidRegistry {
        &self.uuids
    }

    /// UUIDs persisted as enabled.
    pub fn enabled_uuids(&self) -> &BTreeSet<String> {
        &self.enabled
    }

    /// Plugin directories whose manifest could not be loaded.
    pub fn failed_plugins(&self) -> &[FailedPlugin] {
        &self.failed
    }

    /// Resolve a user-supplied identifier to a plugin id.
    ///
    /// Tries, in order: the plugin id itself, the UUID, the display name
    /// (case-insensitive), then the registry id.
    pub fn find_plugin(&mut self, identifier: &str) -> Result<String> {
        let lowered = identifier.to_lowercase();
        let found = self
            .plugins
            .iter()
            .find(|p| p.plugin_id == identifier)
            .or_else(|| self.plugins.iter().find(|p| p.uuid() == Some(identifier)))
            .or_else(|| self.plugins.iter().find(|p| p.name().to_lowercase() == lowered));
        if let Some(plugin) = found {
            return Ok(plugin.plugin_id.clone());
        }

        if let Some(uuid) = self
            .registry
            .find_plugin(PluginQuery::Id(identifier))
            .and_then(|entry| entry.uuid)
            && let Some(plugin) = self.plugins.iter().find(|p| p.uuid() == Some(uuid.as_str()))
        {
            return Ok(plugin.plugin_id.clone());
        }

        Err(Error::NotFound {
            plugin_id: identifier.to_string(),
        })
    }

    /// Identifiers close to `query`, to suggest after a failed lookup.
    ///
    /// Installed plugins whose id or name contains `query` come first,
    /// then matching registry ids. Too many matches yield nothing.
    pub fn find_similar_plugin_ids(&mut self, query: &str, max_results: usize) -> Vec<String> {
        let needle = query.to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }
        let mut matches: Vec<String> = self
            .plugins
            .iter()
            .filter(|p| {
                p.plugin_id.to_lowercase().contains(&needle) || p.name().to_lowercase().contains(&needle)
            })
            .map(|p| p.plugin_id.clone())
            .collect();
        for id in self.registry.find_similar_plugin_ids(query, max_results) {
            if !matches.contains(&id) {
                matches.push(id);
            }
        }
        if matches.len() > max_results {
            tracing::debug!(query, matches = matches.len(), "Too many similar plugins to suggest");
            return Vec::new();
        }
        matches
    }

    /// Stored install metadata for an installed plugin.
    pub fn plugin_metadata(&mut self, plugin_id: &str) -> Result<Option<PluginMetadata>> {
        let idx = self.index_of(plugin_id)?;
        let uuid = self.plugin_uuid(idx)?;
        self.metadata().lookup(&uuid)
    }

    /// Turn a registry id into its git URL; anything else is returned as is.
    ///
    /// Existing local paths always win over registry ids of the same name.
    pub fn resolve_source(&mut self, source: &str) -> String {
        if Path::new(source).exists() || !plugin_registry::is_local_path(source) {
            return source.to_string();
        }
        match self.registry.find_plugin(PluginQuery::Id(source)) {
            Some(entry) => {
                tracing::debug!(id = source, url = %entry.git_url, "Resolved registry id");
                entry.git_url
            }
            None => source.to_string(),
        }
    }

    fn index_of(&self, plugin_id: &str) -> Result<usize> {
        self.plugins
            .iter()
            .position(|p| p.plugin_id == plugin_id)
            .ok_or_else(|| Error::NotFound {
                plugin_id: plugin_id.to_string(),
            })
    }

    fn plugin_uuid(&self, idx: usize) -> Result<String> {
        let plugin = &self.plugins[idx];
        plugin.uuid().map(str::to_string).ok_or_else(|| Error::NoUuid {
            plugin_id: plugin.plugin_id.clone(),
        })
    }

    fn metadata(&mut self) -> MetadataStore<'_> {
        MetadataStore::new(self.settings.as_mut())
    }

    fn emit(&mut self, event: PluginEvent) {
        tracing::debug!(%event, "Plugin event");
        self.hooks.on_event(&event);
    }

    fn save_enabled(&mut self) -> Result<()> {
        let uuids: Vec<&String> = self.enabled.iter().collect();
        let value = serde_json::to_value(uuids)?;
        self.settings.set(crate::settings::ENABLED_KEY, value)
    }
}

/// Remove a plugin directory, or just the link when it is a symlink.
fn remove_plugin_path(path: &Path) -> Result<()> {
    let meta = fs::symlink_metadata(path)?;
    if meta.file_type().is_symlink() {
        fs::remove_file(path)?;
    } else if meta.is_dir() {
        plugin_fs::io::remove_dir_all(path, RobustnessConfig::default())?;
    } else {
        fs::remove_file(path)?;
    }
    tracing::debug!(path = %path.display(), "Removed plugin files");
    Ok(())
}

/// Best-effort removal used on cleanup paths that already carry an error.
fn discard_path(path: &Path) {
    if fs::symlink_metadata(path).is_err() {
        return;
    }
    if let Err(e) = remove_plugin_path(path) {
        tracing::warn!(path = %path.display(), error = %e, "Failed to clean up plugin directory");
    }
}
