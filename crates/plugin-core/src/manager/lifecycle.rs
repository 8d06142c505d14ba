//! Discovery, enable/disable and uninstall

use std::fs;
use std::path::{Path, PathBuf};

use plugin_fs::{NormalizedPath, RobustnessConfig};
use serde::Serialize;
use serde_json::Value;

use super::{PluginManager, remove_plugin_path};
use crate::hooks::PluginEvent;
use crate::plugin::{Plugin, PluginState};
use crate::settings::{ENABLED_KEY, options_key, uuid_from_options_key};
use crate::{Error, Result};

/// Prefix of in-flight install directories inside the primary directory.
pub(crate) const TEMP_PREFIX: &str = ".tmp-";

/// A plugin directory that could not be loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedPlugin {
    pub path: PathBuf,
    pub error: String,
}

/// Summary of [`PluginManager::init_plugins`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct InitReport {
    /// Plugins discovered with a valid manifest.
    pub loaded: usize,
    /// Plugin ids enabled during startup.
    pub enabled: Vec<String>,
    /// `(plugin_id, reason)` for plugins kept disabled by the blacklist.
    pub blacklisted: Vec<(String, String)>,
    /// `(plugin_id, error)` for plugins whose enable failed.
    pub enable_failures: Vec<(String, String)>,
    /// Directories whose manifest failed to load.
    pub failed: Vec<FailedPlugin>,
    /// Stale temp directories removed from the primary directory.
    pub swept: usize,
}

impl PluginManager {
    /// Discover installed plugins and enable the ones persisted as enabled.
    ///
    /// Order matters: stale temp directories are swept first, then every
    /// plugin directory is scanned, blacklisted plugins are dropped from
    /// the enabled set, and only then are the remaining plugins enabled.
    /// Individual enable failures are reported, not returned.
    pub fn init_plugins(&mut self) -> Result<InitReport> {
        let primary = self.config.primary_dir().to_path_buf();
        fs::create_dir_all(&primary)?;

        let mut report = InitReport {
            swept: sweep_temp_dirs(&primary),
            ..Default::default()
        };

        self.load_enabled();
        self.plugins.clear();
        self.failed.clear();
        self.uuids.clear();

        for dir in self.config.plugin_dirs.clone() {
            self.scan_directory(&dir)?;
        }
        report.loaded = self.plugins.len();
        report.failed = self.failed.clone();

        let candidates: Vec<(String, String)> = self
            .plugins
            .iter()
            .filter_map(|p| Some((p.plugin_id.clone(), p.uuid()?.to_string())))
            .collect();

        let mut changed = false;
        for (plugin_id, uuid) in &candidates {
            let url = self.metadata().lookup(uuid)?.map(|m| m.url).unwrap_or_default();
            let verdict = self.registry.is_blacklisted(&url, Some(uuid));
            if !verdict.blacklisted {
                continue;
            }
            let reason = verdict.reason.unwrap_or_default();
            tracing::warn!(plugin_id = %plugin_id, reason = %reason, "Plugin is blacklisted, keeping it disabled");
            if let Some(plugin) = self.plugins.iter_mut().find(|p| &p.plugin_id == plugin_id) {
                plugin.state = PluginState::Disabled;
            }
            changed |= self.enabled.remove(uuid);
            report.blacklisted.push((plugin_id.clone(), reason));
        }
        if changed {
            self.save_enabled()?;
        }

        for (plugin_id, uuid) in candidates {
            if !self.enabled.contains(&uuid) {
                continue;
            }
            let Ok(idx) = self.index_of(&plugin_id) else {
                continue;
            };
            match self.activate(idx) {
                Ok(()) => report.enabled.push(plugin_id),
                Err(e) => {
                    tracing::error!(plugin_id = %plugin_id, error = %e, "Failed to enable plugin");
                    report.enable_failures.push((plugin_id, e.to_string()));
                }
            }
        }

        tracing::info!(
            loaded = report.loaded,
            enabled = report.enabled.len(),
            failed = report.failed.len(),
            "Plugins initialized"
        );
        Ok(report)
    }

    /// Load every plugin directory under `dir`.
    ///
    /// Hidden entries are skipped. A second plugin with an already seen
    /// UUID is ignored so that each UUID maps to one plugin.
    fn scan_directory(&mut self, dir: &Path) -> Result<()> {
        if !dir.is_dir() {
            tracing::debug!(dir = %dir.display(), "Plugin directory does not exist");
            return Ok(());
        }

        let mut names: Vec<String> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_dir())
            .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
            .filter(|name| !name.starts_with('.'))
            .collect();
        names.sort();

        for name in names {
            let plugin = match Plugin::load(dir, &name) {
                Ok(plugin) => plugin,
                Err(e) => {
                    tracing::warn!(plugin_id = %name, error = %e, "Failed to load plugin manifest");
                    self.failed.push(FailedPlugin {
                        path: dir.join(&name),
                        error: e.to_string(),
                    });
                    continue;
                }
            };

            let Some(uuid) = plugin.uuid().map(str::to_string) else {
                continue;
            };
            if let Some(existing) = self.uuids.plugin_id(&uuid) {
                tracing::warn!(
                    plugin_id = %name,
                    existing = %existing,
                    uuid = %uuid,
                    "Duplicate plugin UUID, ignoring directory"
                );
                continue;
            }
            if let Some(manifest) = &plugin.manifest
                && !manifest.is_compatible(&self.config.host_api_versions)
            {
                tracing::warn!(
                    plugin_id = %name,
                    required = ?manifest.api,
                    "Plugin does not support this host API version"
                );
            }

            tracing::debug!(plugin_id = %name, uuid = %uuid, "Discovered plugin");
            self.uuids.register(&uuid, &name);
            self.plugins.push(plugin);
        }
        Ok(())
    }

    fn load_enabled(&mut self) {
        self.enabled = match self.settings.get(ENABLED_KEY) {
            None | Some(Value::Null) => Default::default(),
            Some(value) => serde_json::from_value(value).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Ignoring malformed enabled plugin list");
                Default::default()
            }),
        };
    }

    /// Enable a plugin and persist it as enabled.
    ///
    /// Enabling an already enabled plugin does nothing.
    ///
    /// # Errors
    ///
    /// * `NotFound` if no plugin has this id
    /// * `IncompatibleApi` if the plugin does not support the host API
    /// * `Hook` if the host refused; the plugin is left disabled
    pub fn enable_plugin(&mut self, plugin_id: &str) -> Result<()> {
        let idx = self.index_of(plugin_id)?;
        let uuid = self.plugin_uuid(idx)?;
        if self.plugins[idx].is_enabled() {
            if self.enabled.insert(uuid) {
                self.save_enabled()?;
            }
            return Ok(());
        }

        self.activate(idx)?;
        self.enabled.insert(uuid);
        self.save_enabled()
    }

    /// Run the enable hook and register the plugin's UUID.
    pub(super) fn activate(&mut self, idx: usize) -> Result<()> {
        let uuid = self.plugin_uuid(idx)?;
        let plugin = &self.plugins[idx];
        let plugin_id = plugin.plugin_id.clone();

        if let Some(manifest) = &plugin.manifest
            && !manifest.is_compatible(&self.config.host_api_versions)
        {
            return Err(Error::IncompatibleApi {
                plugin_id,
                required: manifest.api.clone(),
                supported: self.config.host_api_versions.clone(),
            });
        }

        if let Err(e) = self.hooks.enable(&self.plugins[idx]) {
            self.plugins[idx].state = PluginState::Disabled;
            return Err(Error::Hook {
                plugin_id,
                action: "enable",
                message: e.to_string(),
            });
        }

        self.plugins[idx].state = PluginState::Enabled;
        self.uuids.register(&uuid, &plugin_id);
        tracing::info!(plugin_id = %plugin_id, "Enabled plugin");
        self.emit(PluginEvent::Enabled { plugin_id });
        Ok(())
    }

    /// Disable a plugin and remove it from the persisted enabled set.
    ///
    /// Disabling an already disabled plugin does nothing. A failing
    /// disable hook still leaves the plugin disabled.
    pub fn disable_plugin(&mut self, plugin_id: &str) -> Result<()> {
        let idx = self.index_of(plugin_id)?;
        let uuid = self.plugin_uuid(idx)?;

        let result = if self.plugins[idx].state == PluginState::Disabled {
            Ok(())
        } else {
            self.deactivate(idx)
        };
        if self.enabled.remove(&uuid) {
            self.save_enabled()?;
        }
        result
    }

    /// Run the disable hook, leaving the persisted enabled set alone.
    pub(super) fn deactivate(&mut self, idx: usize) -> Result<()> {
        let plugin_id = self.plugins[idx].plugin_id.clone();
        let hook_result = if self.plugins[idx].is_enabled() {
            self.hooks.disable(&self.plugins[idx])
        } else {
            Ok(())
        };
        self.plugins[idx].state = PluginState::Disabled;
        if let Err(e) = hook_result {
            return Err(Error::Hook {
                plugin_id,
                action: "disable",
                message: e.to_string(),
            });
        }

        tracing::info!(plugin_id = %plugin_id, "Disabled plugin");
        self.emit(PluginEvent::Disabled { plugin_id });
        Ok(())
    }

    /// Remove an installed plugin.
    ///
    /// Saved plugin options survive unless `purge` is set, so a later
    /// reinstall picks them up again.
    ///
    /// # Errors
    ///
    /// * `NotFound` if no plugin has this id
    /// * `OutsidePluginDir` if the plugin does not live in the primary
    ///   plugin directory
    pub fn uninstall_plugin(&mut self, plugin_id: &str, purge: bool) -> Result<()> {
        let idx = self.index_of(plugin_id)?;
        let uuid = self.plugin_uuid(idx)?;
        let path = self.plugins[idx].path.clone();
        let root = self.config.primary_dir().to_path_buf();

        // Resolve the containing directory, not the plugin itself, so a
        // symlinked plugin in the primary directory still counts as inside
        let parent = NormalizedPath::absolutize(path.parent().unwrap_or(&path)).canonical();
        let primary = NormalizedPath::absolutize(&root).canonical();
        if parent != primary && !parent.is_inside(&primary) {
            return Err(Error::OutsidePluginDir { path, root });
        }

        self.disable_plugin(plugin_id)?;

        if fs::symlink_metadata(&path).is_ok() {
            remove_plugin_path(&path)?;
        }
        self.metadata().forget(&uuid)?;
        self.uuids.unregister(&uuid);
        if purge {
            self.clean_plugin_config(&uuid)?;
        }

        self.plugins.remove(idx);
        tracing::info!(plugin_id, purge, "Uninstalled plugin");
        self.emit(PluginEvent::Uninstalled {
            plugin_id: plugin_id.to_string(),
        });
        Ok(())
    }

    /// Whether the plugin with `uuid` has options saved in the settings.
    pub fn plugin_has_saved_options(&self, uuid: &str) -> bool {
        match self.settings.get(&options_key(uuid)) {
            None | Some(Value::Null) => false,
            Some(Value::Object(map)) => !map.is_empty(),
            Some(_) => true,
        }
    }

    /// Delete the saved options of `uuid`, returning whether any existed.
    pub fn clean_plugin_config(&mut self, uuid: &str) -> Result<bool> {
        let removed = self.settings.remove(&options_key(uuid))?;
        if removed {
            tracing::info!(uuid, "Removed saved plugin options");
        }
        Ok(removed)
    }

    /// UUIDs with saved options but no installed plugin.
    pub fn orphaned_configs(&self) -> Vec<String> {
        self.settings
            .keys()
            .iter()
            .filter_map(|key| uuid_from_options_key(key))
            .filter(|uuid| !self.plugins.iter().any(|p| p.uuid() == Some(*uuid)))
            .map(str::to_string)
            .collect()
    }
}

/// Remove leftover `.tmp-*` directories from interrupted installs.
fn sweep_temp_dirs(primary: &Path) -> usize {
    let Ok(entries) = fs::read_dir(primary) else {
        return 0;
    };
    let mut swept = 0;
    for entry in entries.filter_map(|e| e.ok()) {
        let path = entry.path();
        let is_temp = entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with(TEMP_PREFIX));
        if !is_temp || !path.is_dir() {
            continue;
        }
        match plugin_fs::io::remove_dir_all(&path, RobustnessConfig::default()) {
            Ok(()) => {
                tracing::info!(path = %path.display(), "Removed stale temp directory");
                swept += 1;
            }
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "Failed to remove stale temp directory"),
        }
    }
    swept
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sweep_only_touches_temp_dirs() {
        let dir = tempfile::TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join(".tmp-plugin-abc/repo")).unwrap();
        fs::create_dir_all(dir.path().join("demo_1234")).unwrap();
        fs::write(dir.path().join(".tmp-file"), "x").unwrap();

        assert_eq!(sweep_temp_dirs(dir.path()), 1);
        assert!(!dir.path().join(".tmp-plugin-abc").exists());
        assert!(dir.path().join("demo_1234").exists());
        assert!(dir.path().join(".tmp-file").exists());
    }

    #[test]
    fn sweep_of_missing_dir_is_a_no_op() {
        assert_eq!(sweep_temp_dirs(Path::new("/definitely/not/here")), 0);
    }
}
