//! Installing plugins from git sources

use std::fs;
use std::path::Path;

use plugin_git::{RefKind, RefType, SwitchOutcome, check_dirty_working_dir, check_ref_type, switch_ref};
use plugin_registry::url::{local_path, same_repository};
use plugin_registry::{PluginQuery, normalize_git_url, select_ref_for_plugin};
use tempfile::{Builder, TempDir};

use super::lifecycle::TEMP_PREFIX;
use plugin_fs::RobustnessConfig;

use super::{PluginManager, discard_path, remove_plugin_path};
use crate::hooks::PluginEvent;
use crate::manifest::Manifest;
use crate::metadata::PluginMetadata;
use crate::plugin::{Plugin, directory_name};
use crate::{Error, Result};

const LOCAL_TEMP_PREFIX: &str = "plugin-src-";
const DEFAULT_BLACKLIST_REASON: &str = "Plugin is blacklisted";

/// Options for [`PluginManager::install_plugin`].
#[derive(Debug, Clone, Default)]
pub struct InstallOptions {
    /// Branch, tag or commit to install instead of the default branch.
    pub git_ref: Option<String>,
    /// Replace an existing installation of the same plugin.
    pub reinstall: bool,
    /// Skip the blacklist checks.
    pub force_blacklisted: bool,
    /// Throw away local changes in the installation being replaced.
    pub discard_changes: bool,
    /// Enable the plugin once installed.
    pub enable: bool,
}

impl InstallOptions {
    pub fn git_ref(mut self, git_ref: impl Into<String>) -> Self {
        self.git_ref = Some(git_ref.into());
        self
    }

    pub fn reinstall(mut self, reinstall: bool) -> Self {
        self.reinstall = reinstall;
        self
    }

    pub fn force_blacklisted(mut self, force: bool) -> Self {
        self.force_blacklisted = force;
        self
    }

    pub fn discard_changes(mut self, discard: bool) -> Self {
        self.discard_changes = discard;
        self
    }

    pub fn enable(mut self, enable: bool) -> Self {
        self.enable = enable;
        self
    }
}

impl PluginManager {
    /// Install a plugin from a git URL or a local repository.
    ///
    /// The source is cloned into a temp directory, checked against the
    /// blacklist and validated before anything under the plugin directory
    /// changes. Returns the new plugin id.
    ///
    /// # Errors
    ///
    /// * `NotARepository` if a local source is not a git repository
    /// * `Blacklisted` if the URL or UUID is blacklisted
    /// * `RefNotFound` / `RefSwitch` if the requested ref cannot be checked out
    /// * `ManifestNotFound` / `ManifestInvalid` for a bad manifest
    /// * `UuidConflict` if the UUID is installed from another source
    /// * `AlreadyInstalled` if the plugin exists and `reinstall` is not set
    /// * `Dirty` if the installation being replaced has local changes
    pub fn install_plugin(&mut self, source: &str, options: InstallOptions) -> Result<String> {
        let local = local_path(source);
        let source_url = normalize_git_url(source);
        let mut git_ref = options.git_ref.clone().filter(|r| !r.is_empty());
        tracing::info!(source = %source_url, git_ref = ?git_ref, "Installing plugin");

        let mut preserved = false;
        if options.reinstall
            && git_ref.is_none()
            && let Some(stored) = self.preserved_ref(&source_url)?
        {
            tracing::info!(git_ref = %stored, "Reinstalling at the previously installed ref");
            git_ref = Some(stored);
            preserved = true;
        }

        if let Some(path) = &local {
            self.inspect_local_source(path)?;
            if git_ref.is_none() {
                git_ref = self.current_branch(path);
            }
        }

        if !options.force_blacklisted {
            self.check_blacklist(&source_url, None)?;
        }

        let primary = self.config.primary_dir().to_path_buf();
        fs::create_dir_all(&primary)?;
        let temp = clone_dir(&primary, local.is_some())?;
        let checkout = temp.path().join("repo");
        let clone_source = match &local {
            Some(path) => path.to_string_lossy().into_owned(),
            None => source.to_string(),
        };

        tracing::debug!(source = %clone_source, dest = %checkout.display(), "Cloning plugin");
        self.backend.clone_repository(&clone_source, &checkout, None)?;

        let switched = self.checkout_requested_ref(&checkout, &source_url, git_ref.as_deref(), preserved)?;
        let manifest = Manifest::from_dir(&checkout)?;
        if !options.force_blacklisted {
            self.check_blacklist(&source_url, Some(&manifest.uuid))?;
        }

        let uuid = manifest.uuid.clone();
        if !options.reinstall {
            self.check_uuid_conflict(&uuid, &source_url)?;
        }

        let plugin_id = directory_name(&manifest);
        let final_path = primary.join(&plugin_id);
        let existing = self
            .plugins
            .iter()
            .position(|p| p.uuid() == Some(uuid.as_str()) || p.path == final_path);
        let mut replaced = None;
        if existing.is_some() || final_path.exists() {
            let existing_id = existing
                .map(|idx| self.plugins[idx].plugin_id.clone())
                .unwrap_or_else(|| plugin_id.clone());
            if !options.reinstall {
                return Err(Error::AlreadyInstalled {
                    plugin_id: existing_id,
                });
            }
            self.check_replaceable(existing, &final_path, &existing_id, options.discard_changes)?;
            replaced = Some((existing, existing_id));
        }

        plugin_fs::io::replace_dir(&checkout, &final_path, RobustnessConfig::default())?;
        drop(temp);
        if let Some((existing, existing_id)) = replaced {
            self.retire_existing(existing, &final_path, &existing_id)?;
        }

        if let Err(e) = self.register_installed(&primary, &plugin_id, &source_url, switched) {
            self.rollback_install(&plugin_id, &uuid, &final_path);
            return Err(e);
        }
        tracing::info!(plugin_id = %plugin_id, "Installed plugin");
        self.emit(PluginEvent::Installed {
            plugin_id: plugin_id.clone(),
        });

        if options.enable
            && let Err(e) = self.enable_plugin(&plugin_id)
        {
            tracing::error!(plugin_id = %plugin_id, error = %e, "Enable after install failed, removing plugin");
            self.rollback_install(&plugin_id, &uuid, &final_path);
            return Err(e);
        }
        Ok(plugin_id)
    }

    /// Ref stored for a previous install from `url`, when it is a branch
    /// or tag.
    fn preserved_ref(&mut self, url: &str) -> Result<Option<String>> {
        Ok(self
            .metadata()
            .find_by_url(url)?
            .filter(|m| matches!(m.ref_type(), Some(RefType::Branch | RefType::Tag)))
            .map(|m| m.git_ref)
            .filter(|r| !r.is_empty()))
    }

    fn inspect_local_source(&self, path: &Path) -> Result<()> {
        if !path.exists() || self.backend.open(path).is_err() {
            return Err(Error::NotARepository {
                path: path.to_path_buf(),
            });
        }
        // Bare repositories have no status to check
        if let Ok(changes) = check_dirty_working_dir(self.backend.as_ref(), path)
            && !changes.is_empty()
        {
            tracing::warn!(
                path = %path.display(),
                changes = changes.len(),
                "Local source has uncommitted changes; only committed content is installed"
            );
        }
        Ok(())
    }

    /// Branch checked out in a local source, if HEAD is attached.
    fn current_branch(&self, path: &Path) -> Option<String> {
        let repo = self.backend.open(path).ok()?;
        if repo.is_head_detached().ok()? {
            return None;
        }
        repo.head_shorthand().ok()
    }

    fn check_blacklist(&mut self, url: &str, uuid: Option<&str>) -> Result<()> {
        let verdict = self.registry.is_blacklisted(url, uuid);
        if !verdict.blacklisted {
            return Ok(());
        }
        Err(Error::Blacklisted {
            url: url.to_string(),
            uuid: uuid.map(str::to_string),
            reason: verdict
                .reason
                .unwrap_or_else(|| DEFAULT_BLACKLIST_REASON.to_string()),
        })
    }

    /// Switch a fresh clone to the requested ref, or to the ref the
    /// registry recommends when none was requested.
    fn checkout_requested_ref(
        &mut self,
        checkout: &Path,
        source_url: &str,
        git_ref: Option<&str>,
        preserved: bool,
    ) -> Result<Option<SwitchOutcome>> {
        if let Some(reference) = git_ref {
            return match switch_ref(self.backend.as_ref(), checkout, reference) {
                Ok(outcome) => Ok(Some(outcome)),
                Err(e) if preserved => {
                    tracing::warn!(
                        git_ref = reference,
                        error = %e,
                        "Previously installed ref is gone, installing the default ref"
                    );
                    Ok(None)
                }
                Err(e) => Err(Error::from_switch(source_url, reference, e)),
            };
        }

        let Some(entry) = self.registry.find_plugin(PluginQuery::Url(source_url)) else {
            return Ok(None);
        };
        let tags: Vec<String> = self
            .backend
            .open(checkout)?
            .list_references()?
            .into_iter()
            .filter(|r| r.kind == RefKind::Tag)
            .map(|r| r.name)
            .collect();
        let Some(selected) = select_ref_for_plugin(&entry, &tags, self.config.host_api()) else {
            return Ok(None);
        };

        tracing::debug!(plugin = %entry.id, git_ref = %selected, "Using registry ref");
        match switch_ref(self.backend.as_ref(), checkout, &selected) {
            Ok(outcome) => Ok(Some(outcome)),
            Err(e) => {
                tracing::warn!(git_ref = %selected, error = %e, "Registry ref unavailable, installing the default ref");
                Ok(None)
            }
        }
    }

    fn check_uuid_conflict(&mut self, uuid: &str, source_url: &str) -> Result<()> {
        let Some(existing) = self.metadata().lookup(uuid)? else {
            return Ok(());
        };
        if existing.url.is_empty() || same_repository(&existing.url, source_url) {
            return Ok(());
        }
        let existing_id = self
            .uuids
            .plugin_id(uuid)
            .map(str::to_string)
            .unwrap_or(existing.name);
        Err(Error::UuidConflict {
            uuid: uuid.to_string(),
            existing_id,
            existing_source: existing.url,
            new_source: source_url.to_string(),
        })
    }

    /// Refuse to replace an installation with local changes.
    fn check_replaceable(
        &self,
        existing: Option<usize>,
        final_path: &Path,
        existing_id: &str,
        discard_changes: bool,
    ) -> Result<()> {
        let old_path = existing
            .map(|idx| self.plugins[idx].path.clone())
            .unwrap_or_else(|| final_path.to_path_buf());

        if !discard_changes && old_path.exists() {
            match check_dirty_working_dir(self.backend.as_ref(), &old_path) {
                Ok(changes) if !changes.is_empty() => {
                    return Err(Error::Dirty {
                        plugin_id: existing_id.to_string(),
                        changes,
                    });
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(
                    plugin_id = existing_id,
                    error = %e,
                    "Could not check the existing installation for local changes"
                ),
            }
        }
        Ok(())
    }

    /// Drop the installation a reinstall replaced.
    ///
    /// Its directory at `final_path` is already gone; one living elsewhere
    /// is removed here.
    fn retire_existing(&mut self, existing: Option<usize>, final_path: &Path, existing_id: &str) -> Result<()> {
        let Some(idx) = existing else {
            return Ok(());
        };
        let old_path = self.plugins[idx].path.clone();
        if self.plugins[idx].is_enabled()
            && let Err(e) = self.hooks.disable(&self.plugins[idx])
        {
            tracing::debug!(plugin_id = existing_id, error = %e, "Disable of replaced plugin failed");
        }
        if let Some(uuid) = self.plugins[idx].uuid().map(str::to_string) {
            self.uuids.unregister(&uuid);
            if self.enabled.remove(&uuid) {
                self.save_enabled()?;
            }
        }
        self.plugins.remove(idx);

        if old_path != final_path && fs::symlink_metadata(&old_path).is_ok() {
            remove_plugin_path(&old_path)?;
        }
        tracing::debug!(plugin_id = existing_id, "Removed installation being replaced");
        Ok(())
    }

    /// Persist metadata for a freshly placed plugin and add it to the list.
    fn register_installed(
        &mut self,
        primary: &Path,
        plugin_id: &str,
        source_url: &str,
        switched: Option<SwitchOutcome>,
    ) -> Result<()> {
        let final_path = primary.join(plugin_id);
        let (ref_type, git_ref) = match switched {
            Some(outcome) => (outcome.ref_type, outcome.new_ref),
            None => check_ref_type(self.backend.as_ref(), &final_path, None)?,
        };
        let commit = self.backend.open(&final_path)?.head_target()?;

        let plugin = Plugin::load(primary, plugin_id)?;
        let uuid = plugin.uuid().map(str::to_string).ok_or_else(|| Error::NoUuid {
            plugin_id: plugin_id.to_string(),
        })?;

        let previous = self.metadata().lookup(&uuid)?;
        let mut metadata = PluginMetadata {
            name: plugin_id.to_string(),
            url: source_url.to_string(),
            git_ref,
            commit,
            uuid: Some(
                previous
                    .as_ref()
                    .and_then(|p| p.uuid.clone())
                    .unwrap_or_else(|| uuid.clone()),
            ),
            original_url: previous.as_ref().and_then(|p| p.original_url.clone()),
            original_uuid: previous.and_then(|p| p.original_uuid),
            ..Default::default()
        };
        metadata.set_ref_type(ref_type);
        self.metadata().save(metadata)?;

        self.uuids.register(&uuid, plugin_id);
        self.plugins.push(plugin);
        Ok(())
    }

    /// Undo a partially completed install.
    fn rollback_install(&mut self, plugin_id: &str, uuid: &str, path: &Path) {
        self.plugins.retain(|p| p.plugin_id != plugin_id);
        self.uuids.unregister(uuid);
        if let Err(e) = self.metadata().forget(uuid) {
            tracing::warn!(plugin_id, error = %e, "Failed to remove metadata of failed install");
        }
        if self.enabled.remove(uuid)
            && let Err(e) = self.save_enabled()
        {
            tracing::warn!(plugin_id, error = %e, "Failed to save enabled plugins");
        }
        discard_path(path);
    }
}

/// Temp directory to clone into.
///
/// Remote clones land inside the primary directory so the final move is a
/// rename and a crash leaves something `init_plugins` sweeps. Local clones
/// go to the system temp dir.
fn clone_dir(primary: &Path, local: bool) -> std::io::Result<TempDir> {
    if local {
        Builder::new().prefix(LOCAL_TEMP_PREFIX).tempdir()
    } else {
        Builder::new()
            .prefix(&format!("{TEMP_PREFIX}plugin-"))
            .tempdir_in(primary)
    }
}
